//! plan-engine: discovery and key generation for a markdown planning tree.
//!
//! Reconciles two sources of truth — a markdown epic index and the on-disk
//! folder hierarchy — into one catalog, detects conflicts, and assigns
//! `T-<epic>-<feature>-<nnn>` identifiers to task artifacts with atomic
//! frontmatter write-back. Provides both a library API ([`discover`],
//! [`discover_with_options`]) and a CLI binary.
//!
//! # Quick Start
//!
//! ```no_run
//! use plan_engine::{discover_with_options, format_report_text};
//! use plan_engine::{DiscoveryOptions, SqliteRepository};
//! use std::path::PathBuf;
//!
//! let repo = SqliteRepository::open_in_memory().expect("open repository");
//! let options = DiscoveryOptions {
//!     docs_root: PathBuf::from("docs/plan"),
//!     ..DiscoveryOptions::default()
//! };
//! let outcome = discover_with_options(&repo, &options).expect("discovery failed");
//! println!("{}", format_report_text(&outcome));
//! ```

/// Service Provider Interface: the repository trait, errors, cancellation.
pub mod spi;
/// Application Programming Interface: public traits and configuration types.
pub mod api;
mod core;
mod saf;

pub use saf::*;
