use crate::api::traits::{DiscoveryEngine, Reporter};
use crate::core::engine::PlanDiscoveryEngine;
use crate::core::reporter::{JsonReporter, TextReporter};
use crate::spi::traits::CatalogRepository;

// Re-export all public types from SPI
pub use crate::spi::types::{CancelToken, DiscoveryError, RepoError};

// Re-export all public types from API
pub use crate::api::types::{
    Catalog, Conflict, ConflictType, DiscoveryOptions, DiscoveryOutcome, DiscoveryReport,
    EntitySource, Epic, Feature, KeyAssignment, MergeStrategy, PatternSet, ReportIssue,
    ValidationLevel,
};

// Repository implementations and pattern helpers for library consumers
pub use crate::core::frontmatter::FrontMatter;
pub use crate::core::patterns::{default_patterns, parse_patterns, PatternMatcher};
pub use crate::core::repo::{MemoryRepository, SqliteRepository};

/// Run a discovery with default options against `repo`.
///
/// Equivalent to calling [`discover_with_options`] with
/// [`DiscoveryOptions::default()`].
pub fn discover(repo: &dyn CatalogRepository) -> Result<DiscoveryOutcome, DiscoveryError> {
    discover_with_options(repo, &DiscoveryOptions::default())
}

/// Run a discovery with custom options against `repo`.
///
/// Parses the index, walks the documentation tree, reconciles the two
/// catalogs under the configured strategy, persists the result, and assigns
/// identifiers to unkeyed task artifacts.
pub fn discover_with_options(
    repo: &dyn CatalogRepository,
    options: &DiscoveryOptions,
) -> Result<DiscoveryOutcome, DiscoveryError> {
    PlanDiscoveryEngine::new(repo).discover(options)
}

/// Format a discovery outcome as human-readable text.
pub fn format_report_text(outcome: &DiscoveryOutcome) -> String {
    TextReporter.report(outcome)
}

/// Format a discovery outcome's report as JSON.
///
/// The shape is fixed for downstream tooling.
pub fn format_report_json(outcome: &DiscoveryOutcome) -> String {
    JsonReporter.report(outcome)
}
