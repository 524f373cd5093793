use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use plan_engine::{
    discover_with_options, format_report_json, format_report_text, parse_patterns,
    DiscoveryOptions, MemoryRepository, MergeStrategy, SqliteRepository, ValidationLevel,
};
use plan_engine::spi::traits::CatalogRepository;

#[derive(Parser)]
#[command(name = "plan-engine", version, about = "Planning-tree discovery engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile the index and folder tree, then key unkeyed task files
    Sync {
        /// Root of the documentation tree (default: docs/plan)
        path: Option<PathBuf>,

        /// Path to the index markdown (default: <root>/epic-index.md if present)
        #[arg(long)]
        index: Option<PathBuf>,

        /// Conflict strategy: index-precedence, folder-precedence, or merge
        #[arg(long, default_value = "index-precedence")]
        strategy: String,

        /// Validation level: strict, balanced, or permissive
        #[arg(long, default_value = "balanced")]
        validation: String,

        /// Compute everything but write nothing
        #[arg(long)]
        dry_run: bool,

        /// Path to a TOML pattern-override file
        #[arg(long)]
        patterns: Option<PathBuf>,

        /// SQLite catalog database (in-memory when omitted)
        #[arg(long)]
        db: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn parse_strategy(input: &str) -> Result<MergeStrategy, String> {
    match input {
        "index-precedence" | "index_precedence" => Ok(MergeStrategy::IndexPrecedence),
        "folder-precedence" | "folder_precedence" => Ok(MergeStrategy::FolderPrecedence),
        "merge" => Ok(MergeStrategy::Merge),
        other => Err(format!(
            "unknown strategy '{}' (use 'index-precedence', 'folder-precedence', or 'merge')",
            other
        )),
    }
}

fn parse_validation(input: &str) -> Result<ValidationLevel, String> {
    match input {
        "strict" => Ok(ValidationLevel::Strict),
        "balanced" => Ok(ValidationLevel::Balanced),
        "permissive" => Ok(ValidationLevel::Permissive),
        other => Err(format!(
            "unknown validation level '{}' (use 'strict', 'balanced', or 'permissive')",
            other
        )),
    }
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Sync {
            path,
            index,
            strategy,
            validation,
            dry_run,
            patterns,
            db,
            json,
        } => {
            let strategy = match parse_strategy(&strategy) {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    process::exit(2);
                }
            };
            let validation_level = match parse_validation(&validation) {
                Ok(v) => v,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    process::exit(2);
                }
            };

            let pattern_overrides = match patterns {
                Some(ref p) => {
                    let content = match std::fs::read_to_string(p) {
                        Ok(c) => c,
                        Err(e) => {
                            eprintln!("Error: cannot read patterns file '{}': {}", p.display(), e);
                            process::exit(2);
                        }
                    };
                    match parse_patterns(&content) {
                        Ok(set) => Some(set),
                        Err(e) => {
                            eprintln!("Error: {}", e);
                            process::exit(2);
                        }
                    }
                }
                None => None,
            };

            let options = DiscoveryOptions {
                docs_root: path.unwrap_or_else(|| PathBuf::from("docs/plan")),
                index_path: index,
                strategy,
                validation_level,
                dry_run,
                pattern_overrides,
                ..DiscoveryOptions::default()
            };

            // The catalog lives in SQLite when --db is given; otherwise one
            // in-memory run (useful for dry runs and CI checks).
            let sqlite;
            let memory;
            let repo: &dyn CatalogRepository = match db {
                Some(ref path) => {
                    sqlite = match SqliteRepository::open(path) {
                        Ok(r) => r,
                        Err(e) => {
                            eprintln!("Error: cannot open database '{}': {}", path.display(), e);
                            process::exit(2);
                        }
                    };
                    &sqlite
                }
                None => {
                    memory = MemoryRepository::new();
                    &memory
                }
            };

            match discover_with_options(repo, &options) {
                Ok(outcome) => {
                    if json {
                        println!("{}", format_report_json(&outcome));
                    } else {
                        print!("{}", format_report_text(&outcome));
                    }
                    if outcome.report.conflicts_detected > 0 || !outcome.report.errors.is_empty() {
                        process::exit(1);
                    }
                    process::exit(0);
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    process::exit(2);
                }
            }
        }
    }
}
