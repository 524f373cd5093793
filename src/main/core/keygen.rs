use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::sync::Mutex;

use regex::Regex;

use super::frontmatter::{self, FrontMatter};
use super::patterns::PatternMatcher;
use crate::api::types::{KeyAssignment, ValidationLevel};
use crate::spi::traits::CatalogRepository;
use crate::spi::types::{CancelToken, RepoError};

/// Bound on re-running allocation after a uniqueness conflict.
const MAX_ALLOCATION_ATTEMPTS: u32 = 3;

/// Per-file failures during key generation. These never abort the
/// invocation; the orchestrator reports them and moves on.
#[derive(Debug)]
pub enum KeygenError {
    /// The file's path does not match any feature-folder shape.
    OrphanPath { path: PathBuf, message: String },
    /// The derived epic or feature key is not in the repository.
    OrphanEntity {
        path: PathBuf,
        key: String,
        message: String,
        suggestion: String,
    },
    /// The task file could not be read.
    Io { path: PathBuf, message: String },
    /// The repository failed outside the retryable conflict path.
    Repo { path: PathBuf, source: RepoError },
    Cancelled,
}

/// The epic and feature derived from a task file's location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathComponents {
    pub epic_key: String,
    pub feature_key: String,
}

/// Feature folder name carrying an optional project-number layer,
/// `E<nn>-P<nn>-F<nn>-<slug>`.
static PROJECT_FEATURE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<epic_id>E\d{2})-P\d{2}-(?P<feature_id>F\d{2})-(?P<feature_slug>[a-z0-9-]+)$")
        .unwrap()
});

/// Assigns identifiers to task artifacts that do not have one yet.
pub struct TaskKeyGenerator<'a> {
    matcher: &'a PatternMatcher,
    repo: &'a dyn CatalogRepository,
    dry_run: bool,
    validation: ValidationLevel,
    /// Sequences handed out under dry-run, so a batch still produces a
    /// contiguous range even though nothing is registered.
    dry_run_high_water: Mutex<HashMap<String, u32>>,
}

fn dir_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or_default()
}

impl<'a> TaskKeyGenerator<'a> {
    pub fn new(
        matcher: &'a PatternMatcher,
        repo: &'a dyn CatalogRepository,
        dry_run: bool,
        validation: ValidationLevel,
    ) -> Self {
        Self {
            matcher,
            repo,
            dry_run,
            validation,
            dry_run_high_water: Mutex::new(HashMap::new()),
        }
    }

    /// Derive the epic and feature keys from a task file's location.
    ///
    /// The file must sit directly inside a `tasks/` or `prps/` directory,
    /// whose parent is a feature folder, whose parent in turn is an epic
    /// folder.
    pub fn parse_path(&self, file: &Path) -> Result<PathComponents, String> {
        let expected = "expected <epic>/<feature>/{tasks|prps}/<file>.md";

        let bucket = match file.parent() {
            Some(p) => p,
            None => return Err(format!("no parent directory; {}", expected)),
        };
        let bucket_name = dir_name(bucket);
        if bucket_name != "tasks" && bucket_name != "prps" {
            return Err(format!(
                "parent directory '{}' is not tasks/ or prps/; {}",
                bucket_name, expected
            ));
        }

        let feature_dir = match bucket.parent() {
            Some(p) => p,
            None => return Err(format!("no feature directory; {}", expected)),
        };
        let feature_name = dir_name(feature_dir);

        let epic_dir = match feature_dir.parent() {
            Some(p) => p,
            None => return Err(format!("no epic directory; {}", expected)),
        };
        let epic_name = dir_name(epic_dir);
        let epic = match self.matcher.match_epic(epic_name) {
            Some(m) => m,
            None => {
                return Err(format!(
                    "'{}' does not match any epic folder pattern; {}",
                    epic_name, expected
                ))
            }
        };

        let feature_key = if let Some(feature) =
            self.matcher.match_feature(feature_name, Some(&epic.epic_id))
        {
            feature.key()
        } else if let Some(caps) = PROJECT_FEATURE_RE.captures(feature_name) {
            format!("{}-{}", &caps["epic_id"], &caps["feature_id"])
        } else {
            return Err(format!(
                "'{}' does not match any feature folder pattern; {}",
                feature_name, expected
            ));
        };

        Ok(PathComponents {
            epic_key: epic.epic_id,
            feature_key,
        })
    }

    /// Ensure the task file carries an identifier, generating and writing
    /// one when missing. Returns the assignment plus any warnings raised
    /// along the way.
    pub fn assign(
        &self,
        file: &Path,
        cancel: &CancelToken,
    ) -> Result<(KeyAssignment, Vec<String>), KeygenError> {
        if cancel.is_cancelled() {
            return Err(KeygenError::Cancelled);
        }

        let (record, _body) = frontmatter::read(file).map_err(|e| KeygenError::Io {
            path: file.to_path_buf(),
            message: e.to_string(),
        })?;

        // Already keyed: hand it back without touching the repository.
        if let Some(existing) = record.get("task_key").filter(|k| !k.is_empty()) {
            return Ok((
                KeyAssignment {
                    file: file.to_path_buf(),
                    task_key: existing.to_string(),
                    newly_generated: false,
                    written_to_file: true,
                    write_error: None,
                },
                Vec::new(),
            ));
        }

        let components = self.parse_path(file).map_err(|message| KeygenError::OrphanPath {
            path: file.to_path_buf(),
            message,
        })?;

        let mut warnings = Vec::new();
        self.validate_entities(file, &components, cancel, &mut warnings)?;

        self.allocate_and_write(file, &components.feature_key, cancel, warnings)
    }

    fn validate_entities(
        &self,
        file: &Path,
        components: &PathComponents,
        cancel: &CancelToken,
        warnings: &mut Vec<String>,
    ) -> Result<(), KeygenError> {
        let repo_err = |source: RepoError| match source {
            RepoError::Cancelled => KeygenError::Cancelled,
            other => KeygenError::Repo {
                path: file.to_path_buf(),
                source: other,
            },
        };

        let mut missing: Option<&str> = None;
        if !self.repo.epic_exists(&components.epic_key, cancel).map_err(repo_err)? {
            missing = Some(&components.epic_key);
        } else if !self
            .repo
            .feature_exists(&components.feature_key, cancel)
            .map_err(repo_err)?
        {
            missing = Some(&components.feature_key);
        }

        if let Some(key) = missing {
            let message = format!(
                "Task file '{}' belongs to '{}', which is not in the catalog",
                file.display(),
                key
            );
            let suggestion = format!(
                "Create '{}' (sync it into the catalog), or move the file under an existing feature",
                key
            );
            if self.validation == ValidationLevel::Permissive {
                warnings.push(format!("{}. {}", message, suggestion));
            } else {
                return Err(KeygenError::OrphanEntity {
                    path: file.to_path_buf(),
                    key: key.to_string(),
                    message,
                    suggestion,
                });
            }
        }
        Ok(())
    }

    /// Steps 3-4: read the max sequence, propose max+1, write the file, and
    /// register the identifier. A uniqueness conflict on registration
    /// re-runs both steps, bounded by [`MAX_ALLOCATION_ATTEMPTS`].
    fn allocate_and_write(
        &self,
        file: &Path,
        feature_key: &str,
        cancel: &CancelToken,
        warnings: Vec<String>,
    ) -> Result<(KeyAssignment, Vec<String>), KeygenError> {
        let repo_err = |source: RepoError| match source {
            RepoError::Cancelled => KeygenError::Cancelled,
            other => KeygenError::Repo {
                path: file.to_path_buf(),
                source: other,
            },
        };

        let mut last_conflict: Option<RepoError> = None;
        for _ in 0..MAX_ALLOCATION_ATTEMPTS {
            let max = self
                .repo
                .max_task_sequence(feature_key, cancel)
                .map_err(repo_err)?;

            if self.dry_run {
                let mut high_water = self.dry_run_high_water.lock().unwrap();
                let entry = high_water.entry(feature_key.to_string()).or_insert(max);
                let next = (*entry).max(max) + 1;
                *entry = next;
                return Ok((
                    KeyAssignment {
                        file: file.to_path_buf(),
                        task_key: format_task_key(feature_key, next),
                        newly_generated: true,
                        written_to_file: false,
                        write_error: None,
                    },
                    warnings,
                ));
            }

            let task_key = format_task_key(feature_key, max + 1);

            // Write the file before registering: a failed write leaves the
            // repository untouched, so a re-run reproduces the same max+1.
            let mut updates = FrontMatter::new();
            updates.set("task_key", &task_key);
            if let Err(e) = frontmatter::write(file, &updates) {
                return Ok((
                    KeyAssignment {
                        file: file.to_path_buf(),
                        task_key,
                        newly_generated: true,
                        written_to_file: false,
                        write_error: Some(e.to_string()),
                    },
                    warnings,
                ));
            }

            match self.repo.register_task(&task_key, feature_key, file, cancel) {
                Ok(()) => {
                    return Ok((
                        KeyAssignment {
                            file: file.to_path_buf(),
                            task_key,
                            newly_generated: true,
                            written_to_file: true,
                            write_error: None,
                        },
                        warnings,
                    ));
                }
                Err(RepoError::Conflict(key)) => {
                    last_conflict = Some(RepoError::Conflict(key));
                    continue;
                }
                Err(e) => return Err(repo_err(e)),
            }
        }

        Err(KeygenError::Repo {
            path: file.to_path_buf(),
            source: last_conflict.unwrap_or_else(|| {
                RepoError::Backend("allocation retries exhausted".to_string())
            }),
        })
    }
}

fn format_task_key(feature_key: &str, sequence: u32) -> String {
    format!("T-{}-{:03}", feature_key, sequence)
}
