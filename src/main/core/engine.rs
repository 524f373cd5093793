use super::index::{self, IndexCatalog};
use super::keygen::{KeygenError, TaskKeyGenerator};
use super::patterns::{self, PatternMatcher};
use super::reconcile;
use super::scanner;
use crate::api::traits::DiscoveryEngine;
use crate::api::types::{
    DiscoveryOptions, DiscoveryOutcome, DiscoveryReport, KeyAssignment, ReportIssue,
};
use crate::spi::traits::CatalogRepository;
use crate::spi::types::DiscoveryError;

/// Default index file name, looked up under the docs root when the caller
/// does not name one explicitly.
pub const DEFAULT_INDEX_NAME: &str = "epic-index.md";

/// The discovery orchestrator: index parse + folder scan, reconciliation,
/// catalog persistence, then key generation for unkeyed task artifacts.
pub struct PlanDiscoveryEngine<'r> {
    repo: &'r dyn CatalogRepository,
}

impl<'r> PlanDiscoveryEngine<'r> {
    pub fn new(repo: &'r dyn CatalogRepository) -> Self {
        Self { repo }
    }

    /// Resolve the index catalog. An explicit path that cannot be read is
    /// fatal; the default path is optional (absence means the user opted
    /// out of the index).
    fn load_index(&self, options: &DiscoveryOptions) -> Result<(IndexCatalog, bool), DiscoveryError> {
        match &options.index_path {
            Some(path) => Ok((index::parse_index_file(path)?, true)),
            None => {
                let default = options.docs_root.join(DEFAULT_INDEX_NAME);
                if default.is_file() {
                    Ok((index::parse_index_file(&default)?, true))
                } else {
                    Ok((IndexCatalog::default(), false))
                }
            }
        }
    }
}

impl DiscoveryEngine for PlanDiscoveryEngine<'_> {
    fn discover(&self, options: &DiscoveryOptions) -> Result<DiscoveryOutcome, DiscoveryError> {
        let cancel = &options.cancel;
        if cancel.is_cancelled() {
            return Err(DiscoveryError::Cancelled);
        }

        // 1. Compile the pattern registry; a bad override is fatal up front.
        let pattern_set = match &options.pattern_overrides {
            Some(set) => set.clone(),
            None => patterns::default_patterns()?,
        };
        let matcher = PatternMatcher::compile(&pattern_set)?;

        // 2. Parse the index and walk the folders. The two catalogs are
        // independent; the scanner also validates the docs root.
        let folders = scanner::scan(&options.docs_root, &matcher, cancel)?;
        let (index_catalog, index_provided) = self.load_index(options)?;

        // 3. Reconcile under the chosen strategy.
        let reconciliation = reconcile::reconcile(
            &index_catalog,
            &folders,
            options.strategy,
            options.validation_level,
            index_provided,
        )?;

        let mut report = DiscoveryReport {
            folders_scanned: folders.folders_scanned,
            files_analyzed: folders.files_analyzed,
            epics_discovered: reconciliation.catalog.epics.len(),
            epics_from_index: index_catalog.epics.len(),
            epics_from_folders: folders.epics.len(),
            features_discovered: reconciliation.catalog.feature_count(),
            features_from_index: index_catalog.features.len(),
            features_from_folders: folders.features.len(),
            related_docs_cataloged: folders.features.iter().map(|f| f.related_docs.len()).sum(),
            conflicts_detected: reconciliation.conflicts.len(),
            conflicts: reconciliation.conflicts,
            warnings: Vec::new(),
            errors: Vec::new(),
        };
        report.warnings.extend(index_catalog.warnings.iter().cloned());
        report.warnings.extend(folders.warnings.iter().cloned());
        report.warnings.extend(reconciliation.warnings);

        // 4. Persist the resolved catalog (suppressed under dry-run).
        if !options.dry_run {
            for epic in &reconciliation.catalog.epics {
                self.repo.upsert_epic(epic, cancel)?;
                for feature in &epic.features {
                    self.repo.upsert_feature(feature, cancel)?;
                }
            }
        }

        // 5. Assign identifiers to unkeyed task artifacts. Failures here
        // are per-file: they land in the report and the rest continue.
        let generator = TaskKeyGenerator::new(
            &matcher,
            self.repo,
            options.dry_run,
            options.validation_level,
        );
        let mut assignments: Vec<KeyAssignment> = Vec::new();
        for feature in &folders.features {
            for task_file in &feature.task_files {
                match generator.assign(task_file, cancel) {
                    Ok((assignment, warnings)) => {
                        report.warnings.extend(warnings);
                        assignments.push(assignment);
                    }
                    Err(KeygenError::OrphanPath { path, message }) => {
                        report.errors.push(ReportIssue {
                            kind: "orphan-path".to_string(),
                            path: Some(path),
                            key: None,
                            message,
                            suggestion: None,
                        });
                    }
                    Err(KeygenError::OrphanEntity {
                        path,
                        key,
                        message,
                        suggestion,
                    }) => {
                        report.errors.push(ReportIssue {
                            kind: "orphan-entity".to_string(),
                            path: Some(path),
                            key: Some(key),
                            message,
                            suggestion: Some(suggestion),
                        });
                    }
                    Err(KeygenError::Io { path, message }) => {
                        report.errors.push(ReportIssue {
                            kind: "io".to_string(),
                            path: Some(path),
                            key: None,
                            message,
                            suggestion: None,
                        });
                    }
                    Err(KeygenError::Repo { path, source }) => {
                        return Err(DiscoveryError::Io {
                            path,
                            source: std::io::Error::other(source.to_string()),
                        });
                    }
                    Err(KeygenError::Cancelled) => return Err(DiscoveryError::Cancelled),
                }
            }
        }

        Ok(DiscoveryOutcome {
            catalog: reconciliation.catalog,
            report,
            assignments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::{MergeStrategy, PatternSet, ValidationLevel};
    use crate::core::repo::MemoryRepository;
    use crate::spi::types::CancelToken;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn options_for(root: &Path) -> DiscoveryOptions {
        DiscoveryOptions {
            docs_root: root.to_path_buf(),
            ..DiscoveryOptions::default()
        }
    }

    #[test]
    fn test_basic_scan_counts() {
        let tmp = TempDir::new().unwrap();
        write(&tmp.path().join("E04-x/epic.md"), "---\ntitle: X\n---\n");
        write(&tmp.path().join("E04-x/E04-F01-y/prd.md"), "y\n");
        write(&tmp.path().join("E04-x/E04-F02-z/prd.md"), "z\n");

        let repo = MemoryRepository::new();
        let engine = PlanDiscoveryEngine::new(&repo);
        let outcome = engine.discover(&options_for(tmp.path())).unwrap();

        assert_eq!(outcome.report.epics_discovered, 1);
        assert_eq!(outcome.report.features_discovered, 2);
        assert_eq!(outcome.report.conflicts_detected, 0);
        assert!(outcome.report.errors.is_empty());
        for feature in &outcome.catalog.epics[0].features {
            assert!(feature.file_path.as_ref().unwrap().ends_with("prd.md"));
        }
    }

    #[test]
    fn test_missing_root_no_partial_report() {
        let repo = MemoryRepository::new();
        let engine = PlanDiscoveryEngine::new(&repo);
        let err = engine
            .discover(&options_for(Path::new("/nonexistent/docs/plan")))
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::Io { .. }));
    }

    #[test]
    fn test_explicit_index_missing_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let repo = MemoryRepository::new();
        let engine = PlanDiscoveryEngine::new(&repo);
        let mut options = options_for(tmp.path());
        options.index_path = Some(tmp.path().join("absent-index.md"));
        let err = engine.discover(&options).unwrap_err();
        assert!(matches!(err, DiscoveryError::Io { .. }));
    }

    #[test]
    fn test_default_index_picked_up() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("E04-x")).unwrap();
        write(
            &tmp.path().join(DEFAULT_INDEX_NAME),
            "[X](E04-x/)\n[Ghost](E05-ghost/)\n",
        );

        let repo = MemoryRepository::new();
        let engine = PlanDiscoveryEngine::new(&repo);
        let mut options = options_for(tmp.path());
        options.strategy = MergeStrategy::Merge;
        let outcome = engine.discover(&options).unwrap();
        assert_eq!(outcome.report.epics_from_index, 2);
        assert_eq!(outcome.report.epics_discovered, 2);
        assert_eq!(outcome.report.conflicts_detected, 1);
    }

    #[test]
    fn test_index_precedence_violation_is_fatal() {
        let tmp = TempDir::new().unwrap();
        write(&tmp.path().join(DEFAULT_INDEX_NAME), "[A](./E04-a/)\n");

        let repo = MemoryRepository::new();
        let engine = PlanDiscoveryEngine::new(&repo);
        let err = engine.discover(&options_for(tmp.path())).unwrap_err();
        match err {
            DiscoveryError::Reconcile { key, .. } => assert_eq!(key, "E04"),
            other => panic!("expected Reconcile, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_pattern_override_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let repo = MemoryRepository::new();
        let engine = PlanDiscoveryEngine::new(&repo);
        let mut options = options_for(tmp.path());
        options.pattern_overrides = Some(PatternSet {
            epic_folder: vec!["(broken".to_string()],
            feature_folder: vec![],
            feature_file: vec![],
        });
        let err = engine.discover(&options).unwrap_err();
        assert!(matches!(err, DiscoveryError::Config(_)));
    }

    #[test]
    fn test_catalog_persisted_and_keys_assigned() {
        let tmp = TempDir::new().unwrap();
        write(&tmp.path().join("E04-x/epic.md"), "---\ntitle: X\n---\n");
        write(&tmp.path().join("E04-x/E04-F01-y/prd.md"), "y\n");
        write(
            &tmp.path().join("E04-x/E04-F01-y/tasks/first.md"),
            "---\ntitle: First\n---\n",
        );

        let repo = MemoryRepository::new();
        let engine = PlanDiscoveryEngine::new(&repo);
        let outcome = engine.discover(&options_for(tmp.path())).unwrap();

        assert_eq!(outcome.assignments.len(), 1);
        let assignment = &outcome.assignments[0];
        assert_eq!(assignment.task_key, "T-E04-F01-001");
        assert!(assignment.written_to_file);
        assert!(repo
            .feature_exists("E04-F01", &CancelToken::new())
            .unwrap());
    }

    #[test]
    fn test_dry_run_leaves_everything_untouched() {
        let tmp = TempDir::new().unwrap();
        write(&tmp.path().join("E04-x/E04-F01-y/prd.md"), "y\n");
        let task = tmp.path().join("E04-x/E04-F01-y/tasks/first.md");
        write(&task, "---\ntitle: First\n---\n");
        let before = fs::read(&task).unwrap();

        let repo = MemoryRepository::new();
        let engine = PlanDiscoveryEngine::new(&repo);
        let mut options = options_for(tmp.path());
        options.dry_run = true;
        options.validation_level = ValidationLevel::Permissive;
        let outcome = engine.discover(&options).unwrap();

        let assignment = &outcome.assignments[0];
        assert_eq!(assignment.task_key, "T-E04-F01-001");
        assert!(!assignment.written_to_file);
        assert_eq!(fs::read(&task).unwrap(), before);
        assert!(!repo.epic_exists("E04", &CancelToken::new()).unwrap());
    }

    #[test]
    fn test_orphan_entity_reported_per_file() {
        let tmp = TempDir::new().unwrap();
        write(&tmp.path().join("E04-x/E04-F01-y/prd.md"), "y\n");
        write(&tmp.path().join("E04-x/E04-F01-y/tasks/a.md"), "a\n");
        write(&tmp.path().join("E04-x/E04-F01-y/tasks/b.md"), "b\n");

        // Dry-run skips catalog persistence, so the derived keys are
        // missing from the repository and both files orphan out.
        let repo = MemoryRepository::new();
        let engine = PlanDiscoveryEngine::new(&repo);
        let mut options = options_for(tmp.path());
        options.dry_run = true;
        let outcome = engine.discover(&options).unwrap();

        assert!(outcome.assignments.is_empty());
        assert_eq!(outcome.report.errors.len(), 2);
        for issue in &outcome.report.errors {
            assert_eq!(issue.kind, "orphan-entity");
            assert!(issue.suggestion.is_some());
        }
    }

    #[test]
    fn test_already_keyed_task_untouched() {
        let tmp = TempDir::new().unwrap();
        write(&tmp.path().join("E04-x/E04-F01-y/prd.md"), "y\n");
        let task = tmp.path().join("E04-x/E04-F01-y/tasks/done.md");
        write(&task, "---\ntask_key: T-E04-F01-042\n---\n");

        let repo = MemoryRepository::new();
        let engine = PlanDiscoveryEngine::new(&repo);
        let outcome = engine.discover(&options_for(tmp.path())).unwrap();

        let assignment = &outcome.assignments[0];
        assert_eq!(assignment.task_key, "T-E04-F01-042");
        assert!(!assignment.newly_generated);
    }

    #[test]
    fn test_empty_root_zero_counts() {
        let tmp = TempDir::new().unwrap();
        let repo = MemoryRepository::new();
        let engine = PlanDiscoveryEngine::new(&repo);
        let outcome = engine.discover(&options_for(tmp.path())).unwrap();
        assert_eq!(outcome.report.folders_scanned, 0);
        assert_eq!(outcome.report.epics_discovered, 0);
        assert!(outcome.report.errors.is_empty());
        assert!(outcome.report.warnings.is_empty());
    }

    #[test]
    fn test_cancellation_before_start() {
        let tmp = TempDir::new().unwrap();
        let repo = MemoryRepository::new();
        let engine = PlanDiscoveryEngine::new(&repo);
        let options = options_for(tmp.path());
        options.cancel.cancel();
        assert!(matches!(
            engine.discover(&options),
            Err(DiscoveryError::Cancelled)
        ));
    }
}
