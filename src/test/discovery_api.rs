mod common;

use std::path::{Path, PathBuf};

use plan_engine::{
    discover_with_options, format_report_json, DiscoveryOptions, EntitySource, MemoryRepository,
    MergeStrategy,
};

fn options_for(root: &Path) -> DiscoveryOptions {
    DiscoveryOptions {
        docs_root: root.to_path_buf(),
        ..DiscoveryOptions::default()
    }
}

#[test]
fn test_basic_scan() {
    let tmp = common::create_basic_tree();
    let repo = MemoryRepository::new();
    let outcome = discover_with_options(&repo, &options_for(tmp.path())).unwrap();

    assert_eq!(outcome.report.epics_discovered, 1);
    assert_eq!(outcome.report.features_discovered, 2);
    assert_eq!(outcome.report.conflicts_detected, 0);
    assert!(outcome.report.errors.is_empty());

    let epic = &outcome.catalog.epics[0];
    assert_eq!(epic.key, "E04");
    for feature in &epic.features {
        assert!(feature.file_path.as_ref().unwrap().ends_with("prd.md"));
    }
}

#[test]
fn test_feature_keys_prefix_their_epic() {
    let tmp = common::create_basic_tree();
    let repo = MemoryRepository::new();
    let outcome = discover_with_options(&repo, &options_for(tmp.path())).unwrap();
    for epic in &outcome.catalog.epics {
        for feature in &epic.features {
            assert!(
                feature.key.starts_with(&format!("{}-F", feature.epic_key)),
                "feature {} does not extend epic {}",
                feature.key,
                feature.epic_key
            );
        }
    }
}

#[test]
fn test_special_slug_epic() {
    let tmp = tempfile::TempDir::new().unwrap();
    std::fs::create_dir(tmp.path().join("tech-debt")).unwrap();
    let repo = MemoryRepository::new();
    let outcome = discover_with_options(&repo, &options_for(tmp.path())).unwrap();

    assert_eq!(outcome.report.epics_discovered, 1);
    assert_eq!(outcome.catalog.epics[0].key, "tech-debt");
    assert_eq!(outcome.report.features_discovered, 0);
    assert!(outcome.report.errors.is_empty());
}

#[test]
fn test_empty_root() {
    let tmp = tempfile::TempDir::new().unwrap();
    let repo = MemoryRepository::new();
    let outcome = discover_with_options(&repo, &options_for(tmp.path())).unwrap();
    assert_eq!(outcome.report.folders_scanned, 0);
    assert_eq!(outcome.report.files_analyzed, 0);
    assert_eq!(outcome.report.epics_discovered, 0);
    assert!(outcome.report.errors.is_empty());
}

#[test]
fn test_missing_root_is_fatal() {
    let repo = MemoryRepository::new();
    let err = discover_with_options(
        &repo,
        &options_for(Path::new("/nonexistent/docs/plan")),
    )
    .unwrap_err();
    assert!(matches!(err, plan_engine::DiscoveryError::Io { .. }));
}

#[test]
fn test_no_index_equals_folder_catalog_all_strategies() {
    // Without an index the strategy is irrelevant and nothing warns about
    // missing-index items.
    let tmp = tempfile::TempDir::new().unwrap();
    common::write(&tmp.path().join("E04-core/E04-F01-parsing/prd.md"), "p\n");
    common::write(&tmp.path().join("E05-billing/epic.md"), "---\ntitle: B\n---\n");

    for strategy in [
        MergeStrategy::IndexPrecedence,
        MergeStrategy::FolderPrecedence,
        MergeStrategy::Merge,
    ] {
        let repo = MemoryRepository::new();
        let mut options = options_for(tmp.path());
        options.strategy = strategy;
        let outcome = discover_with_options(&repo, &options).unwrap();
        assert_eq!(outcome.report.epics_discovered, 2);
        assert_eq!(outcome.report.features_discovered, 1);
        assert_eq!(outcome.report.conflicts_detected, 0);
        assert!(outcome.report.warnings.is_empty());
        for epic in &outcome.catalog.epics {
            assert_eq!(epic.source, EntitySource::Folder);
        }
    }
}

#[test]
fn test_agreeing_sources_identical_under_all_strategies() {
    let tmp = common::create_basic_tree();
    let mut catalogs = Vec::new();
    for strategy in [
        MergeStrategy::IndexPrecedence,
        MergeStrategy::FolderPrecedence,
        MergeStrategy::Merge,
    ] {
        let repo = MemoryRepository::new();
        let mut options = options_for(tmp.path());
        options.strategy = strategy;
        let outcome = discover_with_options(&repo, &options).unwrap();
        assert_eq!(outcome.report.conflicts_detected, 0, "{:?}", strategy);
        catalogs.push(serde_json::to_value(&outcome.catalog).unwrap());
    }
    assert_eq!(catalogs[0], catalogs[1]);
    assert_eq!(catalogs[1], catalogs[2]);
}

#[test]
fn test_descriptor_precedence_and_related_docs() {
    let tmp = tempfile::TempDir::new().unwrap();
    let feature = tmp.path().join("E04-core/E04-F07-search");
    common::write(&feature.join("prd.md"), "primary\n");
    common::write(&feature.join("PRD_F07-search.md"), "legacy\n");
    common::write(&feature.join("02-architecture.md"), "arch\n");

    let repo = MemoryRepository::new();
    let outcome = discover_with_options(&repo, &options_for(tmp.path())).unwrap();
    let f = &outcome.catalog.epics[0].features[0];
    assert!(f.file_path.as_ref().unwrap().ends_with("prd.md"));
    assert_eq!(f.related_docs.len(), 2);
    assert_eq!(outcome.report.related_docs_cataloged, 2);
}

#[test]
fn test_feature_without_descriptor() {
    let tmp = tempfile::TempDir::new().unwrap();
    let feature = tmp.path().join("E04-core/E04-F07-search");
    common::write(&feature.join("notes.md"), "notes\n");

    let repo = MemoryRepository::new();
    let outcome = discover_with_options(&repo, &options_for(tmp.path())).unwrap();
    let f = &outcome.catalog.epics[0].features[0];
    assert!(f.file_path.is_none());
    assert_eq!(f.related_docs.len(), 1);
}

#[test]
fn test_report_json_shape_is_stable() {
    let tmp = common::create_basic_tree();
    let repo = MemoryRepository::new();
    let outcome = discover_with_options(&repo, &options_for(tmp.path())).unwrap();
    let json = format_report_json(&outcome);
    let val: serde_json::Value = serde_json::from_str(&json).unwrap();
    for field in [
        "folders_scanned",
        "files_analyzed",
        "epics_discovered",
        "epics_from_index",
        "epics_from_folders",
        "features_discovered",
        "features_from_index",
        "features_from_folders",
        "related_docs_cataloged",
        "conflicts_detected",
        "conflicts",
        "warnings",
        "errors",
    ] {
        assert!(val.get(field).is_some(), "missing field {}", field);
    }
}

#[test]
fn test_deterministic_output() {
    let tmp = common::create_basic_tree();
    let repo = MemoryRepository::new();
    let options = options_for(tmp.path());
    let first = discover_with_options(&repo, &options).unwrap();
    let second = discover_with_options(&repo, &options).unwrap();
    assert_eq!(
        serde_json::to_value(&first.catalog).unwrap(),
        serde_json::to_value(&second.catalog).unwrap()
    );
}

#[test]
fn test_hidden_directories_excluded() {
    let tmp = tempfile::TempDir::new().unwrap();
    common::write(&tmp.path().join(".archive/E99-old/prd.md"), "old\n");
    common::write(&tmp.path().join("E04-core/E04-F01-parsing/prd.md"), "p\n");

    let repo = MemoryRepository::new();
    let outcome = discover_with_options(&repo, &options_for(tmp.path())).unwrap();
    assert_eq!(outcome.report.epics_discovered, 1);
    assert!(outcome
        .catalog
        .epics
        .iter()
        .all(|e| e.key != "E99"));
}

#[test]
fn test_custom_folder_path_surfaces_in_catalog() {
    let tmp = tempfile::TempDir::new().unwrap();
    common::write(
        &tmp.path().join("E04-core/epic.md"),
        "---\ntitle: Core\ncustom_folder_path: archived/E04\n---\n",
    );
    let repo = MemoryRepository::new();
    let outcome = discover_with_options(&repo, &options_for(tmp.path())).unwrap();
    assert_eq!(
        outcome.catalog.epics[0].custom_folder_path.as_deref(),
        Some("archived/E04")
    );
}

#[test]
fn test_pattern_override_changes_recognition() {
    let tmp = tempfile::TempDir::new().unwrap();
    std::fs::create_dir(tmp.path().join("epic-07")).unwrap();

    let repo = MemoryRepository::new();
    let mut options = options_for(tmp.path());
    options.pattern_overrides = Some(plan_engine::PatternSet {
        epic_folder: vec![r"^epic-(?P<epic_num>\d{2})$".to_string()],
        feature_folder: vec![],
        feature_file: vec![],
    });
    let outcome = discover_with_options(&repo, &options).unwrap();
    assert_eq!(outcome.catalog.epics[0].key, "E07");
}

#[test]
fn test_outcome_paths_are_absolute_under_root() {
    let tmp = common::create_basic_tree();
    let repo = MemoryRepository::new();
    let outcome = discover_with_options(&repo, &options_for(tmp.path())).unwrap();
    let epic_path: &PathBuf = outcome.catalog.epics[0].file_path.as_ref().unwrap();
    assert!(epic_path.starts_with(tmp.path()));
}
