use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::spi::types::CancelToken;

/// Conflict-resolution strategy selected by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeStrategy {
    /// The index is authoritative; index-only entities missing on disk are fatal.
    IndexPrecedence,
    /// Folders are authoritative; index-only entities are skipped with warnings.
    FolderPrecedence,
    /// Union of both sources; metadata from the index, paths from the folders.
    Merge,
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MergeStrategy::IndexPrecedence => "index-precedence",
            MergeStrategy::FolderPrecedence => "folder-precedence",
            MergeStrategy::Merge => "merge",
        };
        write!(f, "{}", s)
    }
}

/// How hard the engine pushes back on inconsistencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationLevel {
    /// Relationship mismatches abort the reconciliation.
    Strict,
    /// Default behaviour: mismatches warn, orphans are per-file errors.
    Balanced,
    /// Orphan-entity failures downgrade to warnings; keys are still written.
    Permissive,
}

/// Uncompiled pattern lists replacing the embedded defaults.
///
/// Each entry is a regex with named capture groups drawn from the fixed set
/// `{epic_id, epic_num, epic_slug, feature_id, feature_num, feature_slug}`.
/// Compilability is validated when the registry is built; a pattern that does
/// not compile is a configuration error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternSet {
    #[serde(default)]
    pub epic_folder: Vec<String>,
    #[serde(default)]
    pub feature_folder: Vec<String>,
    #[serde(default)]
    pub feature_file: Vec<String>,
}

/// Configuration for one discovery invocation.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Root of the documentation tree.
    pub docs_root: PathBuf,
    /// Explicit index file path. When unset, `<docs_root>/epic-index.md` is
    /// used if present; its absence then means the user opted out of the index.
    pub index_path: Option<PathBuf>,
    pub strategy: MergeStrategy,
    pub validation_level: ValidationLevel,
    /// Suppress repository and file writes; identifiers are still computed.
    pub dry_run: bool,
    /// Replacement pattern registry. `None` uses the embedded defaults.
    pub pattern_overrides: Option<PatternSet>,
    pub cancel: CancelToken,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            docs_root: PathBuf::from("docs/plan"),
            index_path: None,
            strategy: MergeStrategy::IndexPrecedence,
            validation_level: ValidationLevel::Balanced,
            dry_run: false,
            pattern_overrides: None,
            cancel: CancelToken::new(),
        }
    }
}

/// Provenance of a merged catalog entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntitySource {
    Index,
    Folder,
    Merged,
}

/// Top-level planning unit: folder keyed `E<nn>` or one of the special slugs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Epic {
    pub key: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Path of the epic folder's `epic.md`, when one exists on disk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_folder_path: Option<String>,
    pub source: EntitySource,
    pub features: Vec<Feature>,
}

/// Second-level unit under an epic, keyed `<epic>-F<nn>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    pub key: String,
    pub epic_key: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Path of the feature's descriptor markdown, when one exists on disk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_folder_path: Option<String>,
    pub related_docs: Vec<PathBuf>,
    pub source: EntitySource,
}

/// The reconciled entity set produced by one discovery invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    pub epics: Vec<Epic>,
}

impl Catalog {
    pub fn feature_count(&self) -> usize {
        self.epics.iter().map(|e| e.features.len()).sum()
    }
}

/// Kind tag of a per-entity disagreement between index and folders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    EpicIndexOnly,
    EpicFolderOnly,
    FeatureIndexOnly,
    FeatureFolderOnly,
    RelationshipMismatch,
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConflictType::EpicIndexOnly => "epic_index_only",
            ConflictType::EpicFolderOnly => "epic_folder_only",
            ConflictType::FeatureIndexOnly => "feature_index_only",
            ConflictType::FeatureFolderOnly => "feature_folder_only",
            ConflictType::RelationshipMismatch => "relationship_mismatch",
        };
        write!(f, "{}", s)
    }
}

/// One detected disagreement plus how the active strategy resolved it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    #[serde(rename = "type")]
    pub conflict_type: ConflictType,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub resolution: String,
    pub strategy: MergeStrategy,
    pub suggestion: String,
}

/// A reported error with enough context to act on without reading source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportIssue {
    /// One of `configuration`, `io`, `orphan-path`, `orphan-entity`,
    /// `index-precedence-violation`.
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// Counts, conflicts, warnings, and errors from one discovery invocation.
///
/// The serialized shape is fixed for downstream tooling; field names must
/// not change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryReport {
    pub folders_scanned: usize,
    pub files_analyzed: usize,
    pub epics_discovered: usize,
    pub epics_from_index: usize,
    pub epics_from_folders: usize,
    pub features_discovered: usize,
    pub features_from_index: usize,
    pub features_from_folders: usize,
    pub related_docs_cataloged: usize,
    pub conflicts_detected: usize,
    pub conflicts: Vec<Conflict>,
    pub warnings: Vec<String>,
    pub errors: Vec<ReportIssue>,
}

/// Outcome of assigning (or re-reading) one task file's identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyAssignment {
    pub file: PathBuf,
    pub task_key: String,
    /// False when the file already carried the key, or under dry-run.
    pub newly_generated: bool,
    pub written_to_file: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_error: Option<String>,
}

/// Everything one discovery invocation produces.
#[derive(Debug, Clone)]
pub struct DiscoveryOutcome {
    pub catalog: Catalog,
    pub report: DiscoveryReport,
    pub assignments: Vec<KeyAssignment>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_serializes_kebab_case() {
        let json = serde_json::to_string(&MergeStrategy::IndexPrecedence).unwrap();
        assert_eq!(json, "\"index-precedence\"");
        let json = serde_json::to_string(&MergeStrategy::FolderPrecedence).unwrap();
        assert_eq!(json, "\"folder-precedence\"");
    }

    #[test]
    fn test_conflict_type_serializes_snake_case() {
        let json = serde_json::to_string(&ConflictType::EpicIndexOnly).unwrap();
        assert_eq!(json, "\"epic_index_only\"");
        assert_eq!(ConflictType::RelationshipMismatch.to_string(), "relationship_mismatch");
    }

    #[test]
    fn test_report_json_shape() {
        let report = DiscoveryReport::default();
        let val = serde_json::to_value(&report).unwrap();
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
            assert!(val.get(field).is_some(), "missing report field {}", field);
        }
    }

    #[test]
    fn test_conflict_json_uses_type_key() {
        let conflict = Conflict {
            conflict_type: ConflictType::EpicFolderOnly,
            key: "E04".to_string(),
            path: Some(PathBuf::from("docs/plan/E04-auth")),
            resolution: "skipped".to_string(),
            strategy: MergeStrategy::IndexPrecedence,
            suggestion: "Add E04 to the index".to_string(),
        };
        let val = serde_json::to_value(&conflict).unwrap();
        assert_eq!(val["type"], "epic_folder_only");
        assert_eq!(val["strategy"], "index-precedence");
    }

    #[test]
    fn test_default_options() {
        let opts = DiscoveryOptions::default();
        assert_eq!(opts.docs_root, PathBuf::from("docs/plan"));
        assert_eq!(opts.strategy, MergeStrategy::IndexPrecedence);
        assert_eq!(opts.validation_level, ValidationLevel::Balanced);
        assert!(!opts.dry_run);
        assert!(opts.index_path.is_none());
        assert!(opts.pattern_overrides.is_none());
    }
}
