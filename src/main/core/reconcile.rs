use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use super::index::{IndexCatalog, IndexEpic, IndexFeature};
use super::scanner::{FolderCatalog, FolderEpic, FolderFeature};
use crate::api::types::{
    Catalog, Conflict, ConflictType, Epic, EntitySource, Feature, MergeStrategy, ValidationLevel,
};
use crate::spi::types::DiscoveryError;

/// Merged catalog plus everything the reconciliation had to say about it.
#[derive(Debug, Default)]
pub struct Reconciliation {
    pub catalog: Catalog,
    pub conflicts: Vec<Conflict>,
    pub warnings: Vec<String>,
}

fn suggestion_for(conflict_type: ConflictType, key: &str) -> String {
    match conflict_type {
        ConflictType::EpicIndexOnly => format!(
            "Create a folder for '{}' under the docs root, or remove it from the index",
            key
        ),
        ConflictType::EpicFolderOnly => {
            format!("Add '{}' to the index, or delete its folder", key)
        }
        ConflictType::FeatureIndexOnly => format!(
            "Create a feature folder for '{}' under its epic, or remove it from the index",
            key
        ),
        ConflictType::FeatureFolderOnly => {
            format!("List '{}' under its epic in the index, or delete its folder", key)
        }
        ConflictType::RelationshipMismatch => format!(
            "Move the folder of '{}' under the epic the index declares, or fix the index entry",
            key
        ),
    }
}

fn epic_from_index(ie: &IndexEpic) -> Epic {
    Epic {
        key: ie.key.clone(),
        title: if ie.title.is_empty() { ie.key.clone() } else { ie.title.clone() },
        description: None,
        file_path: None,
        custom_folder_path: None,
        source: EntitySource::Index,
        features: Vec::new(),
    }
}

fn epic_from_folder(fe: &FolderEpic) -> Epic {
    Epic {
        key: fe.key.clone(),
        title: fe
            .title
            .clone()
            .or_else(|| fe.slug.clone())
            .unwrap_or_else(|| fe.key.clone()),
        description: fe.description.clone(),
        file_path: fe.epic_md.clone(),
        custom_folder_path: fe.custom_folder_path.clone(),
        source: EntitySource::Folder,
        features: Vec::new(),
    }
}

/// Metadata from the index when set, file paths from the folder side.
fn epic_merged(ie: &IndexEpic, fe: &FolderEpic, strategy: MergeStrategy) -> Epic {
    let folder_title = fe.title.clone().or_else(|| fe.slug.clone());
    let title = match strategy {
        MergeStrategy::FolderPrecedence => folder_title
            .or_else(|| Some(ie.title.clone()).filter(|t| !t.is_empty()))
            .unwrap_or_else(|| fe.key.clone()),
        _ => Some(ie.title.clone())
            .filter(|t| !t.is_empty())
            .or(folder_title)
            .unwrap_or_else(|| fe.key.clone()),
    };
    Epic {
        key: fe.key.clone(),
        title,
        description: fe.description.clone(),
        file_path: fe.epic_md.clone(),
        custom_folder_path: fe.custom_folder_path.clone(),
        source: EntitySource::Merged,
        features: Vec::new(),
    }
}

fn feature_from_index(ife: &IndexFeature) -> Feature {
    Feature {
        key: ife.key.clone(),
        epic_key: ife.epic_key.clone(),
        title: if ife.title.is_empty() { ife.key.clone() } else { ife.title.clone() },
        description: None,
        file_path: None,
        custom_folder_path: None,
        related_docs: Vec::new(),
        source: EntitySource::Index,
    }
}

fn feature_from_folder(ffe: &FolderFeature) -> Feature {
    Feature {
        key: ffe.key.clone(),
        epic_key: ffe.epic_key.clone(),
        title: ffe
            .title
            .clone()
            .or_else(|| ffe.slug.clone())
            .unwrap_or_else(|| ffe.key.clone()),
        description: ffe.description.clone(),
        file_path: ffe.descriptor.clone(),
        custom_folder_path: ffe.custom_folder_path.clone(),
        related_docs: ffe.related_docs.clone(),
        source: EntitySource::Folder,
    }
}

fn feature_merged(
    ife: &IndexFeature,
    ffe: &FolderFeature,
    epic_key: String,
    strategy: MergeStrategy,
) -> Feature {
    let folder_title = ffe.title.clone().or_else(|| ffe.slug.clone());
    let title = match strategy {
        MergeStrategy::FolderPrecedence => folder_title
            .or_else(|| Some(ife.title.clone()).filter(|t| !t.is_empty()))
            .unwrap_or_else(|| ffe.key.clone()),
        _ => Some(ife.title.clone())
            .filter(|t| !t.is_empty())
            .or(folder_title)
            .unwrap_or_else(|| ffe.key.clone()),
    };
    Feature {
        key: ffe.key.clone(),
        epic_key,
        title,
        description: ffe.description.clone(),
        file_path: ffe.descriptor.clone(),
        custom_folder_path: ffe.custom_folder_path.clone(),
        related_docs: ffe.related_docs.clone(),
        source: EntitySource::Merged,
    }
}

/// Reconcile the index and folder catalogs under the chosen strategy.
///
/// When `index_provided` is false the folder catalog passes through
/// unchanged: no conflicts are detected and no missing-index warnings are
/// emitted (the user opted out of the index).
pub fn reconcile(
    index: &IndexCatalog,
    folders: &FolderCatalog,
    strategy: MergeStrategy,
    validation: ValidationLevel,
    index_provided: bool,
) -> Result<Reconciliation, DiscoveryError> {
    let mut out = Reconciliation::default();

    if !index_provided {
        let mut epics: Vec<Epic> = folders.epics.iter().map(epic_from_folder).collect();
        attach_features(
            &mut epics,
            folders.features.iter().map(feature_from_folder).collect(),
            &mut out.warnings,
        );
        out.catalog = Catalog { epics };
        return Ok(out);
    }

    let folder_epics: HashMap<&str, &FolderEpic> =
        folders.epics.iter().map(|e| (e.key.as_str(), e)).collect();
    let index_epics: HashMap<&str, &IndexEpic> =
        index.epics.iter().map(|e| (e.key.as_str(), e)).collect();
    let folder_features: HashMap<&str, &FolderFeature> =
        folders.features.iter().map(|f| (f.key.as_str(), f)).collect();
    let index_features: HashMap<&str, &IndexFeature> =
        index.features.iter().map(|f| (f.key.as_str(), f)).collect();

    let mut epics: Vec<Epic> = Vec::new();
    let mut features: Vec<Feature> = Vec::new();

    // Epics listed in the index, in index order.
    for ie in &index.epics {
        match folder_epics.get(ie.key.as_str()) {
            Some(fe) => epics.push(epic_merged(ie, fe, strategy)),
            None => {
                let conflict_type = ConflictType::EpicIndexOnly;
                let suggestion = suggestion_for(conflict_type, &ie.key);
                match strategy {
                    MergeStrategy::IndexPrecedence => {
                        return Err(DiscoveryError::Reconcile {
                            key: ie.key.clone(),
                            message: format!(
                                "'{}' is listed in the index but has no folder on disk. {}",
                                ie.key, suggestion
                            ),
                        });
                    }
                    MergeStrategy::FolderPrecedence => {
                        out.warnings.push(format!(
                            "Epic '{}' is in the index but has no folder; skipped",
                            ie.key
                        ));
                        out.conflicts.push(Conflict {
                            conflict_type,
                            key: ie.key.clone(),
                            path: Some(PathBuf::from(&ie.path)),
                            resolution: "skipped".to_string(),
                            strategy,
                            suggestion,
                        });
                    }
                    MergeStrategy::Merge => {
                        out.warnings.push(format!(
                            "Epic '{}' is in the index but has no folder; kept without a file path",
                            ie.key
                        ));
                        out.conflicts.push(Conflict {
                            conflict_type,
                            key: ie.key.clone(),
                            path: Some(PathBuf::from(&ie.path)),
                            resolution: "kept from index".to_string(),
                            strategy,
                            suggestion,
                        });
                        epics.push(epic_from_index(ie));
                    }
                }
            }
        }
    }

    // Epics only on disk, in walk order.
    for fe in &folders.epics {
        if index_epics.contains_key(fe.key.as_str()) {
            continue;
        }
        let conflict_type = ConflictType::EpicFolderOnly;
        let suggestion = suggestion_for(conflict_type, &fe.key);
        match strategy {
            MergeStrategy::IndexPrecedence => {
                out.warnings.push(format!(
                    "Epic folder '{}' is not listed in the index; skipped",
                    fe.key
                ));
                out.conflicts.push(Conflict {
                    conflict_type,
                    key: fe.key.clone(),
                    path: Some(fe.path.clone()),
                    resolution: "skipped".to_string(),
                    strategy,
                    suggestion,
                });
            }
            MergeStrategy::FolderPrecedence | MergeStrategy::Merge => {
                out.conflicts.push(Conflict {
                    conflict_type,
                    key: fe.key.clone(),
                    path: Some(fe.path.clone()),
                    resolution: "kept from folder".to_string(),
                    strategy,
                    suggestion,
                });
                epics.push(epic_from_folder(fe));
            }
        }
    }

    // Features listed in the index, in index order.
    for ife in &index.features {
        match folder_features.get(ife.key.as_str()) {
            Some(ffe) => {
                if ffe.parent_epic_key != ife.epic_key {
                    let conflict_type = ConflictType::RelationshipMismatch;
                    let suggestion = suggestion_for(conflict_type, &ife.key);
                    if validation == ValidationLevel::Strict {
                        return Err(DiscoveryError::Reconcile {
                            key: ife.key.clone(),
                            message: format!(
                                "'{}' is listed under '{}' in the index but found under '{}' on disk. {}",
                                ife.key, ife.epic_key, ffe.parent_epic_key, suggestion
                            ),
                        });
                    }
                    let (epic_key, resolution) = match strategy {
                        MergeStrategy::FolderPrecedence => {
                            (ffe.epic_key.clone(), "epic taken from folder".to_string())
                        }
                        _ => (ife.epic_key.clone(), "epic taken from index".to_string()),
                    };
                    out.warnings.push(format!(
                        "Feature '{}' is listed under '{}' in the index but found under '{}' on disk; using '{}'",
                        ife.key, ife.epic_key, ffe.parent_epic_key, epic_key
                    ));
                    out.conflicts.push(Conflict {
                        conflict_type,
                        key: ife.key.clone(),
                        path: Some(ffe.path.clone()),
                        resolution,
                        strategy,
                        suggestion,
                    });
                    features.push(feature_merged(ife, ffe, epic_key, strategy));
                } else {
                    features.push(feature_merged(ife, ffe, ife.epic_key.clone(), strategy));
                }
            }
            None => {
                let conflict_type = ConflictType::FeatureIndexOnly;
                let suggestion = suggestion_for(conflict_type, &ife.key);
                match strategy {
                    MergeStrategy::IndexPrecedence => {
                        return Err(DiscoveryError::Reconcile {
                            key: ife.key.clone(),
                            message: format!(
                                "'{}' is listed in the index but has no folder on disk. {}",
                                ife.key, suggestion
                            ),
                        });
                    }
                    MergeStrategy::FolderPrecedence => {
                        out.warnings.push(format!(
                            "Feature '{}' is in the index but has no folder; skipped",
                            ife.key
                        ));
                        out.conflicts.push(Conflict {
                            conflict_type,
                            key: ife.key.clone(),
                            path: Some(PathBuf::from(&ife.path)),
                            resolution: "skipped".to_string(),
                            strategy,
                            suggestion,
                        });
                    }
                    MergeStrategy::Merge => {
                        out.warnings.push(format!(
                            "Feature '{}' is in the index but has no folder; kept without a file path",
                            ife.key
                        ));
                        out.conflicts.push(Conflict {
                            conflict_type,
                            key: ife.key.clone(),
                            path: Some(PathBuf::from(&ife.path)),
                            resolution: "kept from index".to_string(),
                            strategy,
                            suggestion,
                        });
                        features.push(feature_from_index(ife));
                    }
                }
            }
        }
    }

    // Features only on disk, in walk order.
    for ffe in &folders.features {
        if index_features.contains_key(ffe.key.as_str()) {
            continue;
        }
        let conflict_type = ConflictType::FeatureFolderOnly;
        let suggestion = suggestion_for(conflict_type, &ffe.key);
        match strategy {
            MergeStrategy::IndexPrecedence => {
                out.warnings.push(format!(
                    "Feature folder '{}' is not listed in the index; skipped",
                    ffe.key
                ));
                out.conflicts.push(Conflict {
                    conflict_type,
                    key: ffe.key.clone(),
                    path: Some(ffe.path.clone()),
                    resolution: "skipped".to_string(),
                    strategy,
                    suggestion,
                });
            }
            MergeStrategy::FolderPrecedence | MergeStrategy::Merge => {
                out.conflicts.push(Conflict {
                    conflict_type,
                    key: ffe.key.clone(),
                    path: Some(ffe.path.clone()),
                    resolution: "kept from folder".to_string(),
                    strategy,
                    suggestion,
                });
                features.push(feature_from_folder(ffe));
            }
        }
    }

    attach_features(&mut epics, features, &mut out.warnings);
    out.catalog = Catalog { epics };
    Ok(out)
}

/// Nest each feature under its epic. A feature whose epic did not survive
/// reconciliation is dropped with a warning.
fn attach_features(epics: &mut [Epic], features: Vec<Feature>, warnings: &mut Vec<String>) {
    let known: HashSet<String> = epics.iter().map(|e| e.key.clone()).collect();
    let mut by_epic: HashMap<String, Vec<Feature>> = HashMap::new();
    for feature in features {
        if known.contains(&feature.epic_key) {
            by_epic.entry(feature.epic_key.clone()).or_default().push(feature);
        } else {
            warnings.push(format!(
                "Feature '{}' references epic '{}', which is not in the merged catalog; dropped",
                feature.key, feature.epic_key
            ));
        }
    }
    for epic in epics.iter_mut() {
        if let Some(mut list) = by_epic.remove(&epic.key) {
            epic.features.append(&mut list);
        }
    }
}
