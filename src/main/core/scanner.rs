use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::frontmatter;
use super::patterns::PatternMatcher;
use crate::spi::types::{CancelToken, DiscoveryError};

/// An epic found on disk.
#[derive(Debug, Clone)]
pub struct FolderEpic {
    pub key: String,
    pub slug: Option<String>,
    /// Title from `epic.md` frontmatter, when present.
    pub title: Option<String>,
    pub description: Option<String>,
    pub path: PathBuf,
    pub epic_md: Option<PathBuf>,
    pub custom_folder_path: Option<String>,
}

/// A feature found on disk.
#[derive(Debug, Clone)]
pub struct FolderFeature {
    pub key: String,
    /// Epic from the folder name's own captures, falling back to the parent.
    pub epic_key: String,
    /// Epic of the folder this feature physically sits under.
    pub parent_epic_key: String,
    /// Title from the descriptor's frontmatter, when present.
    pub title: Option<String>,
    pub description: Option<String>,
    pub slug: Option<String>,
    pub path: PathBuf,
    /// The descriptor file: `prd.md`, or a `PRD_F<nn>-…` fallback.
    pub descriptor: Option<PathBuf>,
    pub related_docs: Vec<PathBuf>,
    pub custom_folder_path: Option<String>,
    /// Markdown task artifacts under `tasks/` and `prps/`.
    pub task_files: Vec<PathBuf>,
}

/// Everything the folder walk contributed, in walk order.
#[derive(Debug, Clone, Default)]
pub struct FolderCatalog {
    pub epics: Vec<FolderEpic>,
    pub features: Vec<FolderFeature>,
    pub folders_scanned: usize,
    pub files_analyzed: usize,
    pub warnings: Vec<String>,
}

/// Immediate children of `dir`, sorted by file name for reproducible output.
fn sorted_children(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut children: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    children.sort();
    Ok(children)
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or_default()
}

/// Walk the documentation root and classify every directory.
///
/// Hidden directories are excluded outright. Epic folders are recognised at
/// any depth; feature folders only directly under a recorded epic. The walk
/// is depth-first in sorted order, so the catalog is deterministic for a
/// given tree. A non-existent root is a fatal error.
pub fn scan(
    root: &Path,
    matcher: &PatternMatcher,
    cancel: &CancelToken,
) -> Result<FolderCatalog, DiscoveryError> {
    if !root.is_dir() {
        return Err(DiscoveryError::Io {
            path: root.to_path_buf(),
            source: io::Error::new(
                io::ErrorKind::NotFound,
                "documentation root does not exist or is not a directory",
            ),
        });
    }

    let mut catalog = FolderCatalog::default();
    // Directory path -> epic key, for parent lookups.
    let mut epic_parents: HashMap<PathBuf, String> = HashMap::new();

    for entry in WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !file_name(e.path()).starts_with('.'))
    {
        if cancel.is_cancelled() {
            return Err(DiscoveryError::Cancelled);
        }

        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                catalog.warnings.push(format!("Skipped unreadable entry: {}", e));
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }

        catalog.folders_scanned += 1;
        let dir = entry.path();
        let name = file_name(dir);
        let parent = dir.parent().map(Path::to_path_buf).unwrap_or_default();

        if let Some(epic) = matcher.match_epic(name) {
            let mut folder_epic = FolderEpic {
                key: epic.epic_id.clone(),
                slug: epic.epic_slug,
                title: None,
                description: None,
                path: dir.to_path_buf(),
                epic_md: None,
                custom_folder_path: None,
            };
            let epic_md = dir.join("epic.md");
            if epic_md.is_file() {
                catalog.files_analyzed += 1;
                match frontmatter::read(&epic_md) {
                    Ok((record, _)) => {
                        folder_epic.title = record.get("title").map(str::to_string);
                        folder_epic.description = record.get("description").map(str::to_string);
                        folder_epic.custom_folder_path =
                            record.get("custom_folder_path").map(str::to_string);
                    }
                    Err(e) => catalog.warnings.push(format!("Cannot read epic descriptor: {}", e)),
                }
                folder_epic.epic_md = Some(epic_md);
            }
            epic_parents.insert(dir.to_path_buf(), epic.epic_id);
            catalog.epics.push(folder_epic);
            continue;
        }

        let parent_epic = epic_parents.get(&parent).cloned();
        if let Some(parent_key) = parent_epic {
            if let Some(feature) = matcher.match_feature(name, Some(&parent_key)) {
                let folder_feature = scan_feature_folder(
                    dir,
                    feature.key(),
                    feature.epic_id,
                    parent_key,
                    feature.feature_slug,
                    matcher,
                    &mut catalog,
                );
                catalog.features.push(folder_feature);
                continue;
            }
            catalog
                .warnings
                .push(format!("Unclassified folder under epic '{}': {}", parent_key, dir.display()));
            continue;
        }

        // Directories under the root that name neither an epic nor a feature
        // are reported once; deeper structure (tasks/, prps/, attachments)
        // is left alone.
        if parent.as_path() == root {
            catalog
                .warnings
                .push(format!("Unclassified folder: {}", dir.display()));
        }
    }

    Ok(catalog)
}

/// Catalog one feature folder: descriptor, related docs, task artifacts.
fn scan_feature_folder(
    dir: &Path,
    key: String,
    epic_key: String,
    parent_epic_key: String,
    slug: Option<String>,
    matcher: &PatternMatcher,
    catalog: &mut FolderCatalog,
) -> FolderFeature {
    let mut feature = FolderFeature {
        key,
        epic_key,
        parent_epic_key,
        title: None,
        description: None,
        slug,
        path: dir.to_path_buf(),
        descriptor: None,
        related_docs: Vec::new(),
        custom_folder_path: None,
        task_files: Vec::new(),
    };

    let children = match sorted_children(dir) {
        Ok(c) => c,
        Err(e) => {
            catalog
                .warnings
                .push(format!("Cannot list feature folder '{}': {}", dir.display(), e));
            return feature;
        }
    };

    let files: Vec<PathBuf> = children.into_iter().filter(|p| p.is_file()).collect();
    catalog.files_analyzed += files.len();

    // `prd.md` takes precedence over the `PRD_F<nn>-…` form.
    feature.descriptor = files
        .iter()
        .find(|p| file_name(p) == "prd.md")
        .or_else(|| {
            files.iter().find(|p| {
                let name = file_name(p);
                name.starts_with("PRD_") && matcher.match_feature_file(name)
            })
        })
        .cloned();

    if let Some(descriptor) = feature.descriptor.clone() {
        match frontmatter::read(&descriptor) {
            Ok((record, _)) => {
                feature.title = record.get("title").map(str::to_string);
                feature.description = record.get("description").map(str::to_string);
                feature.custom_folder_path = record.get("custom_folder_path").map(str::to_string);
            }
            Err(e) => catalog
                .warnings
                .push(format!("Cannot read feature descriptor: {}", e)),
        }
    }

    // Related documents: every top-level markdown file except the descriptor.
    // Subdirectories are not descended for related docs.
    for path in &files {
        if file_name(path).ends_with(".md") && feature.descriptor.as_deref() != Some(path.as_path()) {
            feature.related_docs.push(path.clone());
        }
    }

    // Task artifacts live directly inside `tasks/` or `prps/`.
    for sub in ["tasks", "prps"] {
        let task_dir = dir.join(sub);
        if !task_dir.is_dir() {
            continue;
        }
        if let Ok(task_children) = sorted_children(&task_dir) {
            for path in task_children {
                if path.is_file() && file_name(&path).ends_with(".md") {
                    catalog.files_analyzed += 1;
                    feature.task_files.push(path);
                }
            }
        }
    }

    feature
}
