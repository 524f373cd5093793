use std::fs;
use std::path::Path;

use tempfile::TempDir;

pub fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// A docs tree where the index and the folders agree exactly:
/// one epic `E04` with two features, each carrying a `prd.md`.
pub fn create_basic_tree() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write(
        &root.join("epic-index.md"),
        "# Plan\n\n\
         - [Core services](E04-core/)\n\
           - [Parsing](E04-core/E04-F01-parsing/)\n\
           - [Storage](E04-core/E04-F02-storage/)\n",
    );
    write(
        &root.join("E04-core/epic.md"),
        "---\ntitle: Core services\n---\n# Core services\n",
    );
    write(
        &root.join("E04-core/E04-F01-parsing/prd.md"),
        "---\ntitle: Parsing\n---\n# Parsing\n",
    );
    write(
        &root.join("E04-core/E04-F02-storage/prd.md"),
        "---\ntitle: Storage\n---\n# Storage\n",
    );
    tmp
}

/// The basic tree plus one unkeyed task artifact under F02.
pub fn create_tree_with_task() -> TempDir {
    let tmp = create_basic_tree();
    write(
        &tmp.path().join("E04-core/E04-F02-storage/tasks/compaction.md"),
        "---\ntitle: Compaction\n---\n# Compaction\n\nSteps here.\n",
    );
    tmp
}
