use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::spi::types::DiscoveryError;

/// An ordered mapping of frontmatter keys to scalar values.
///
/// Insertion order is preserved; keys the engine never touches stay exactly
/// where (and how) the author wrote them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrontMatter {
    entries: Vec<(String, String)>,
}

impl FrontMatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set a key, replacing an existing value or appending a new entry.
    pub fn set(&mut self, key: &str, value: &str) {
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| k == key) {
            entry.1 = value.to_string();
        } else {
            self.entries.push((key.to_string(), value.to_string()));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Byte offsets of a recognised frontmatter block.
///
/// `yaml` spans the lines between the two `---` delimiters; `body_start` is
/// the offset of the first byte after the closing delimiter line.
struct Block {
    yaml_start: usize,
    yaml_end: usize,
    body_start: usize,
}

fn is_delimiter(line: &str) -> bool {
    line.trim_end_matches('\r') == "---"
}

/// Locate the leading frontmatter block, if the file has one.
fn find_block(content: &str) -> Option<Block> {
    let mut lines = content.split_inclusive('\n');
    let first = lines.next()?;
    if !is_delimiter(first.trim_end_matches('\n')) {
        return None;
    }
    let mut offset = first.len();
    let yaml_start = offset;
    for line in lines {
        let stripped = line.trim_end_matches('\n');
        if is_delimiter(stripped) {
            return Some(Block {
                yaml_start,
                yaml_end: offset,
                body_start: offset + line.len(),
            });
        }
        offset += line.len();
    }
    // Opening delimiter with no close: treat as no frontmatter.
    None
}

/// Convert a parsed YAML mapping into an ordered scalar record.
///
/// Nested values are skipped: they are not scalars, and the line-oriented
/// writer preserves them untouched anyway.
fn record_from_yaml(yaml: &str) -> Option<FrontMatter> {
    let value: serde_yml::Value = serde_yml::from_str(yaml).ok()?;
    let mapping = value.as_mapping()?;
    let mut record = FrontMatter::new();
    for (key, val) in mapping {
        let key = match key.as_str() {
            Some(k) => k,
            None => continue,
        };
        let scalar = match val {
            serde_yml::Value::String(s) => s.clone(),
            serde_yml::Value::Number(n) => n.to_string(),
            serde_yml::Value::Bool(b) => b.to_string(),
            _ => continue,
        };
        record.set(key, &scalar);
    }
    Some(record)
}

/// Parse a markdown document into `(record, body)`.
///
/// Absent frontmatter yields an empty record and the whole document as body.
/// Malformed YAML inside the delimiters degrades to an empty record; the
/// body is still usable.
pub fn parse(content: &str) -> (FrontMatter, String) {
    match find_block(content) {
        Some(block) => {
            let yaml = &content[block.yaml_start..block.yaml_end];
            let record = record_from_yaml(yaml).unwrap_or_default();
            (record, content[block.body_start..].to_string())
        }
        None => (FrontMatter::new(), content.to_string()),
    }
}

/// Read a markdown file's frontmatter record and body.
pub fn read(path: &Path) -> Result<(FrontMatter, String), DiscoveryError> {
    let content = fs::read_to_string(path).map_err(|e| DiscoveryError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(parse(&content))
}

/// Quote a scalar for YAML output when the plain form would be ambiguous.
fn yaml_scalar(value: &str) -> String {
    let needs_quoting = value.is_empty()
        || value.contains(':')
        || value.contains('#')
        || value.starts_with(|c: char| c.is_whitespace() || c == '"' || c == '\'')
        || value.ends_with(char::is_whitespace);
    if needs_quoting {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

/// Apply `updates` to a document's frontmatter, preserving everything else.
///
/// Updated keys are rewritten in place; new keys are appended before the
/// closing delimiter; untouched lines and the body are carried over
/// byte-for-byte. A document without frontmatter gains a new block at the top.
fn apply_updates(content: &str, updates: &FrontMatter) -> String {
    match find_block(content) {
        Some(block) => {
            let yaml = &content[block.yaml_start..block.yaml_end];
            let mut lines: Vec<String> =
                yaml.split_inclusive('\n').map(str::to_string).collect();
            for (key, value) in updates.iter() {
                let prefix = format!("{}:", key);
                let replacement = format!("{}: {}\n", key, yaml_scalar(value));
                match lines
                    .iter_mut()
                    .find(|line| line.starts_with(&prefix))
                {
                    Some(line) => *line = replacement,
                    None => lines.push(replacement),
                }
            }
            let mut out = String::with_capacity(content.len() + 64);
            out.push_str("---\n");
            for line in &lines {
                out.push_str(line);
                if !line.ends_with('\n') {
                    out.push('\n');
                }
            }
            out.push_str("---\n");
            out.push_str(&content[block.body_start..]);
            out
        }
        None => {
            let mut out = String::with_capacity(content.len() + 64);
            out.push_str("---\n");
            for (key, value) in updates.iter() {
                out.push_str(&format!("{}: {}\n", key, yaml_scalar(value)));
            }
            out.push_str("---\n");
            out.push_str(content);
            out
        }
    }
}

/// Write `updates` into the file's frontmatter atomically.
///
/// The new content goes to a temp file in the target's directory, inherits
/// the target's permission bits, is flushed to disk, and then renamed over
/// the target. On any failure the temp file is removed and the target is
/// untouched; concurrent readers see either the old file or the new one in
/// its entirety.
pub fn write(path: &Path, updates: &FrontMatter) -> Result<(), DiscoveryError> {
    let io_err = |e: std::io::Error| DiscoveryError::Io {
        path: path.to_path_buf(),
        source: e,
    };

    let content = fs::read_to_string(path).map_err(io_err)?;
    let permissions = fs::metadata(path).map_err(io_err)?.permissions();
    let updated = apply_updates(&content, updates);

    let dir = path.parent().ok_or_else(|| DiscoveryError::Io {
        path: path.to_path_buf(),
        source: std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "target has no parent directory",
        ),
    })?;

    // NamedTempFile removes itself on drop, so every early return below
    // leaves the target untouched and no temp file behind.
    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(updated.as_bytes()).map_err(io_err)?;
    fs::set_permissions(tmp.path(), permissions).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| DiscoveryError::Io {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}
