use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::spi::types::DiscoveryError;

/// An epic reference extracted from the index markdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEpic {
    pub key: String,
    pub title: String,
    /// The normalised link target.
    pub path: String,
}

/// A feature reference extracted from the index markdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexFeature {
    pub key: String,
    pub epic_key: String,
    pub title: String,
    pub path: String,
}

/// Everything the index contributed, in document order.
#[derive(Debug, Clone, Default)]
pub struct IndexCatalog {
    pub epics: Vec<IndexEpic>,
    pub features: Vec<IndexFeature>,
    pub warnings: Vec<String>,
}

static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\[\]\n]*)\]\(([^)\s]+)\)").unwrap());

/// Matches one path segment naming an epic folder: `E<nn>-<slug>` or a
/// special slug.
static EPIC_SEGMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?P<num>E\d{2})-[a-z0-9-]+|(?P<special>tech-debt|bugs|change-cards))$")
        .unwrap()
});

/// Matches one path segment naming a feature folder rooted at an epic.
static FEATURE_SEGMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<epic>E\d{2}|tech-debt|bugs|change-cards)-(?P<fid>F\d{2})-[a-z0-9-]+$")
        .unwrap()
});

/// Extract the epic key from a single-segment link target, if it names one.
fn epic_key_of(segment: &str) -> Option<String> {
    let caps = EPIC_SEGMENT_RE.captures(segment)?;
    if let Some(num) = caps.name("num") {
        Some(num.as_str().to_string())
    } else {
        caps.name("special").map(|m| m.as_str().to_string())
    }
}

/// Strip `./` and `/` prefixes and a trailing `/` from a link target.
fn normalise(target: &str) -> &str {
    let t = target.strip_prefix("./").unwrap_or(target);
    let t = t.strip_prefix('/').unwrap_or(t);
    t.strip_suffix('/').unwrap_or(t)
}

/// Parse epic and feature references out of index markdown.
///
/// Only `[text](target)` links participate. External URLs, file links, and
/// targets with the wrong depth are ignored; a feature link whose two
/// segments disagree about the epic is skipped with a warning. Malformed
/// link syntax never aborts the parse.
pub fn parse_index(content: &str) -> IndexCatalog {
    let mut catalog = IndexCatalog::default();

    for caps in LINK_RE.captures_iter(content) {
        let title = caps[1].trim().to_string();
        let target = &caps[2];

        // External or file links are not entity references.
        if target.contains("://") || target.ends_with(".md") || target.ends_with(".txt") {
            continue;
        }

        let normalised = normalise(target);
        let segments: Vec<&str> = normalised.split('/').filter(|s| !s.is_empty()).collect();

        match segments.as_slice() {
            [epic_segment] => {
                if let Some(key) = epic_key_of(epic_segment) {
                    if catalog.epics.iter().all(|e| e.key != key) {
                        catalog.epics.push(IndexEpic {
                            key,
                            title,
                            path: normalised.to_string(),
                        });
                    }
                }
            }
            [epic_segment, feature_segment] => {
                let parent_key = match epic_key_of(epic_segment) {
                    Some(k) => k,
                    None => continue,
                };
                let caps = match FEATURE_SEGMENT_RE.captures(feature_segment) {
                    Some(c) => c,
                    None => continue,
                };
                let declared = caps.name("epic").map(|m| m.as_str()).unwrap_or_default();
                if declared != parent_key {
                    catalog.warnings.push(format!(
                        "Index link '{}' skipped: feature folder declares epic '{}' but is listed under '{}'",
                        normalised, declared, parent_key
                    ));
                    continue;
                }
                let fid = caps.name("fid").map(|m| m.as_str()).unwrap_or_default();
                let key = format!("{}-{}", parent_key, fid);
                if catalog.features.iter().all(|f| f.key != key) {
                    catalog.features.push(IndexFeature {
                        key,
                        epic_key: parent_key,
                        title,
                        path: normalised.to_string(),
                    });
                }
            }
            // Too shallow or too deep.
            _ => {}
        }
    }

    catalog
}

/// Read and parse an index file. An unreadable file is an `io` error; the
/// caller decides whether an absent index is acceptable.
pub fn parse_index_file(path: &Path) -> Result<IndexCatalog, DiscoveryError> {
    let content = fs::read_to_string(path).map_err(|e| DiscoveryError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(parse_index(&content))
}
