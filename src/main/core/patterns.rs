use regex::Regex;
use serde::Deserialize;

use crate::api::types::PatternSet;
use crate::spi::types::DiscoveryError;

pub const DEFAULT_PATTERNS: &str = include_str!("../../../patterns.toml");

/// Intermediate struct for flat TOML deserialization of one pattern entry.
#[derive(Debug, Deserialize)]
struct RawPattern {
    pattern: String,
}

#[derive(Debug, Deserialize)]
struct RawPatternFile {
    #[serde(default)]
    epic_folder: Vec<RawPattern>,
    #[serde(default)]
    feature_folder: Vec<RawPattern>,
    #[serde(default)]
    feature_file: Vec<RawPattern>,
}

/// Parse a pattern-registry TOML document into an uncompiled [`PatternSet`].
pub fn parse_patterns(toml_str: &str) -> Result<PatternSet, DiscoveryError> {
    let raw: RawPatternFile = toml::from_str(toml_str)
        .map_err(|e| DiscoveryError::Config(format!("Invalid pattern file: {}", e)))?;
    Ok(PatternSet {
        epic_folder: raw.epic_folder.into_iter().map(|p| p.pattern).collect(),
        feature_folder: raw.feature_folder.into_iter().map(|p| p.pattern).collect(),
        feature_file: raw.feature_file.into_iter().map(|p| p.pattern).collect(),
    })
}

/// The embedded default registry.
pub fn default_patterns() -> Result<PatternSet, DiscoveryError> {
    parse_patterns(DEFAULT_PATTERNS)
}

/// Result of recognising an epic folder name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpicMatch {
    pub epic_id: String,
    pub epic_slug: Option<String>,
}

/// Result of recognising a feature folder name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureMatch {
    pub epic_id: String,
    pub feature_id: String,
    pub feature_slug: Option<String>,
}

impl FeatureMatch {
    /// The feature's catalog key, `<epic>-F<nn>`.
    pub fn key(&self) -> String {
        format!("{}-{}", self.epic_id, self.feature_id)
    }
}

/// Compiled form of a [`PatternSet`].
///
/// Patterns are compiled once at construction and tried in order; the first
/// full match wins. Immutable afterwards, so safe to share across threads.
#[derive(Debug)]
pub struct PatternMatcher {
    epic_folder: Vec<Regex>,
    feature_folder: Vec<Regex>,
    feature_file: Vec<Regex>,
}

fn compile_list(kind: &str, patterns: &[String]) -> Result<Vec<Regex>, DiscoveryError> {
    let mut compiled = Vec::with_capacity(patterns.len());
    for pattern in patterns {
        let re = Regex::new(pattern).map_err(|e| {
            DiscoveryError::Config(format!("Invalid {} pattern '{}': {}", kind, pattern, e))
        })?;
        compiled.push(re);
    }
    Ok(compiled)
}

/// A capture spanning the entire input, or `None`.
fn full_captures<'t>(re: &Regex, name: &'t str) -> Option<regex::Captures<'t>> {
    let caps = re.captures(name)?;
    let whole = caps.get(0)?;
    if whole.start() == 0 && whole.end() == name.len() {
        Some(caps)
    } else {
        None
    }
}

fn group(caps: &regex::Captures<'_>, name: &str) -> Option<String> {
    caps.name(name).map(|m| m.as_str().to_string())
}

impl PatternMatcher {
    /// Compile a pattern set. An uncompilable pattern is a configuration
    /// error naming the pattern; nothing is silently skipped.
    pub fn compile(set: &PatternSet) -> Result<Self, DiscoveryError> {
        Ok(Self {
            epic_folder: compile_list("epic folder", &set.epic_folder)?,
            feature_folder: compile_list("feature folder", &set.feature_folder)?,
            feature_file: compile_list("feature file", &set.feature_file)?,
        })
    }

    /// Compile the embedded defaults.
    pub fn default_matcher() -> Result<Self, DiscoveryError> {
        Self::compile(&default_patterns()?)
    }

    /// Recognise an epic folder name. Patterns are tried in order.
    ///
    /// When a pattern captures `epic_num` but not `epic_id`, the id is
    /// synthesised as `E` + `epic_num`.
    pub fn match_epic(&self, name: &str) -> Option<EpicMatch> {
        for re in &self.epic_folder {
            if let Some(caps) = full_captures(re, name) {
                let epic_id = match group(&caps, "epic_id") {
                    Some(id) => id,
                    None => match group(&caps, "epic_num") {
                        Some(num) => format!("E{}", num),
                        None => continue,
                    },
                };
                return Some(EpicMatch {
                    epic_id,
                    epic_slug: group(&caps, "epic_slug"),
                });
            }
        }
        None
    }

    /// Recognise a feature folder name. `epic_id` falls back to the parent
    /// epic's id when the pattern does not capture one.
    pub fn match_feature(&self, name: &str, parent_epic_id: Option<&str>) -> Option<FeatureMatch> {
        for re in &self.feature_folder {
            if let Some(caps) = full_captures(re, name) {
                let epic_id = group(&caps, "epic_id")
                    .or_else(|| group(&caps, "epic_num").map(|num| format!("E{}", num)))
                    .or_else(|| parent_epic_id.map(str::to_string));
                let feature_id = group(&caps, "feature_id")
                    .or_else(|| group(&caps, "feature_num").map(|num| format!("F{}", num)));
                match (epic_id, feature_id) {
                    (Some(epic_id), Some(feature_id)) => {
                        return Some(FeatureMatch {
                            epic_id,
                            feature_id,
                            feature_slug: group(&caps, "feature_slug"),
                        });
                    }
                    _ => continue,
                }
            }
        }
        None
    }

    /// True when any feature-file pattern fully matches the file name.
    pub fn match_feature_file(&self, name: &str) -> bool {
        self.feature_file.iter().any(|re| full_captures(re, name).is_some())
    }
}
