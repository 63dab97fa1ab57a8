//! Ignore globs for file collection
//!
//! Patterns are matched against paths relative to the sync root, always with
//! `/` separators:
//!
//! - a pattern without `/` is tested against every path component, so
//!   `*.log` or `node_modules` match at any depth
//! - a pattern containing `/` is tested against the whole relative path
//!
//! `*` and `?` never cross a `/`; `**` does.

use crate::{Result, SyncError};
use regex::Regex;
use std::path::{Component, Path};

#[derive(Debug)]
struct Pattern {
    source: String,
    regex: Regex,
    anchored: bool,
}

#[derive(Debug, Default)]
pub struct IgnoreMatcher {
    patterns: Vec<Pattern>,
}

fn glob_to_regex(pattern: &str) -> String {
    let mut regex = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                regex.push_str(".*");
            }
            '*' => regex.push_str("[^/]*"),
            '?' => regex.push_str("[^/]"),
            other => regex.push_str(&regex::escape(&other.to_string())),
        }
    }
    regex.push('$');
    regex
}

impl IgnoreMatcher {
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|pattern| {
                let source = pattern.as_ref().trim().trim_end_matches('/').to_string();
                let source = source.trim_start_matches('/').to_string();
                let regex = Regex::new(&glob_to_regex(&source)).map_err(|e| {
                    SyncError::Validation(format!("Invalid ignore pattern {:?}: {}", source, e))
                })?;
                Ok(Pattern {
                    anchored: source.contains('/'),
                    source,
                    regex,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether `relative` (a path under the sync root) should be skipped
    pub fn is_ignored(&self, relative: &Path) -> bool {
        self.matching_pattern(relative).is_some()
    }

    /// The first pattern matching `relative`
    pub fn matching_pattern(&self, relative: &Path) -> Option<&str> {
        if self.patterns.is_empty() {
            return None;
        }

        let components: Vec<String> = relative
            .components()
            .filter_map(|component| match component {
                Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        let joined = components.join("/");

        self.patterns
            .iter()
            .find(|pattern| pattern.matches(&components, &joined))
            .map(|pattern| pattern.source.as_str())
    }
}

impl Pattern {
    fn matches(&self, components: &[String], joined: &str) -> bool {
        if self.anchored {
            self.regex.is_match(joined)
        } else {
            components.iter().any(|name| self.regex.is_match(name))
        }
    }
}
