//! Cache key derivation and invalidation patterns.
//!
//! A key is `subject:action:resource` with every component escaped, so the
//! `:` separator and the `*` wildcard can only appear where this module put
//! them. That keeps `alice:*` from matching a subject named `alice:x`.

use std::fmt;

use crate::authz::types::{ActionKind, ResourceRef};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(subject: &str, action: ActionKind, resource: &ResourceRef) -> Self {
        Self(format!(
            "{}:{}:{}",
            escape(subject),
            action.as_str(),
            escape(&resource.to_string())
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Pattern matching every decision cached for `subject`.
    pub fn subject_pattern(subject: &str) -> String {
        format!("{}:*", escape(subject))
    }

    /// Pattern matching every decision cached for `resource`.
    pub fn resource_pattern(resource: &ResourceRef) -> String {
        format!("*:{}", escape(&resource.to_string()))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Percent-escape the characters that carry meaning in keys and patterns.
pub fn escape(component: &str) -> String {
    let mut out = String::with_capacity(component.len());
    for c in component.chars() {
        match c {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            '*' => out.push_str("%2A"),
            '?' => out.push_str("%3F"),
            '|' => out.push_str("%7C"),
            _ => out.push(c),
        }
    }
    out
}

/// A glob with at most a leading and a trailing `*`.
///
/// Any other `*` is matched literally; since key components are escaped
/// such a pattern only matches keys built outside [`CacheKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPattern<'a> {
    All,
    Exact(&'a str),
    Prefix(&'a str),
    Suffix(&'a str),
    Contains(&'a str),
}

impl<'a> KeyPattern<'a> {
    pub fn parse(pattern: &'a str) -> Self {
        if pattern.chars().all(|c| c == '*') && !pattern.is_empty() {
            return KeyPattern::All;
        }
        match (pattern.strip_prefix('*'), pattern.strip_suffix('*')) {
            (Some(_), Some(_)) => KeyPattern::Contains(&pattern[1..pattern.len() - 1]),
            (Some(rest), None) => KeyPattern::Suffix(rest),
            (None, Some(rest)) => KeyPattern::Prefix(rest),
            (None, None) => KeyPattern::Exact(pattern),
        }
    }

    pub fn matches(&self, key: &str) -> bool {
        match self {
            KeyPattern::All => true,
            KeyPattern::Exact(p) => key == *p,
            KeyPattern::Prefix(p) => key.starts_with(p),
            KeyPattern::Suffix(p) => key.ends_with(p),
            KeyPattern::Contains(p) => key.contains(p),
        }
    }
}
