//! Host pattern matching.
//!
//! # Responsibilities
//! - Compile glob patterns (`*.internal`, `10.*`, `host?.corp`)
//! - Match host names case-insensitively
//! - Combine patterns with OR semantics
//!
//! # Design Decisions
//! - `*` matches any run of characters (including dots), `?` exactly one
//! - Everything else is literal; patterns are anchored at both ends
//! - A list matches on the first matching pattern

use regex::{Regex, RegexBuilder};

/// Trait for matching a target host against a condition.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the host matches this condition.
    fn matches(&self, host: &str) -> bool;
}

/// A single compiled glob.
#[derive(Debug, Clone)]
pub struct GlobMatcher {
    pattern: String,
    regex: Regex,
}

impl GlobMatcher {
    /// Compile a glob. Returns `None` for blank patterns.
    pub fn new(pattern: &str) -> Option<Self> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return None;
        }

        let mut source = String::with_capacity(pattern.len() + 8);
        source.push('^');
        for ch in pattern.chars() {
            match ch {
                '*' => source.push_str(".*"),
                '?' => source.push('.'),
                other => source.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
            }
        }
        source.push('$');

        // Escaped literals plus `.*`/`.` always form a valid expression.
        let regex = RegexBuilder::new(&source)
            .case_insensitive(true)
            .build()
            .ok()?;

        Some(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl Matcher for GlobMatcher {
    fn matches(&self, host: &str) -> bool {
        self.regex.is_match(host)
    }
}

/// Combines multiple matchers with OR semantics.
#[derive(Debug, Default)]
pub struct AnyMatcher {
    matchers: Vec<GlobMatcher>,
}

impl AnyMatcher {
    pub fn new(matchers: Vec<GlobMatcher>) -> Self {
        Self { matchers }
    }

    /// Compile a list of globs, skipping blanks.
    pub fn from_patterns<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(
            patterns
                .into_iter()
                .filter_map(|p| GlobMatcher::new(p.as_ref()))
                .collect(),
        )
    }

    /// Compile a pipe-delimited list such as `*.internal|10.*`.
    pub fn from_pipe_list(list: &str) -> Self {
        Self::from_patterns(list.split('|'))
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    /// First pattern matching `host`, if any.
    pub fn first_match(&self, host: &str) -> Option<&GlobMatcher> {
        self.matchers.iter().find(|m| m.matches(host))
    }
}

impl Matcher for AnyMatcher {
    fn matches(&self, host: &str) -> bool {
        self.first_match(host).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_matcher() {
        let matcher = GlobMatcher::new("*.internal").unwrap();
        assert!(matcher.matches("api.internal"));
        assert!(matcher.matches("API.Internal")); // Case insensitive
        assert!(matcher.matches("a.b.internal"));
        assert!(!matcher.matches("internal"));
        assert!(!matcher.matches("api.internal.example.com"));
    }

    #[test]
    fn dots_are_literal() {
        let matcher = GlobMatcher::new("10.*").unwrap();
        assert!(matcher.matches("10.1.2.3"));
        assert!(!matcher.matches("100.1.2.3"));
        assert!(!matcher.matches("10x1"));
    }

    #[test]
    fn question_mark_matches_one_char() {
        let matcher = GlobMatcher::new("db?.corp").unwrap();
        assert!(matcher.matches("db1.corp"));
        assert!(!matcher.matches("db10.corp"));
    }

    #[test]
    fn regex_metacharacters_are_escaped() {
        let matcher = GlobMatcher::new("a+b(c).corp").unwrap();
        assert!(matcher.matches("a+b(c).corp"));
        assert!(!matcher.matches("aab(c).corp"));
    }

    #[test]
    fn any_matcher_short_circuits_on_any_pattern() {
        let matcher = AnyMatcher::from_pipe_list("*.internal| 10.* ||");
        assert_eq!(matcher.len(), 2);
        assert!(matcher.matches("10.0.0.1"));
        // first pattern matches; the last one does not
        assert_eq!(
            matcher.first_match("api.internal").map(GlobMatcher::pattern),
            Some("*.internal")
        );
        assert!(!matcher.matches("api.example.com"));
    }

    #[test]
    fn blank_patterns_compile_to_nothing() {
        assert!(GlobMatcher::new("   ").is_none());
        assert!(AnyMatcher::from_pipe_list("").is_empty());
    }
}
