//! WebExtension-style match patterns
//!
//! A restricted `scheme://host/path` syntax is translated into an anchored
//! regular expression source. The translated source is compiled by the caller,
//! so a pattern can be validated on save and rebuilt later in another context.

use std::sync::OnceLock;

use regex::Regex;

/// Special pattern that matches every URL.
pub const ALL_URLS: &str = "<all_urls>";

/// What the compiled regex is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternTarget {
    /// Only the request host (port and path ignored)
    Host,
    /// The full lower-cased URL
    Url,
}

/// Failure to parse a match pattern.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("match pattern is empty")]
    Empty,
    #[error("'{0}' is not a valid match pattern")]
    Malformed(String),
    #[error("scheme '{scheme}' is not supported in {target:?} patterns")]
    UnsupportedScheme { scheme: String, target: PatternTarget },
}

/// Result of translating a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternRegex {
    /// `<all_urls>`: no regex, the caller treats it as an unconditional match
    AllUrls,
    /// Anchored regex source
    Source(String),
}

/// A parsed `scheme://host[:port][/path]` pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchPattern {
    pub scheme: String,
    pub host: String,
    pub port: Option<String>,
    pub path: Option<String>,
}

fn grammar() -> &'static Regex {
    static GRAMMAR: OnceLock<Regex> = OnceLock::new();
    GRAMMAR.get_or_init(|| {
        Regex::new(r"^([a-z*][a-z0-9+.\-*]*)://(\*|(?:\*\.)?[^/*:]+)(:(?:\d+|\*))?(/.*)?$")
            .unwrap_or_else(|e| panic!("match pattern grammar must compile: {e}"))
    })
}

impl MatchPattern {
    /// Parse a pattern. Input is case-folded; matching is case-insensitive.
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Err(PatternError::Empty);
        }

        let lower = pattern.to_ascii_lowercase();
        let caps = grammar()
            .captures(&lower)
            .ok_or_else(|| PatternError::Malformed(pattern.to_string()))?;

        let scheme = caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default();
        let host = caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default();
        if scheme.is_empty() || host.is_empty() {
            return Err(PatternError::Malformed(pattern.to_string()));
        }

        Ok(Self {
            scheme,
            host,
            port: caps.get(3).map(|m| m.as_str()[1..].to_string()),
            path: caps
                .get(4)
                .map(|m| m.as_str().to_string())
                .filter(|p| p != "/"),
        })
    }

    /// Translate to an anchored regex source for the given target.
    pub fn to_regex(&self, target: PatternTarget) -> Result<String, PatternError> {
        let scheme_ok = match self.scheme.as_str() {
            "*" | "http" | "https" | "ws" | "wss" | "ftp" => true,
            "file" | "app" => target == PatternTarget::Host,
            _ => false,
        };
        if !scheme_ok {
            return Err(PatternError::UnsupportedScheme {
                scheme: self.scheme.clone(),
                target,
            });
        }

        let mut regex = String::from("^");

        if target == PatternTarget::Url {
            if self.scheme == "*" {
                regex.push_str("(?:https?|ftp|wss?)");
            } else {
                regex.push_str(&regex::escape(&self.scheme));
            }
            regex.push_str("://");
        }

        push_host(&mut regex, &self.host);

        if target == PatternTarget::Url {
            match self.port.as_deref() {
                Some("*") | None => regex.push_str(r"(?::\d+)?"),
                Some(port) => {
                    regex.push(':');
                    regex.push_str(port);
                }
            }

            match self.path.as_deref() {
                None => regex.push_str("/?"),
                Some("/*") => regex.push_str("(?:/.*)?"),
                Some(path) => push_wildcard_literal(&mut regex, path),
            }
        }

        regex.push('$');
        Ok(regex)
    }
}

fn push_host(regex: &mut String, host: &str) {
    if host == "*" {
        regex.push_str("[^/:]+");
        return;
    }
    match host.strip_prefix("*.") {
        Some(rest) => {
            regex.push_str(r"(?:[^/:]*\.)?");
            regex.push_str(&regex::escape(rest));
        }
        None => regex.push_str(&regex::escape(host)),
    }
}

fn push_wildcard_literal(regex: &mut String, text: &str) {
    for (i, part) in text.split('*').enumerate() {
        if i > 0 {
            regex.push_str(".*");
        }
        regex.push_str(&regex::escape(part));
    }
}

/// Translate a match pattern, yielding `None` for anything the grammar rejects.
pub fn match_pattern_to_regex(pattern: &str, target: PatternTarget) -> Option<PatternRegex> {
    if pattern.trim() == ALL_URLS {
        return Some(PatternRegex::AllUrls);
    }
    let parsed = match MatchPattern::parse(pattern) {
        Ok(parsed) => parsed,
        Err(e) => {
            log::debug!("dropping match pattern: {e}");
            return None;
        }
    };
    match parsed.to_regex(target) {
        Ok(source) => Some(PatternRegex::Source(source)),
        Err(e) => {
            log::debug!("dropping match pattern: {e}");
            None
        }
    }
}
