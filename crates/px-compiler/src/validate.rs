//! Save-time rule validation.
//!
//! The compiler drops broken rules quietly; this is where the user gets told.

use regex::Regex;

use px_core::pattern::{MatchPattern, PatternTarget, ALL_URLS};
use px_core::url::{get_scheme_end, remove_scheme};

use crate::error::RuleError;
use crate::model::{RawRule, RuleType};

/// Check that a rule would compile.
pub fn validate_rule(rule: &RawRule) -> Result<(), RuleError> {
    let text = rule.rule_text().ok_or(RuleError::MissingField {
        rule_type: rule.rule_type,
        field: rule.rule_type.text_field(),
    })?;

    match rule.rule_type {
        RuleType::MatchPatternHost | RuleType::MatchPatternUrl => {
            if text == ALL_URLS {
                return Ok(());
            }
            let target = if rule.rule_type == RuleType::MatchPatternHost {
                PatternTarget::Host
            } else {
                PatternTarget::Url
            };
            let source = MatchPattern::parse(text)?.to_regex(target)?;
            check_regex(&source)
        }
        RuleType::RegexHost | RuleType::RegexUrl => check_regex(text),
        RuleType::Exact => {
            if get_scheme_end(text).is_none() || remove_scheme(text).is_empty() {
                return Err(RuleError::InvalidExactUrl(text.to_string()));
            }
            Ok(())
        }
        RuleType::DomainSubdomain => {
            if text.contains("://") || text.contains(char::is_whitespace) || text.starts_with('/') {
                return Err(RuleError::InvalidSearch(text.to_string()));
            }
            Ok(())
        }
    }
}

fn check_regex(pattern: &str) -> Result<(), RuleError> {
    Regex::new(pattern).map(drop).map_err(|source| RuleError::Regex {
        pattern: pattern.to_string(),
        source,
    })
}
