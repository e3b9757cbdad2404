//! SwitchyOmega condition lists (`[SwitchyOmega Conditions]`).

use px_core::types::CompiledRuleType;

use super::ImportedRuleList;
use crate::model::SubscriptionProxyRule;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConditionKind {
    HostWildcard,
    HostRegex,
    UrlWildcard,
    UrlRegex,
    Keyword,
}

impl ConditionKind {
    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix.to_ascii_lowercase().as_str() {
            "hostwildcard" => Some(Self::HostWildcard),
            "hostregex" => Some(Self::HostRegex),
            "urlwildcard" => Some(Self::UrlWildcard),
            "urlregex" => Some(Self::UrlRegex),
            "keyword" => Some(Self::Keyword),
            _ => None,
        }
    }
}

pub fn parse(text: &str) -> ImportedRuleList {
    let mut list = ImportedRuleList::default();
    let mut with_result = false;

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('!') || line.starts_with(';') || line.starts_with('[') {
            continue;
        }
        if let Some(directive) = line.strip_prefix('@') {
            with_result = directive.trim().eq_ignore_ascii_case("with result");
            continue;
        }

        let (condition, white_list) = if with_result {
            match line.rsplit_once(" +") {
                Some((condition, result)) => (condition.trim(), result.trim().eq_ignore_ascii_case("direct")),
                None => (line, false),
            }
        } else {
            (line, false)
        };

        match convert_condition(line, condition) {
            Some(rule) if white_list => list.white_list.push(rule),
            Some(rule) => list.black_list.push(rule),
            None => log::debug!("skipping SwitchyOmega condition '{line}'"),
        }
    }

    list
}

fn convert_condition(name: &str, condition: &str) -> Option<SubscriptionProxyRule> {
    let (kind, value) = split_prefix(condition)?;
    let value = value.trim();
    if value.is_empty() || value == "*" {
        return None;
    }

    let rule = match kind {
        ConditionKind::HostWildcard => host_wildcard(name, value),
        ConditionKind::HostRegex => SubscriptionProxyRule::regex(name, CompiledRuleType::RegexHost, value),
        ConditionKind::UrlWildcard => SubscriptionProxyRule::regex(
            name,
            CompiledRuleType::RegexUrl,
            format!("^{}$", wildcard_to_regex(value)),
        ),
        ConditionKind::UrlRegex => SubscriptionProxyRule::regex(name, CompiledRuleType::RegexUrl, value),
        ConditionKind::Keyword => SubscriptionProxyRule::regex(
            name,
            CompiledRuleType::RegexUrl,
            regex::escape(&value.to_lowercase()),
        ),
    };
    Some(rule)
}

/// `Prefix: value`, defaulting to a host wildcard. Unknown prefixes yield `None`.
fn split_prefix(condition: &str) -> Option<(ConditionKind, &str)> {
    match condition.split_once(':') {
        Some((prefix, value)) if !prefix.is_empty() && prefix.bytes().all(|b| b.is_ascii_alphabetic()) => {
            // a bare `host:port` has digits after the colon, not a condition name
            if value.bytes().all(|b| b.is_ascii_digit()) && !value.is_empty() {
                return Some((ConditionKind::HostWildcard, condition));
            }
            ConditionKind::from_prefix(prefix).map(|kind| (kind, value))
        }
        _ => Some((ConditionKind::HostWildcard, condition)),
    }
}

fn host_wildcard(name: &str, value: &str) -> SubscriptionProxyRule {
    let host = value.to_lowercase();
    let suffix = host.strip_prefix("**.").or_else(|| host.strip_prefix("*."));
    match suffix {
        Some(domain) if !has_wildcard(domain) => {
            SubscriptionProxyRule::search(name, CompiledRuleType::SearchDomainSubdomain, domain)
        }
        _ if !has_wildcard(&host) && host.contains(':') => {
            SubscriptionProxyRule::search(name, CompiledRuleType::SearchDomainAndPath, host)
        }
        _ if !has_wildcard(&host) => SubscriptionProxyRule::search(name, CompiledRuleType::SearchDomain, host),
        _ => SubscriptionProxyRule::regex(
            name,
            CompiledRuleType::RegexHost,
            format!("^{}$", wildcard_to_regex(&host)),
        ),
    }
}

fn has_wildcard(text: &str) -> bool {
    text.contains(['*', '?'])
}

fn wildcard_to_regex(text: &str) -> String {
    let lower = text.to_lowercase();
    let mut regex = String::with_capacity(lower.len() * 2);
    let mut buf = [0u8; 4];
    for c in lower.chars() {
        match c {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            _ => regex.push_str(&regex::escape(c.encode_utf8(&mut buf))),
        }
    }
    regex
}
