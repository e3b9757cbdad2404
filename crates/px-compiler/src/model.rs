//! Persisted rule and profile schema.
//!
//! These are the durable shapes stored by the extension; field names are the
//! camelCase keys found in storage.

use serde::{Deserialize, Serialize};

use px_core::types::{CompiledRuleType, ProfileType};

/// Kind of a user-authored rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleType {
    MatchPatternHost,
    MatchPatternUrl,
    RegexHost,
    RegexUrl,
    Exact,
    DomainSubdomain,
}

impl RuleType {
    /// Name of the text field that is meaningful for this kind.
    pub fn text_field(self) -> &'static str {
        match self {
            Self::MatchPatternHost | Self::MatchPatternUrl => "rulePattern",
            Self::RegexHost | Self::RegexUrl => "ruleRegex",
            Self::Exact => "ruleExact",
            Self::DomainSubdomain => "ruleSearch",
        }
    }
}

fn enabled_by_default() -> bool {
    true
}

/// A rule as authored by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRule {
    #[serde(default)]
    pub rule_id: String,
    pub rule_type: RuleType,
    #[serde(default)]
    pub host_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_regex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_exact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_search: Option<String>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub white_list: bool,
    /// Server override; a reference into the server registry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_server_id: Option<String>,
}

impl RawRule {
    /// The type-specific text, trimmed; `None` when absent or blank.
    pub fn rule_text(&self) -> Option<&str> {
        let text = match self.rule_type {
            RuleType::MatchPatternHost | RuleType::MatchPatternUrl => self.rule_pattern.as_deref(),
            RuleType::RegexHost | RuleType::RegexUrl => self.rule_regex.as_deref(),
            RuleType::Exact => self.rule_exact.as_deref(),
            RuleType::DomainSubdomain => self.rule_search.as_deref(),
        }?;
        let text = text.trim();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    /// Convenience constructor for a domain-and-subdomains rule.
    pub fn domain_subdomain(rule_id: &str, search: &str) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            rule_type: RuleType::DomainSubdomain,
            host_name: search.to_string(),
            rule_pattern: None,
            rule_regex: None,
            rule_exact: None,
            rule_search: Some(search.to_string()),
            enabled: true,
            white_list: false,
            proxy_server_id: None,
        }
    }
}

/// A rule produced by a rule-list importer, already in compiled vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionProxyRule {
    /// Source line, for display
    #[serde(default)]
    pub name: String,
    pub imported_rule_type: CompiledRuleType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
}

impl SubscriptionProxyRule {
    pub fn search(name: &str, rule_type: CompiledRuleType, search: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            imported_rule_type: rule_type,
            search: Some(search.into()),
            regex: None,
        }
    }

    pub fn regex(name: &str, rule_type: CompiledRuleType, regex: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            imported_rule_type: rule_type,
            search: None,
            regex: Some(regex.into()),
        }
    }
}

/// Payload encoding of a fetched subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Obfuscation {
    #[default]
    None,
    Base64,
}

/// Text format of a rule subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RuleListFormat {
    /// GFWList / AutoProxy
    #[default]
    AutoProxy,
    SwitchyOmega,
}

impl RuleListFormat {
    pub fn detect(text: &str) -> Self {
        let first = text.lines().map(str::trim).find(|line| !line.is_empty());
        match first {
            Some(line) if line.eq_ignore_ascii_case("[SwitchyOmega Conditions]") => Self::SwitchyOmega,
            _ => Self::AutoProxy,
        }
    }
}

/// A rule list fetched from a URL and attached to a profile.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileRuleSubscription {
    pub id: String,
    pub name: String,
    pub url: String,
    pub enabled: bool,
    pub obfuscation: Obfuscation,
    pub format: RuleListFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Minutes between refreshes, 0 disables refreshing
    pub refresh_rate: u32,
    pub proxy_rules: Vec<SubscriptionProxyRule>,
    pub whitelist_rules: Vec<SubscriptionProxyRule>,
}

/// A routing profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmartProfile {
    pub profile_id: String,
    #[serde(default)]
    pub profile_name: String,
    pub profile_type: ProfileType,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub proxy_rules: Vec<RawRule>,
    #[serde(default)]
    pub rules_subscriptions: Vec<ProfileRuleSubscription>,
    /// Server used by this profile; falls back to the settings default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_proxy_server_id: Option<String>,
}

impl SmartProfile {
    pub fn new(profile_id: &str, profile_type: ProfileType) -> Self {
        Self {
            profile_id: profile_id.to_string(),
            profile_name: profile_id.to_string(),
            profile_type,
            enabled: true,
            proxy_rules: Vec::new(),
            rules_subscriptions: Vec::new(),
            profile_proxy_server_id: None,
        }
    }
}
