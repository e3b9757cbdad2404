//! Compiled rules and the per-profile compiled state.
//!
//! A `CompiledRule` is immutable once built. Whenever a profile's rules,
//! subscriptions or enabled flags change, the whole `CompiledProxyRulesInfo`
//! is rebuilt and swapped in; nothing here is mutated in place.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::types::{CompiledRuleType, ProxyServer, RuleSource};

// =============================================================================
// Predicates
// =============================================================================

/// The matching strategy of a compiled rule, carrying only what it needs.
#[derive(Debug, Clone)]
pub enum Predicate {
    /// Regex tested against the lower-cased host
    RegexHost(Regex),
    /// Regex tested against the lower-cased URL
    RegexUrl(Regex),
    /// Case-insensitive equality with the whole URL
    Exact(String),
    /// URL prefix
    SearchUrl(String),
    /// Host equality
    SearchDomain(String),
    /// Host equality or any subdomain of it
    SearchDomainSubdomain(String),
    /// Prefix of the scheme-less URL (host literal, optionally with port/path)
    SearchDomainAndPath(String),
    /// Like `SearchDomainAndPath`, also accepting subdomains of the host
    SearchDomainSubdomainAndPath(String),
}

impl Predicate {
    pub fn rule_type(&self) -> CompiledRuleType {
        match self {
            Self::RegexHost(_) => CompiledRuleType::RegexHost,
            Self::RegexUrl(_) => CompiledRuleType::RegexUrl,
            Self::Exact(_) => CompiledRuleType::Exact,
            Self::SearchUrl(_) => CompiledRuleType::SearchUrl,
            Self::SearchDomain(_) => CompiledRuleType::SearchDomain,
            Self::SearchDomainSubdomain(_) => CompiledRuleType::SearchDomainSubdomain,
            Self::SearchDomainAndPath(_) => CompiledRuleType::SearchDomainAndPath,
            Self::SearchDomainSubdomainAndPath(_) => CompiledRuleType::SearchDomainSubdomainAndPath,
        }
    }

    /// Build a predicate from its kind and text.
    ///
    /// The matcher compares against case-folded hosts and URLs, so search
    /// terms are lower-cased and regexes match case-insensitively.
    pub fn build(rule_type: CompiledRuleType, text: &str) -> Result<Self, regex::Error> {
        Ok(match rule_type {
            CompiledRuleType::RegexHost => Self::RegexHost(build_case_insensitive(text)?),
            CompiledRuleType::RegexUrl => Self::RegexUrl(build_case_insensitive(text)?),
            CompiledRuleType::Exact => Self::Exact(text.to_lowercase()),
            CompiledRuleType::SearchUrl => Self::SearchUrl(text.to_lowercase()),
            CompiledRuleType::SearchDomain => Self::SearchDomain(text.to_lowercase()),
            CompiledRuleType::SearchDomainSubdomain => Self::SearchDomainSubdomain(text.to_lowercase()),
            CompiledRuleType::SearchDomainAndPath => Self::SearchDomainAndPath(text.to_lowercase()),
            CompiledRuleType::SearchDomainSubdomainAndPath => {
                Self::SearchDomainSubdomainAndPath(text.to_lowercase())
            }
        })
    }

    /// Regex source or search text.
    pub fn text(&self) -> &str {
        match self {
            Self::RegexHost(re) | Self::RegexUrl(re) => re.as_str(),
            Self::Exact(s)
            | Self::SearchUrl(s)
            | Self::SearchDomain(s)
            | Self::SearchDomainSubdomain(s)
            | Self::SearchDomainAndPath(s)
            | Self::SearchDomainSubdomainAndPath(s) => s,
        }
    }
}

fn build_case_insensitive(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

impl PartialEq for Predicate {
    fn eq(&self, other: &Self) -> bool {
        self.rule_type() == other.rule_type() && self.text() == other.text()
    }
}

impl Eq for Predicate {}

// =============================================================================
// Compiled Rule
// =============================================================================

/// A matcher-ready rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledRule {
    pub predicate: Predicate,
    pub source: RuleSource,
    pub host_name: String,
    /// Server override, already resolved against the server registry
    pub proxy: Option<ProxyServer>,
    pub white_list: bool,
    pub rule_id: Option<String>,
}

impl CompiledRule {
    pub fn rule_type(&self) -> CompiledRuleType {
        self.predicate.rule_type()
    }

    /// Flatten into the wire record sent to the PAC sandbox.
    pub fn to_record(&self) -> CompiledRuleRecord {
        let rule_type = self.rule_type();
        let text = self.predicate.text().to_string();
        let (regex, search) = if rule_type.is_regex() {
            (Some(text), None)
        } else {
            (None, Some(text))
        };
        CompiledRuleRecord {
            compiled_rule_type: rule_type,
            regex,
            search,
            compiled_rule_source: self.source,
            host_name: self.host_name.clone(),
            proxy: self.proxy.clone(),
            white_list: self.white_list,
            rule_id: self.rule_id.clone(),
        }
    }

    /// Rebuild from a wire record. A record whose regex does not build, or
    /// that lacks the text field its kind requires, yields `None`.
    pub fn from_record(record: &CompiledRuleRecord) -> Option<Self> {
        let text = if record.compiled_rule_type.is_regex() {
            record.regex.as_deref()
        } else {
            record.search.as_deref()
        }?;

        let predicate = match Predicate::build(record.compiled_rule_type, text) {
            Ok(predicate) => predicate,
            Err(e) => {
                log::warn!("dropping compiled rule '{}': {e}", record.host_name);
                return None;
            }
        };

        Some(Self {
            predicate,
            source: record.compiled_rule_source,
            host_name: record.host_name.clone(),
            proxy: record.proxy.clone(),
            white_list: record.white_list,
            rule_id: record.rule_id.clone(),
        })
    }
}

/// Flat, serialisable form of a compiled rule: exactly one of `regex` or
/// `search` is populated depending on `compiledRuleType`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledRuleRecord {
    pub compiled_rule_type: CompiledRuleType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default)]
    pub compiled_rule_source: RuleSource,
    #[serde(default)]
    pub host_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyServer>,
    #[serde(default)]
    pub white_list: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
}

// =============================================================================
// Buckets
// =============================================================================

/// Priority bucket, highest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bucket {
    /// P1: own whitelist rules
    WhitelistRules,
    /// P2: own proxy rules
    Rules,
    /// P3: subscription whitelist rules
    WhitelistSubscriptionRules,
    /// P4: subscription proxy rules
    SubscriptionRules,
}

impl Bucket {
    /// All buckets in evaluation order.
    pub const PRIORITY_ORDER: [Bucket; 4] = [
        Bucket::WhitelistRules,
        Bucket::Rules,
        Bucket::WhitelistSubscriptionRules,
        Bucket::SubscriptionRules,
    ];

    pub fn for_rule(source: RuleSource, white_list: bool) -> Self {
        match (source, white_list) {
            (RuleSource::Rules, true) => Self::WhitelistRules,
            (RuleSource::Rules, false) => Self::Rules,
            (RuleSource::Subscriptions, true) => Self::WhitelistSubscriptionRules,
            (RuleSource::Subscriptions, false) => Self::SubscriptionRules,
        }
    }

    pub fn is_whitelist(self) -> bool {
        matches!(self, Self::WhitelistRules | Self::WhitelistSubscriptionRules)
    }
}

/// A profile's compiled state, partitioned into the four priority buckets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledProxyRulesInfo {
    pub whitelist_rules: Vec<CompiledRule>,
    pub rules: Vec<CompiledRule>,
    pub whitelist_subscription_rules: Vec<CompiledRule>,
    pub subscription_rules: Vec<CompiledRule>,
}

impl CompiledProxyRulesInfo {
    pub fn bucket(&self, bucket: Bucket) -> &[CompiledRule] {
        match bucket {
            Bucket::WhitelistRules => &self.whitelist_rules,
            Bucket::Rules => &self.rules,
            Bucket::WhitelistSubscriptionRules => &self.whitelist_subscription_rules,
            Bucket::SubscriptionRules => &self.subscription_rules,
        }
    }

    fn bucket_mut(&mut self, bucket: Bucket) -> &mut Vec<CompiledRule> {
        match bucket {
            Bucket::WhitelistRules => &mut self.whitelist_rules,
            Bucket::Rules => &mut self.rules,
            Bucket::WhitelistSubscriptionRules => &mut self.whitelist_subscription_rules,
            Bucket::SubscriptionRules => &mut self.subscription_rules,
        }
    }

    /// Append to the bucket picked by the rule's source and whitelist flag.
    pub fn push(&mut self, rule: CompiledRule) {
        let bucket = Bucket::for_rule(rule.source, rule.white_list);
        self.bucket_mut(bucket).push(rule);
    }

    pub fn len(&self) -> usize {
        Bucket::PRIORITY_ORDER.iter().map(|b| self.bucket(*b).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rules in evaluation order, tagged with their bucket.
    pub fn iter(&self) -> impl Iterator<Item = (Bucket, &CompiledRule)> {
        Bucket::PRIORITY_ORDER
            .into_iter()
            .flat_map(move |bucket| self.bucket(bucket).iter().map(move |rule| (bucket, rule)))
    }

    pub fn to_records(&self) -> CompiledRulesRecord {
        let records = |rules: &[CompiledRule]| -> Vec<CompiledRuleRecord> {
            rules.iter().map(CompiledRule::to_record).collect()
        };
        CompiledRulesRecord {
            whitelist_rules: records(&self.whitelist_rules),
            rules: records(&self.rules),
            whitelist_subscription_rules: records(&self.whitelist_subscription_rules),
            subscription_rules: records(&self.subscription_rules),
        }
    }

    /// Rebuild from records, dropping entries that fail to build. Each record
    /// stays in the bucket it was sent in.
    pub fn from_records(record: &CompiledRulesRecord) -> Self {
        let rebuild = |records: &[CompiledRuleRecord]| -> Vec<CompiledRule> {
            records.iter().filter_map(CompiledRule::from_record).collect()
        };
        Self {
            whitelist_rules: rebuild(&record.whitelist_rules),
            rules: rebuild(&record.rules),
            whitelist_subscription_rules: rebuild(&record.whitelist_subscription_rules),
            subscription_rules: rebuild(&record.subscription_rules),
        }
    }
}

/// Wire form of `CompiledProxyRulesInfo`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompiledRulesRecord {
    pub whitelist_rules: Vec<CompiledRuleRecord>,
    pub rules: Vec<CompiledRuleRecord>,
    pub whitelist_subscription_rules: Vec<CompiledRuleRecord>,
    pub subscription_rules: Vec<CompiledRuleRecord>,
}
