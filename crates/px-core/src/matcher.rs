//! Rule Matching Engine
//!
//! Every proxied request goes through here, so the per-request work is kept
//! to one lower-casing of the URL and slice views into it.

use crate::rule::{Bucket, CompiledProxyRulesInfo, CompiledRule, Predicate};
use crate::url::{ensure_scheme, get_host_position, get_scheme_end, search_host};

// =============================================================================
// Match Target
// =============================================================================

/// A request prepared for matching: lower-cased URL (scheme synthesised when a
/// bare host was given) with the host located once.
#[derive(Debug, Clone)]
pub struct MatchTarget {
    url: String,
    scheme_end: usize,
    host_start: usize,
    host_end: usize,
}

impl MatchTarget {
    pub fn new(url_or_host: &str) -> Self {
        let url = ensure_scheme(url_or_host.trim()).to_lowercase();
        let scheme_end = get_scheme_end(&url).unwrap_or(0);
        let (host_start, mut host_end) = get_host_position(&url).unwrap_or((scheme_end, scheme_end));

        // "example.com." and "example.com" are the same host
        if host_end > host_start && url.as_bytes()[host_end - 1] == b'.' {
            host_end -= 1;
        }

        Self {
            url,
            scheme_end,
            host_start,
            host_end,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn host(&self) -> &str {
        &self.url[self.host_start..self.host_end]
    }

    /// URL with `scheme://` removed.
    pub fn schemeless(&self) -> &str {
        &self.url[self.scheme_end..]
    }

    /// Everything after the host: port, path, query.
    fn after_host(&self) -> &str {
        let rest = &self.url[self.host_end..];
        // trailing root dot trimmed from the host
        rest.strip_prefix('.').unwrap_or(rest)
    }
}

// =============================================================================
// Predicate Evaluation
// =============================================================================

/// Evaluate one predicate. Never fails: a predicate either matches or not.
pub fn predicate_matches(predicate: &Predicate, target: &MatchTarget) -> bool {
    match predicate {
        Predicate::RegexHost(re) => re.is_match(target.host()),
        Predicate::RegexUrl(re) => re.is_match(target.url()),
        Predicate::Exact(search) => target.url() == search.as_str(),
        Predicate::SearchUrl(search) => target.url().starts_with(search.as_str()),
        Predicate::SearchDomain(search) => target.host() == search.as_str(),
        Predicate::SearchDomainSubdomain(search) => is_same_or_subdomain(target.host(), search),
        Predicate::SearchDomainAndPath(search) => target.schemeless().starts_with(search.as_str()),
        Predicate::SearchDomainSubdomainAndPath(search) => domain_subdomain_and_path(search, target),
    }
}

fn is_same_or_subdomain(host: &str, domain: &str) -> bool {
    if domain.is_empty() {
        return false;
    }
    host == domain
        || host.len() > domain.len()
            && host.ends_with(domain)
            && host.as_bytes()[host.len() - domain.len() - 1] == b'.'
}

/// Order of checks:
/// 1. the scheme-less URL starts with the search text;
/// 2. the request host is a subdomain of the search host and the remainder
///    (port/path) starts with the search remainder;
/// 3. the scheme-less URL contains the search text right after a dot.
fn domain_subdomain_and_path(search: &str, target: &MatchTarget) -> bool {
    let schemeless = target.schemeless();
    if schemeless.starts_with(search) {
        return true;
    }

    if let Some(rule_host) = search_host(search) {
        let rule_rest = &search[rule_host.len()..];
        if is_same_or_subdomain(target.host(), rule_host) && target.after_host().starts_with(rule_rest) {
            return true;
        }
    }

    let bytes = schemeless.as_bytes();
    schemeless
        .match_indices(search)
        .any(|(i, _)| i > 0 && bytes[i - 1] == b'.')
}

// =============================================================================
// Matcher
// =============================================================================

/// The rule that decided a request, with its provenance.
#[derive(Debug, Clone, Copy)]
pub struct RuleMatch<'a> {
    pub rule: &'a CompiledRule,
    pub bucket: Bucket,
    /// Position within the bucket
    pub index: usize,
}

/// First-match-wins evaluation over a profile's compiled buckets.
pub struct Matcher<'a> {
    rules: &'a CompiledProxyRulesInfo,
}

impl<'a> Matcher<'a> {
    pub fn new(rules: &'a CompiledProxyRulesInfo) -> Self {
        Self { rules }
    }

    /// Match a URL, or a bare host (treated as `http://host`).
    pub fn find_match(&self, url_or_host: &str) -> Option<RuleMatch<'a>> {
        self.find_match_target(&MatchTarget::new(url_or_host))
    }

    /// Match a bare host (as a PAC `host` argument). Host rules see the host,
    /// URL rules see `http://host/`.
    pub fn find_match_host(&self, host: &str) -> Option<RuleMatch<'a>> {
        self.find_match_target(&MatchTarget::new(host))
    }

    /// Buckets in priority order P1→P4, rules in list order; first success wins.
    pub fn find_match_target(&self, target: &MatchTarget) -> Option<RuleMatch<'a>> {
        for bucket in Bucket::PRIORITY_ORDER {
            for (index, rule) in self.rules.bucket(bucket).iter().enumerate() {
                if predicate_matches(&rule.predicate, target) {
                    return Some(RuleMatch { rule, bucket, index });
                }
            }
        }
        None
    }

    /// Evaluate many candidates against the same buckets.
    pub fn find_matches<'u, I>(&self, urls: I) -> Vec<Option<RuleMatch<'a>>>
    where
        I: IntoIterator<Item = &'u str>,
    {
        urls.into_iter().map(|url| self.find_match(url)).collect()
    }
}
