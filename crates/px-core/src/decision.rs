//! Decision Engine
//!
//! Combines the matcher with the active profile's mode and the bypass list to
//! produce the routing action for one request. Nothing in here fails: every
//! degraded path resolves to `Direct`.

use serde::{Deserialize, Serialize};

use crate::matcher::{Matcher, MatchTarget, RuleMatch};
use crate::rule::{Bucket, CompiledProxyRulesInfo};
use crate::types::{BypassConfig, CompiledRuleType, ProfileFeatures, ProfileType, ProxyServer, RuleSource};
use crate::url::is_proxyable_url;

// =============================================================================
// Inputs
// =============================================================================

/// A request to route.
#[derive(Debug, Clone, Copy)]
pub struct ProxyRequest<'a> {
    /// Full request URL (a bare host is accepted too)
    pub url: &'a str,
    /// Host as reported by the browser, if known
    pub host: Option<&'a str>,
}

impl<'a> ProxyRequest<'a> {
    pub fn new(url: &'a str) -> Self {
        Self { url, host: None }
    }

    pub fn with_host(url: &'a str, host: &'a str) -> Self {
        Self { url, host: Some(host) }
    }
}

/// Everything the engine needs to know about the active profile.
///
/// Built once per profile/rule/server change and then only read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveProfileState {
    pub profile_id: String,
    pub profile_type: ProfileType,
    pub compiled_rules: CompiledProxyRulesInfo,
    /// Proxy used when a rule has no override, and by default in Always mode
    pub active_proxy_server: Option<ProxyServer>,
}

// =============================================================================
// Outputs
// =============================================================================

/// Final routing action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "server")]
pub enum RoutingAction {
    Direct,
    Proxy(ProxyServer),
    /// Hand the request to the OS/browser proxy configuration
    SystemProxy,
}

/// Provenance of the rule that decided a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedRuleInfo {
    pub rule_id: Option<String>,
    pub host_name: String,
    pub rule_text: String,
    pub compiled_rule_type: CompiledRuleType,
    pub source: RuleSource,
    pub bucket: Bucket,
    pub white_list: bool,
}

impl From<&RuleMatch<'_>> for MatchedRuleInfo {
    fn from(m: &RuleMatch<'_>) -> Self {
        Self {
            rule_id: m.rule.rule_id.clone(),
            host_name: m.rule.host_name.clone(),
            rule_text: m.rule.predicate.text().to_string(),
            compiled_rule_type: m.rule.rule_type(),
            source: m.rule.source,
            bucket: m.bucket,
            white_list: m.bucket.is_whitelist(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub action: RoutingAction,
    pub matched_rule: Option<MatchedRuleInfo>,
}

impl Decision {
    pub fn direct() -> Self {
        Self {
            action: RoutingAction::Direct,
            matched_rule: None,
        }
    }

    fn with_rule(action: RoutingAction, m: &RuleMatch<'_>) -> Self {
        Self {
            action,
            matched_rule: Some(MatchedRuleInfo::from(m)),
        }
    }

    pub fn is_direct(&self) -> bool {
        self.action == RoutingAction::Direct
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Route one request.
pub fn decide(request: &ProxyRequest<'_>, state: &ActiveProfileState, bypass: &BypassConfig) -> Decision {
    if !is_proxyable_url(request.url) {
        return Decision::direct();
    }

    match state.profile_type {
        ProfileType::Direct => Decision::direct(),
        ProfileType::SystemProxy => {
            let target = MatchTarget::new(request.url);
            if is_bypassed(request, &target, state.profile_type, bypass) {
                return Decision::direct();
            }
            Decision {
                action: RoutingAction::SystemProxy,
                matched_rule: None,
            }
        }
        ProfileType::SmartRules | ProfileType::AlwaysEnabledBypassRules | ProfileType::IgnoreFailureRules => {
            let target = MatchTarget::new(request.url);
            if is_bypassed(request, &target, state.profile_type, bypass) {
                return Decision::direct();
            }
            match Matcher::new(&state.compiled_rules).find_match_target(&target) {
                Some(m) if m.bucket.is_whitelist() => Decision::with_rule(RoutingAction::Direct, &m),
                Some(m) => Decision::with_rule(proxy_or_direct(m.rule.proxy.as_ref(), state), &m),
                None if state.profile_type.features().contains(ProfileFeatures::PROXY_BY_DEFAULT) => Decision {
                    action: proxy_or_direct(None, state),
                    matched_rule: None,
                },
                None => Decision::direct(),
            }
        }
    }
}

fn is_bypassed(
    request: &ProxyRequest<'_>,
    target: &MatchTarget,
    profile_type: ProfileType,
    bypass: &BypassConfig,
) -> bool {
    if !bypass.applies_to(profile_type) {
        return false;
    }
    let host = match request.host {
        Some(host) => host.to_ascii_lowercase(),
        None => target.host().to_string(),
    };
    bypass.contains_host(&host)
}

/// Rule override first, then the profile's server; no server means Direct.
fn proxy_or_direct(rule_proxy: Option<&ProxyServer>, state: &ActiveProfileState) -> RoutingAction {
    match rule_proxy.or(state.active_proxy_server.as_ref()) {
        Some(server) => RoutingAction::Proxy(server.clone()),
        None => {
            log::debug!("no proxy server for profile '{}', going direct", state.profile_id);
            RoutingAction::Direct
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{CompiledRule, Predicate};

    fn server(id: &str) -> ProxyServer {
        ProxyServer {
            id: id.into(),
            name: id.into(),
            host: format!("{id}.proxy.test"),
            port: 3128,
            ..Default::default()
        }
    }

    fn rule(search: &str, white_list: bool, proxy: Option<ProxyServer>) -> CompiledRule {
        CompiledRule {
            predicate: Predicate::SearchDomainSubdomain(search.into()),
            source: RuleSource::Rules,
            host_name: search.into(),
            proxy,
            white_list,
            rule_id: Some(format!("rule-{search}")),
        }
    }

    fn state(profile_type: ProfileType, rules: Vec<CompiledRule>) -> ActiveProfileState {
        let mut compiled_rules = CompiledProxyRulesInfo::default();
        for r in rules {
            compiled_rules.push(r);
        }
        ActiveProfileState {
            profile_id: "p".into(),
            profile_type,
            compiled_rules,
            active_proxy_server: Some(server("main")),
        }
    }

    fn decide_url(url: &str, state: &ActiveProfileState, bypass: &BypassConfig) -> Decision {
        decide(&ProxyRequest::new(url), state, bypass)
    }

    #[test]
    fn direct_and_system_modes_skip_rules() {
        let bypass = BypassConfig::default();
        let s = state(ProfileType::Direct, vec![rule("example.com", false, None)]);
        assert!(decide_url("https://example.com/", &s, &bypass).is_direct());

        let s = state(ProfileType::SystemProxy, vec![rule("example.com", true, None)]);
        let d = decide_url("https://example.com/", &s, &bypass);
        assert_eq!(d.action, RoutingAction::SystemProxy);
        assert!(d.matched_rule.is_none());
    }

    #[test]
    fn system_mode_honours_bypass() {
        let bypass = BypassConfig {
            enable_for_system: true,
            bypass_list: vec!["intranet.corp".into()],
            ..Default::default()
        };
        let s = state(ProfileType::SystemProxy, vec![]);
        assert!(decide_url("http://intranet.corp/", &s, &bypass).is_direct());
        assert_eq!(decide_url("http://example.com/", &s, &bypass).action, RoutingAction::SystemProxy);
    }

    #[test]
    fn smart_rules_whitelist_wins() {
        let bypass = BypassConfig::default();
        // proxy rule pushed first, whitelist rule second: bucket priority still wins
        let s = state(
            ProfileType::SmartRules,
            vec![
                rule("example.com", false, Some(server("override"))),
                rule("example.com", true, None),
            ],
        );
        let d = decide_url("https://www.example.com/", &s, &bypass);
        assert!(d.is_direct());
        let matched = d.matched_rule.expect("whitelist rule should be reported");
        assert_eq!(matched.bucket, Bucket::WhitelistRules);
        assert!(matched.white_list);
    }

    #[test]
    fn smart_rules_override_then_profile_server() {
        let bypass = BypassConfig::default();
        let s = state(
            ProfileType::SmartRules,
            vec![
                rule("override.test", false, Some(server("override"))),
                rule("plain.test", false, None),
            ],
        );
        assert_eq!(
            decide_url("https://override.test/", &s, &bypass).action,
            RoutingAction::Proxy(server("override"))
        );
        assert_eq!(
            decide_url("https://plain.test/", &s, &bypass).action,
            RoutingAction::Proxy(server("main"))
        );
        let d = decide_url("https://unmatched.test/", &s, &bypass);
        assert!(d.is_direct());
        assert!(d.matched_rule.is_none());
    }

    #[test]
    fn missing_server_degrades_to_direct() {
        let bypass = BypassConfig::default();
        let mut s = state(ProfileType::SmartRules, vec![rule("example.com", false, None)]);
        s.active_proxy_server = None;
        let d = decide_url("https://example.com/", &s, &bypass);
        assert!(d.is_direct());
        assert!(d.matched_rule.is_some());

        let mut s = state(ProfileType::AlwaysEnabledBypassRules, vec![]);
        s.active_proxy_server = None;
        assert!(decide_url("https://example.com/", &s, &bypass).is_direct());
    }

    #[test]
    fn always_mode_bypass_list() {
        let bypass = BypassConfig {
            enable_for_always: true,
            enable_for_system: false,
            bypass_list: vec!["internal.corp".into()],
        };
        let s = state(ProfileType::AlwaysEnabledBypassRules, vec![]);
        assert!(decide_url("http://internal.corp/wiki", &s, &bypass).is_direct());
        assert!(decide(&ProxyRequest::with_host("http://INTERNAL.corp/", "INTERNAL.CORP"), &s, &bypass).is_direct());
        assert_eq!(
            decide_url("http://example.com/", &s, &bypass).action,
            RoutingAction::Proxy(server("main"))
        );

        let disabled = BypassConfig {
            enable_for_always: false,
            ..bypass.clone()
        };
        assert_eq!(
            decide_url("http://internal.corp/wiki", &s, &disabled).action,
            RoutingAction::Proxy(server("main"))
        );
    }

    #[test]
    fn always_mode_whitelist_rule_forces_direct() {
        let bypass = BypassConfig::default();
        let s = state(
            ProfileType::AlwaysEnabledBypassRules,
            vec![rule("bank.test", true, None), rule("video.test", false, Some(server("fast")))],
        );
        assert!(decide_url("https://bank.test/", &s, &bypass).is_direct());
        assert_eq!(
            decide_url("https://video.test/", &s, &bypass).action,
            RoutingAction::Proxy(server("fast"))
        );
        assert_eq!(
            decide_url("https://other.test/", &s, &bypass).action,
            RoutingAction::Proxy(server("main"))
        );
    }

    #[test]
    fn non_proxyable_schemes_are_direct() {
        let bypass = BypassConfig::default();
        let s = state(ProfileType::AlwaysEnabledBypassRules, vec![rule("blank", false, None)]);
        for url in ["about:blank", "data:text/plain,hi", "chrome-extension://abc/x.html"] {
            let d = decide_url(url, &s, &bypass);
            assert!(d.is_direct(), "{url} should be direct");
            assert!(d.matched_rule.is_none());
        }
    }
}
