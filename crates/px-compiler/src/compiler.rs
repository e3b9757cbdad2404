//! Rule Compiler
//!
//! Turns a profile's authored rules and its subscription rules into the four
//! priority buckets the matcher walks. Compilation is all-or-nothing per rule:
//! a rule that cannot be compiled is left out and the rest of the batch goes
//! on without it.

use px_core::pattern::{match_pattern_to_regex, PatternRegex, PatternTarget};
use px_core::rule::{CompiledProxyRulesInfo, CompiledRule, Predicate};
use px_core::types::{CompiledRuleType, ProfileType, ProxyServer, RuleSource};
use px_core::url::is_ip_with_optional_port;

use crate::error::{RuleCompileError, RuleError};
use crate::model::{ProfileRuleSubscription, RawRule, RuleType, SmartProfile, SubscriptionProxyRule};

/// Compiled buckets plus the rules that had to be left out.
#[derive(Debug, Default)]
pub struct CompileOutput {
    pub info: CompiledProxyRulesInfo,
    pub errors: Vec<RuleCompileError>,
}

pub fn compile_profile(profile: &SmartProfile, servers: &[ProxyServer]) -> CompileOutput {
    let output = compile(
        profile.profile_type,
        &profile.proxy_rules,
        &profile.rules_subscriptions,
        servers,
    );
    log::info!(
        "compiled profile '{}': {} rules, {} dropped",
        profile.profile_id,
        output.info.len(),
        output.errors.len()
    );
    output
}

/// Compile rules for a profile of the given type.
///
/// Own rules are compiled only when the type supports rules and
/// subscriptions only when it supports subscriptions. Order within each
/// bucket follows input order; nothing is deduplicated.
pub fn compile(
    profile_type: ProfileType,
    raw_rules: &[RawRule],
    subscriptions: &[ProfileRuleSubscription],
    servers: &[ProxyServer],
) -> CompileOutput {
    let mut output = CompileOutput::default();

    if profile_type.supports_rules() {
        for rule in raw_rules.iter().filter(|rule| rule.enabled) {
            match compile_rule(rule, servers) {
                Ok(Some(compiled)) => output.info.push(compiled),
                Ok(None) => {}
                Err(source) => {
                    log::warn!("dropping rule '{}': {source}", rule.rule_id);
                    output.errors.push(RuleCompileError {
                        rule_id: rule.rule_id.clone(),
                        host_name: rule.host_name.clone(),
                        source,
                    });
                }
            }
        }
    }

    if profile_type.supports_subscriptions() {
        for subscription in subscriptions.iter().filter(|s| s.enabled) {
            let whitelist = subscription
                .whitelist_rules
                .iter()
                .map(|rule| (rule, true));
            let proxy = subscription.proxy_rules.iter().map(|rule| (rule, false));
            for (rule, white_list) in whitelist.chain(proxy) {
                if let Some(compiled) = compile_subscription_rule(rule, white_list) {
                    output.info.push(compiled);
                }
            }
        }
    }

    output
}

// =============================================================================
// Authored Rules
// =============================================================================

/// Compile one authored rule.
///
/// `Ok(None)` means the rule has nothing usable (no text, or a match pattern
/// the grammar rejects) and is dropped without an error. A regex that does
/// not build is an error.
pub fn compile_rule(rule: &RawRule, servers: &[ProxyServer]) -> Result<Option<CompiledRule>, RuleError> {
    let Some(text) = rule.rule_text() else {
        log::debug!("rule '{}' has no {} value", rule.rule_id, rule.rule_type.text_field());
        return Ok(None);
    };

    let predicate = match rule.rule_type {
        RuleType::Exact => Predicate::Exact(text.to_lowercase()),
        RuleType::MatchPatternHost => match pattern_predicate(text, PatternTarget::Host)? {
            Some(predicate) => predicate,
            None => return Ok(None),
        },
        RuleType::MatchPatternUrl => match pattern_predicate(text, PatternTarget::Url)? {
            Some(predicate) => predicate,
            None => return Ok(None),
        },
        RuleType::RegexHost => build_regex(CompiledRuleType::RegexHost, text)?,
        RuleType::RegexUrl => build_regex(CompiledRuleType::RegexUrl, text)?,
        RuleType::DomainSubdomain => domain_predicate(text),
    };

    Ok(Some(CompiledRule {
        predicate,
        source: RuleSource::Rules,
        host_name: rule.host_name.clone(),
        proxy: resolve_server(rule, servers),
        white_list: rule.white_list,
        rule_id: Some(rule.rule_id.clone()).filter(|id| !id.is_empty()),
    }))
}

fn pattern_predicate(pattern: &str, target: PatternTarget) -> Result<Option<Predicate>, RuleError> {
    let rule_type = match target {
        PatternTarget::Host => CompiledRuleType::RegexHost,
        PatternTarget::Url => CompiledRuleType::RegexUrl,
    };
    match match_pattern_to_regex(pattern, target) {
        // matches everything: an empty URL prefix
        Some(PatternRegex::AllUrls) => Ok(Some(Predicate::SearchUrl(String::new()))),
        Some(PatternRegex::Source(source)) => build_regex(rule_type, &source).map(Some),
        None => Ok(None),
    }
}

fn build_regex(rule_type: CompiledRuleType, pattern: &str) -> Result<Predicate, RuleError> {
    Predicate::build(rule_type, pattern).map_err(|source| RuleError::Regex {
        pattern: pattern.to_string(),
        source,
    })
}

/// An IP literal (with or without port) or anything carrying a path is
/// matched as a scheme-less URL prefix; a plain name covers its subdomains.
fn domain_predicate(search: &str) -> Predicate {
    let search = search.to_lowercase();
    if is_ip_with_optional_port(&search) || search.contains('/') {
        Predicate::SearchDomainAndPath(search)
    } else {
        Predicate::SearchDomainSubdomain(search)
    }
}

fn resolve_server(rule: &RawRule, servers: &[ProxyServer]) -> Option<ProxyServer> {
    let id = rule.proxy_server_id.as_deref().filter(|id| !id.is_empty())?;
    match servers.iter().find(|server| server.id == id) {
        Some(server) => Some(server.clone()),
        None => {
            log::warn!(
                "rule '{}' references unknown proxy server '{id}', using the profile server",
                rule.rule_id
            );
            None
        }
    }
}

// =============================================================================
// Subscription Rules
// =============================================================================

/// Compile one imported rule. Broken entries are logged and skipped.
pub fn compile_subscription_rule(rule: &SubscriptionProxyRule, white_list: bool) -> Option<CompiledRule> {
    let text = if rule.imported_rule_type.is_regex() {
        rule.regex.as_deref()
    } else {
        rule.search.as_deref()
    };
    let Some(text) = text.filter(|t| !t.is_empty()) else {
        log::debug!("subscription rule '{}' has no text", rule.name);
        return None;
    };

    match Predicate::build(rule.imported_rule_type, text) {
        Ok(predicate) => Some(CompiledRule {
            predicate,
            source: RuleSource::Subscriptions,
            host_name: rule.name.clone(),
            proxy: None,
            white_list,
            rule_id: None,
        }),
        Err(e) => {
            log::warn!("dropping subscription rule '{}': {e}", rule.name);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::autoproxy;
    use px_core::decision::{decide, ActiveProfileState, ProxyRequest, RoutingAction};
    use px_core::matcher::Matcher;
    use px_core::rule::Bucket;
    use px_core::types::BypassConfig;

    fn server(id: &str) -> ProxyServer {
        ProxyServer {
            id: id.into(),
            name: id.into(),
            host: format!("{id}.proxy.test"),
            port: 8080,
            ..Default::default()
        }
    }

    fn rule(rule_type: RuleType, text: &str) -> RawRule {
        let mut rule = RawRule::domain_subdomain(&format!("id-{text}"), text);
        rule.rule_type = rule_type;
        rule.rule_search = None;
        match rule_type {
            RuleType::MatchPatternHost | RuleType::MatchPatternUrl => rule.rule_pattern = Some(text.into()),
            RuleType::RegexHost | RuleType::RegexUrl => rule.rule_regex = Some(text.into()),
            RuleType::Exact => rule.rule_exact = Some(text.into()),
            RuleType::DomainSubdomain => rule.rule_search = Some(text.into()),
        }
        rule
    }

    fn smart(rules: Vec<RawRule>) -> SmartProfile {
        let mut profile = SmartProfile::new("smart", ProfileType::SmartRules);
        profile.proxy_rules = rules;
        profile
    }

    #[test]
    fn domain_subdomain_rule() {
        let output = compile_profile(&smart(vec![rule(RuleType::DomainSubdomain, "example.com")]), &[]);
        assert!(output.errors.is_empty());
        assert_eq!(output.info.rules.len(), 1);

        let compiled = &output.info.rules[0];
        assert_eq!(compiled.rule_type(), CompiledRuleType::SearchDomainSubdomain);
        assert_eq!(compiled.predicate.text(), "example.com");

        let matcher = Matcher::new(&output.info);
        assert!(matcher.find_match("sub.example.com").is_some());
        assert!(matcher.find_match("example.com").is_some());
        assert!(matcher.find_match("notexample.com").is_none());
    }

    #[test]
    fn ip_and_port_search_is_a_prefix() {
        let output = compile_profile(&smart(vec![rule(RuleType::DomainSubdomain, "10.19.29.157:9080")]), &[]);
        assert_eq!(output.info.rules[0].rule_type(), CompiledRuleType::SearchDomainAndPath);

        let output = compile_profile(&smart(vec![rule(RuleType::DomainSubdomain, "example.com/docs")]), &[]);
        assert_eq!(output.info.rules[0].rule_type(), CompiledRuleType::SearchDomainAndPath);
    }

    #[test]
    fn imported_lines_compile_into_subscription_buckets() {
        let list = autoproxy::parse("||blocked.com\n@@||allowed.com\n.example.com\n/^https?:\\/\\/x\\.com/\n");
        let mut profile = smart(vec![]);
        profile.rules_subscriptions.push(ProfileRuleSubscription {
            id: "gfw".into(),
            enabled: true,
            proxy_rules: list.black_list,
            whitelist_rules: list.white_list,
            ..Default::default()
        });

        let output = compile_profile(&profile, &[]);
        let info = &output.info;
        assert!(info.rules.is_empty());
        assert_eq!(info.whitelist_subscription_rules.len(), 1);
        assert_eq!(info.subscription_rules.len(), 3);
        assert_eq!(
            info.subscription_rules[1].rule_type(),
            CompiledRuleType::SearchDomainSubdomainAndPath
        );
        assert_eq!(info.subscription_rules[2].predicate.text(), r"^https?:\/\/x\.com");

        let matcher = Matcher::new(info);
        let m = matcher.find_match("https://www.allowed.com/").expect("whitelisted");
        assert_eq!(m.bucket, Bucket::WhitelistSubscriptionRules);
        let m = matcher.find_match("https://x.com/home").expect("regex rule");
        assert_eq!(m.bucket, Bucket::SubscriptionRules);
    }

    #[test]
    fn whitelist_and_proxy_rules_split() {
        let blocked = rule(RuleType::DomainSubdomain, "blocked.com");
        let mut allowed = rule(RuleType::DomainSubdomain, "allowed.com");
        allowed.white_list = true;

        let output = compile_profile(&smart(vec![blocked, allowed]), &[]);
        assert_eq!(output.info.rules.len(), 1);
        assert_eq!(output.info.whitelist_rules.len(), 1);
        assert_eq!(output.info.rules[0].predicate.text(), "blocked.com");
        assert_eq!(output.info.whitelist_rules[0].predicate.text(), "allowed.com");
    }

    #[test]
    fn disabled_rules_are_excluded() {
        let mut disabled = rule(RuleType::DomainSubdomain, "example.com");
        disabled.enabled = false;
        let mut disabled_white = rule(RuleType::RegexHost, "example");
        disabled_white.enabled = false;
        disabled_white.white_list = true;

        let output = compile_profile(&smart(vec![disabled, disabled_white]), &[]);
        assert_eq!(output.info.rules.len(), 0);
        assert!(output.info.is_empty());
        assert!(output.errors.is_empty());
    }

    #[test]
    fn compiling_twice_is_identical() {
        let mut profile = smart(vec![
            rule(RuleType::DomainSubdomain, "example.com"),
            rule(RuleType::MatchPatternUrl, "*://*.example.org/*"),
            rule(RuleType::RegexHost, r"^cdn\d+\.example\.net$"),
            rule(RuleType::Exact, "https://Example.com/Page"),
        ]);
        profile.proxy_rules[1].white_list = true;
        profile.proxy_rules[2].proxy_server_id = Some("fast".into());

        let servers = [server("fast")];
        let first = compile_profile(&profile, &servers);
        let second = compile_profile(&profile, &servers);
        assert_eq!(first.info, second.info);
        assert_eq!(first.info.to_records(), second.info.to_records());
    }

    #[test]
    fn match_patterns() {
        let output = compile_profile(
            &smart(vec![
                rule(RuleType::MatchPatternHost, "*://*.example.com/*"),
                rule(RuleType::MatchPatternUrl, "https://api.example.org/v1/*"),
                rule(RuleType::MatchPatternUrl, "not a pattern"),
            ]),
            &[],
        );
        // malformed pattern dropped without an error
        assert_eq!(output.info.rules.len(), 2);
        assert!(output.errors.is_empty());
        assert_eq!(output.info.rules[0].rule_type(), CompiledRuleType::RegexHost);

        let matcher = Matcher::new(&output.info);
        assert!(matcher.find_match("https://www.example.com:8443/a").is_some());
        assert!(matcher.find_match("https://api.example.org/v1/users").is_some());
        assert!(matcher.find_match("https://api.example.org/v2/users").is_none());
    }

    #[test]
    fn all_urls_matches_everything() {
        let output = compile_profile(&smart(vec![rule(RuleType::MatchPatternUrl, "<all_urls>")]), &[]);
        let matcher = Matcher::new(&output.info);
        assert!(matcher.find_match("https://anything.test/x").is_some());
        assert!(matcher.find_match("ftp://files.test/").is_some());
    }

    #[test]
    fn bad_regex_is_reported_and_skipped() {
        let output = compile_profile(
            &smart(vec![
                rule(RuleType::RegexUrl, "(broken"),
                rule(RuleType::DomainSubdomain, "ok.test"),
            ]),
            &[],
        );
        assert_eq!(output.info.rules.len(), 1);
        assert_eq!(output.errors.len(), 1);
        assert_eq!(output.errors[0].rule_id, "id-(broken");
        assert!(matches!(output.errors[0].source, RuleError::Regex { .. }));
    }

    #[test]
    fn server_overrides_resolve() {
        let mut with_override = rule(RuleType::DomainSubdomain, "fast.test");
        with_override.proxy_server_id = Some("fast".into());
        let mut dangling = rule(RuleType::DomainSubdomain, "gone.test");
        dangling.proxy_server_id = Some("deleted".into());

        let output = compile_profile(&smart(vec![with_override, dangling]), &[server("fast")]);
        assert_eq!(output.info.rules[0].proxy, Some(server("fast")));
        assert_eq!(output.info.rules[1].proxy, None);

        let state = ActiveProfileState {
            profile_id: "smart".into(),
            profile_type: ProfileType::SmartRules,
            compiled_rules: output.info,
            active_proxy_server: Some(server("main")),
        };
        let bypass = BypassConfig::default();
        assert_eq!(
            decide(&ProxyRequest::new("https://fast.test/"), &state, &bypass).action,
            RoutingAction::Proxy(server("fast"))
        );
        assert_eq!(
            decide(&ProxyRequest::new("https://gone.test/"), &state, &bypass).action,
            RoutingAction::Proxy(server("main"))
        );
    }

    #[test]
    fn profile_type_gates_sources() {
        let mut profile = SmartProfile::new("fail", ProfileType::IgnoreFailureRules);
        profile.proxy_rules.push(rule(RuleType::DomainSubdomain, "own.test"));
        profile.rules_subscriptions.push(ProfileRuleSubscription {
            enabled: true,
            proxy_rules: vec![SubscriptionProxyRule::search(
                "||sub.test",
                CompiledRuleType::SearchDomainSubdomain,
                "sub.test",
            )],
            ..Default::default()
        });

        let output = compile_profile(&profile, &[]);
        assert_eq!(output.info.rules.len(), 1);
        assert!(output.info.subscription_rules.is_empty());

        profile.profile_type = ProfileType::Direct;
        assert!(compile_profile(&profile, &[]).info.is_empty());

        profile.profile_type = ProfileType::SmartRules;
        profile.rules_subscriptions[0].enabled = false;
        let output = compile_profile(&profile, &[]);
        assert!(output.info.subscription_rules.is_empty());
    }

    #[test]
    fn broken_subscription_rule_is_skipped() {
        let bad = SubscriptionProxyRule::regex("/(/", CompiledRuleType::RegexUrl, "(");
        let empty = SubscriptionProxyRule {
            name: "empty".into(),
            imported_rule_type: CompiledRuleType::SearchDomain,
            search: None,
            regex: None,
        };
        assert!(compile_subscription_rule(&bad, false).is_none());
        assert!(compile_subscription_rule(&empty, true).is_none());
    }
}
