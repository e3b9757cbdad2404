//! Batch rule tester.
//!
//! Answers "which of these rules would catch this URL" for many URLs at once
//! without compiling the whole profile. Each rule is compiled the first time
//! the walk reaches it and reused for every later URL.

use std::cell::OnceCell;

use serde::Serialize;

use px_core::matcher::{predicate_matches, MatchTarget};
use px_core::rule::CompiledRule;
use px_core::types::ProxyServer;

use crate::compiler::compile_rule;
use crate::model::RawRule;

/// The rule a URL hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleTestMatch {
    /// Index into the tested rule list
    pub index: usize,
    pub rule_id: String,
    pub host_name: String,
    pub white_list: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleTestResult {
    pub url: String,
    pub matched: Option<RuleTestMatch>,
}

pub struct RuleTester<'a> {
    rules: &'a [RawRule],
    servers: &'a [ProxyServer],
    /// Enabled rules, whitelist rules first, each group in list order
    order: Vec<usize>,
    compiled: Vec<OnceCell<Option<CompiledRule>>>,
}

impl<'a> RuleTester<'a> {
    pub fn new(rules: &'a [RawRule], servers: &'a [ProxyServer]) -> Self {
        let enabled = |white_list: bool| {
            rules
                .iter()
                .enumerate()
                .filter(move |(_, rule)| rule.enabled && rule.white_list == white_list)
                .map(|(index, _)| index)
        };
        let order = enabled(true).chain(enabled(false)).collect();

        Self {
            rules,
            servers,
            order,
            compiled: (0..rules.len()).map(|_| OnceCell::new()).collect(),
        }
    }

    /// Test one URL or bare host.
    pub fn test(&self, url: &str) -> Option<RuleTestMatch> {
        let target = MatchTarget::new(url);
        self.order.iter().find_map(|&index| {
            let compiled = self.compiled_rule(index)?;
            if !predicate_matches(&compiled.predicate, &target) {
                return None;
            }
            let rule = &self.rules[index];
            Some(RuleTestMatch {
                index,
                rule_id: rule.rule_id.clone(),
                host_name: rule.host_name.clone(),
                white_list: rule.white_list,
            })
        })
    }

    pub fn test_many<'u, I>(&self, urls: I) -> Vec<RuleTestResult>
    where
        I: IntoIterator<Item = &'u str>,
    {
        urls.into_iter()
            .map(|url| RuleTestResult {
                url: url.to_string(),
                matched: self.test(url),
            })
            .collect()
    }

    /// Number of rules compiled so far.
    pub fn compiled_count(&self) -> usize {
        self.compiled.iter().filter(|cell| cell.get().is_some()).count()
    }

    fn compiled_rule(&self, index: usize) -> Option<&CompiledRule> {
        self.compiled[index]
            .get_or_init(|| match compile_rule(&self.rules[index], self.servers) {
                Ok(compiled) => compiled,
                Err(e) => {
                    log::debug!("rule {index} does not compile: {e}");
                    None
                }
            })
            .as_ref()
    }
}
