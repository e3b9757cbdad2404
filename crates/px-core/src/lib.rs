//! Proxy Rules Core Library
//!
//! This crate holds the compiled side of the proxy rule engine: the compiled
//! predicate model, the match-pattern grammar, the matcher and the decision
//! engine. It is shared by the background context and the PAC sandbox so
//! both route a given request the same way.
//!
//! # Architecture
//!
//! Compiled state is immutable. A profile's `CompiledProxyRulesInfo` is built
//! once (by `px-compiler`, or from wire records inside the PAC sandbox) and
//! then only read; changes are applied by building a new snapshot and
//! swapping it in (`state::HotProfileState`).
//!
//! # Modules
//!
//! - `types`: proxy servers, profile modes, bypass configuration
//! - `pattern`: WebExtension match-pattern → regex translation
//! - `rule`: compiled predicates, priority buckets and their wire records
//! - `url`: allocation-free URL helpers
//! - `matcher`: first-match-wins rule evaluation
//! - `decision`: routing decision per profile mode
//! - `state`: hot-swappable routing snapshot

pub mod decision;
pub mod matcher;
pub mod pattern;
pub mod rule;
pub mod state;
pub mod types;
pub mod url;

// Re-export commonly used types
pub use decision::{decide, ActiveProfileState, Decision, MatchedRuleInfo, ProxyRequest, RoutingAction};
pub use matcher::{Matcher, MatchTarget, RuleMatch};
pub use pattern::{match_pattern_to_regex, PatternRegex, PatternTarget};
pub use rule::{Bucket, CompiledProxyRulesInfo, CompiledRule, CompiledRuleRecord, CompiledRulesRecord, Predicate};
pub use state::{HotProfileState, RoutingSnapshot};
pub use types::{BypassConfig, CompiledRuleType, ProfileType, ProxyProtocol, ProxyServer, RuleSource};
