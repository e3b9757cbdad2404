//! Proxy Rule Compiler
//!
//! This crate owns the persisted settings schema and compiles a profile's
//! authored and subscribed rules into the bucketed form `px-core` matches on.

pub mod compiler;
pub mod error;
pub mod importer;
pub mod migrate;
pub mod model;
pub mod settings;
pub mod tester;
pub mod validate;

pub use compiler::{compile, compile_profile, CompileOutput};
pub use error::{ImportError, RuleCompileError, RuleError, SettingsError};
pub use importer::{decode_payload, import_rule_list, parse_rule_list, ImportedRuleList};
pub use model::{
    Obfuscation, ProfileRuleSubscription, RawRule, RuleListFormat, RuleType, SmartProfile, SubscriptionProxyRule,
};
pub use settings::{CompiledProfile, ServerSubscription, Settings};
pub use tester::{RuleTestMatch, RuleTestResult, RuleTester};
pub use validate::validate_rule;
