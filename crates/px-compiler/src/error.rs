//! Error types for authoring, compilation, import and settings loading.

use px_core::pattern::PatternError;

use crate::model::RuleType;

/// A rule the user tried to save (or that was stored) is not usable.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("{rule_type:?} rule is missing its '{field}' value")]
    MissingField { rule_type: RuleType, field: &'static str },
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error("invalid regular expression '{pattern}': {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("exact rule '{0}' must be a full URL with a scheme")]
    InvalidExactUrl(String),
    #[error("'{0}' is not a valid domain search term")]
    InvalidSearch(String),
}

/// A rule that was dropped while compiling a profile.
#[derive(Debug, thiserror::Error)]
#[error("rule '{rule_id}' ({host_name}) was not compiled: {source}")]
pub struct RuleCompileError {
    pub rule_id: String,
    pub host_name: String,
    #[source]
    pub source: RuleError,
}

/// Failure to turn a subscription payload into rules or servers.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("subscription payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("decoded subscription payload is not UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("subscription payload is empty")]
    Empty,
}

/// Failure to load or use persisted settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("settings are not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("profile '{0}' does not exist")]
    ProfileNotFound(String),
    #[error("no active profile is configured")]
    NoActiveProfile,
    #[error("proxy server '{id}' is invalid: {source}")]
    InvalidServer {
        id: String,
        #[source]
        source: px_core::types::ServerError,
    },
}
