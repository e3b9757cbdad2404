//! Background ↔ PAC sandbox message protocol.
//!
//! `Init` carries a full snapshot. Every other message carries exactly one
//! slice and replaces that slice wholesale; there are no partial diffs.

use serde::{Deserialize, Serialize};

use px_core::decision::ActiveProfileState;
use px_core::rule::CompiledRulesRecord;
use px_core::types::{BypassConfig, ProfileType, ProxyServer};

use crate::error::PacError;

/// Everything the sandbox needs to route on its own.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PacSnapshot {
    pub profile_id: String,
    pub proxy_mode: ProfileType,
    pub compiled_rules: CompiledRulesRecord,
    pub bypass: BypassConfig,
    pub active_proxy_server: Option<ProxyServer>,
}

impl PacSnapshot {
    pub fn from_state(state: &ActiveProfileState, bypass: &BypassConfig) -> Self {
        Self {
            profile_id: state.profile_id.clone(),
            proxy_mode: state.profile_type,
            compiled_rules: state.compiled_rules.to_records(),
            bypass: bypass.clone(),
            active_proxy_server: state.active_proxy_server.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum PacMessage {
    Init(PacSnapshot),
    ProxyModeChanged(ProfileType),
    ProxyRulesChanged(CompiledRulesRecord),
    ActiveProxyServerChanged(Option<ProxyServer>),
    BypassChanged(BypassConfig),
}

impl PacMessage {
    pub fn from_json(json: &str) -> Result<Self, PacError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, PacError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Message type as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Init(_) => "init",
            Self::ProxyModeChanged(_) => "proxyModeChanged",
            Self::ProxyRulesChanged(_) => "proxyRulesChanged",
            Self::ActiveProxyServerChanged(_) => "activeProxyServerChanged",
            Self::BypassChanged(_) => "bypassChanged",
        }
    }
}
