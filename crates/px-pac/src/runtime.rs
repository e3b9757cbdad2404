//! Sandbox-local routing state.
//!
//! The sandbox shares no memory with the background context. It rebuilds its
//! own compiled rules from the records it receives and routes with the same
//! decision engine, so both sides agree once the latest message is applied.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use px_core::decision::{ActiveProfileState, Decision, ProxyRequest, RoutingAction};
use px_core::rule::{CompiledProxyRulesInfo, CompiledRulesRecord};
use px_core::state::HotProfileState;
use px_core::types::{BypassConfig, ProfileType};

use crate::error::PacError;
use crate::message::{PacMessage, PacSnapshot};

/// PAC result for a routing action.
///
/// System mode never reaches a PAC script, so it answers `DIRECT`.
pub fn pac_result(action: &RoutingAction) -> String {
    match action {
        RoutingAction::Proxy(server) => server.pac_result(),
        RoutingAction::Direct | RoutingAction::SystemProxy => "DIRECT".to_string(),
    }
}

pub struct PacRuntime {
    state: HotProfileState,
    initialized: AtomicBool,
}

impl Default for PacRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl PacRuntime {
    /// A runtime that answers `DIRECT` until it is initialised.
    pub fn new() -> Self {
        Self {
            state: HotProfileState::new(ActiveProfileState::default(), BypassConfig::default()),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn generation(&self) -> u64 {
        self.state.generation()
    }

    pub fn profile_type(&self) -> ProfileType {
        self.state.load().profile.profile_type
    }

    pub fn rule_count(&self) -> usize {
        self.state.load().profile.compiled_rules.len()
    }

    /// Apply one message. Slice updates before the first `Init` are refused
    /// since there is nothing to apply them to.
    pub fn apply(&self, message: PacMessage) -> Result<(), PacError> {
        let kind = message.kind();
        match message {
            PacMessage::Init(snapshot) => {
                self.init(snapshot);
                return Ok(());
            }
            _ if !self.is_initialized() => {
                log::warn!("ignoring '{kind}' before init");
                return Err(PacError::NotInitialized);
            }
            PacMessage::ProxyModeChanged(mode) => self.update_profile(|profile| profile.profile_type = mode),
            PacMessage::ProxyRulesChanged(records) => {
                let rules = rebuild_rules(&records);
                self.update_profile(|profile| profile.compiled_rules = rules);
            }
            PacMessage::ActiveProxyServerChanged(server) => {
                self.update_profile(|profile| profile.active_proxy_server = server)
            }
            PacMessage::BypassChanged(bypass) => {
                self.state.replace_bypass(bypass);
            }
        }
        log::debug!("applied '{kind}', generation {}", self.generation());
        Ok(())
    }

    /// Decode and apply a JSON message.
    pub fn apply_json(&self, json: &str) -> Result<(), PacError> {
        self.apply(PacMessage::from_json(json)?)
    }

    pub fn decide(&self, url: &str, host: &str) -> Decision {
        let request = if host.is_empty() {
            ProxyRequest::new(url)
        } else {
            ProxyRequest::with_host(url, host)
        };
        self.state.decide(&request)
    }

    /// The PAC entry point: a result string for one request.
    pub fn find_proxy_for_url(&self, url: &str, host: &str) -> String {
        pac_result(&self.decide(url, host).action)
    }

    fn init(&self, snapshot: PacSnapshot) {
        let profile = ActiveProfileState {
            profile_id: snapshot.profile_id,
            profile_type: snapshot.proxy_mode,
            compiled_rules: rebuild_rules(&snapshot.compiled_rules),
            active_proxy_server: snapshot.active_proxy_server,
        };
        self.state.replace(profile, snapshot.bypass);
        self.initialized.store(true, Ordering::Release);
        log::info!(
            "PAC runtime initialised: {:?}, {} rules",
            self.profile_type(),
            self.rule_count()
        );
    }

    fn update_profile<F>(&self, update: F)
    where
        F: FnOnce(&mut ActiveProfileState),
    {
        let mut profile = (*self.state.load().profile).clone();
        update(&mut profile);
        self.state.replace_profile(profile);
    }
}

fn rebuild_rules(records: &CompiledRulesRecord) -> CompiledProxyRulesInfo {
    let rules = CompiledProxyRulesInfo::from_records(records);
    let sent = records.whitelist_rules.len()
        + records.rules.len()
        + records.whitelist_subscription_rules.len()
        + records.subscription_rules.len();
    if rules.len() < sent {
        log::warn!("{} of {sent} compiled rules could not be rebuilt", sent - rules.len());
    }
    rules
}

impl std::fmt::Debug for PacRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacRuntime")
            .field("initialized", &self.is_initialized())
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

/// Shape of the browser proxy-settings request for a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ProxyConfigRequest {
    Direct,
    System,
    PacScript {
        #[serde(rename = "pacScript")]
        pac_script: PacScriptData,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacScriptData {
    pub data: String,
}

/// Direct and System modes are handed to the browser as-is; every other
/// mode runs the PAC script.
pub fn proxy_config_request(profile_type: ProfileType, pac_source: &str) -> ProxyConfigRequest {
    match profile_type {
        ProfileType::Direct => ProxyConfigRequest::Direct,
        ProfileType::SystemProxy => ProxyConfigRequest::System,
        ProfileType::SmartRules | ProfileType::AlwaysEnabledBypassRules | ProfileType::IgnoreFailureRules => {
            ProxyConfigRequest::PacScript {
                pac_script: PacScriptData {
                    data: pac_source.to_string(),
                },
            }
        }
    }
}
