//! Persisted settings root.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use px_core::decision::ActiveProfileState;
use px_core::types::{BypassConfig, ProxyProtocol, ProxyServer};

use crate::compiler::compile_profile;
use crate::error::{RuleCompileError, SettingsError};
use crate::migrate::migrate;
use crate::model::{Obfuscation, SmartProfile};

/// A list of proxy servers fetched from a URL.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSubscription {
    pub id: String,
    pub name: String,
    pub url: String,
    pub enabled: bool,
    pub obfuscation: Obfuscation,
    /// Protocol for lines that do not name one
    pub proxy_protocol: ProxyProtocol,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub refresh_rate: u32,
    pub proxies: Vec<ProxyServer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub proxy_servers: Vec<ProxyServer>,
    pub proxy_profiles: Vec<SmartProfile>,
    pub active_profile_id: Option<String>,
    pub active_incognito_profile_id: Option<String>,
    pub default_proxy_server_id: Option<String>,
    pub bypass: BypassConfig,
    pub server_subscriptions: Vec<ServerSubscription>,
}

/// The active profile compiled and ready for the decision engine.
#[derive(Debug)]
pub struct CompiledProfile {
    pub state: ActiveProfileState,
    pub errors: Vec<RuleCompileError>,
}

impl Settings {
    /// Load settings, migrating legacy fields and repairing duplicate rule ids.
    pub fn from_json(text: &str) -> Result<Self, SettingsError> {
        let mut value: serde_json::Value = serde_json::from_str(text)?;
        migrate(&mut value);
        let mut settings: Settings = serde_json::from_value(value)?;
        let regenerated = settings.ensure_unique_rule_ids();
        if regenerated > 0 {
            log::info!("assigned {regenerated} new rule ids");
        }
        Ok(settings)
    }

    pub fn to_json_pretty(&self) -> Result<String, SettingsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Every known server: own servers first, then enabled subscriptions.
    pub fn all_proxy_servers(&self) -> Vec<ProxyServer> {
        let subscribed = self
            .server_subscriptions
            .iter()
            .filter(|s| s.enabled)
            .flat_map(|s| s.proxies.iter());
        self.proxy_servers.iter().chain(subscribed).cloned().collect()
    }

    pub fn find_proxy_server(&self, id: &str) -> Option<ProxyServer> {
        self.all_proxy_servers().into_iter().find(|server| server.id == id)
    }

    pub fn profile(&self, profile_id: &str) -> Option<&SmartProfile> {
        self.proxy_profiles.iter().find(|p| p.profile_id == profile_id)
    }

    /// Incognito windows use their own profile when one is set.
    pub fn active_profile(&self, incognito: bool) -> Result<&SmartProfile, SettingsError> {
        let id = if incognito {
            self.active_incognito_profile_id
                .as_deref()
                .or(self.active_profile_id.as_deref())
        } else {
            self.active_profile_id.as_deref()
        }
        .ok_or(SettingsError::NoActiveProfile)?;

        self.profile(id)
            .ok_or_else(|| SettingsError::ProfileNotFound(id.to_string()))
    }

    /// Compile a profile against the current server registry.
    pub fn compile(&self, profile: &SmartProfile) -> CompiledProfile {
        let servers = self.all_proxy_servers();
        let output = compile_profile(profile, &servers);

        let server_id = profile
            .profile_proxy_server_id
            .as_deref()
            .or(self.default_proxy_server_id.as_deref())
            .filter(|id| !id.is_empty());
        let active_proxy_server = server_id.and_then(|id| {
            let server = servers.iter().find(|s| s.id == id).cloned();
            if server.is_none() {
                log::warn!("profile '{}' uses unknown proxy server '{id}'", profile.profile_id);
            }
            server
        });

        CompiledProfile {
            state: ActiveProfileState {
                profile_id: profile.profile_id.clone(),
                profile_type: profile.profile_type,
                compiled_rules: output.info,
                active_proxy_server,
            },
            errors: output.errors,
        }
    }

    pub fn compile_active(&self, incognito: bool) -> Result<CompiledProfile, SettingsError> {
        let profile = self.active_profile(incognito)?;
        Ok(self.compile(profile))
    }

    /// Check every own server definition.
    pub fn validate_servers(&self) -> Result<(), SettingsError> {
        for server in &self.proxy_servers {
            server.validate().map_err(|source| SettingsError::InvalidServer {
                id: server.id.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Delete a server and clear every rule, profile and default reference to it.
    pub fn remove_proxy_server(&mut self, id: &str) -> Option<ProxyServer> {
        let position = self.proxy_servers.iter().position(|s| s.id == id)?;
        let removed = self.proxy_servers.remove(position);

        let is_removed = |reference: &Option<String>| reference.as_deref() == Some(id);
        if is_removed(&self.default_proxy_server_id) {
            self.default_proxy_server_id = None;
        }
        for profile in &mut self.proxy_profiles {
            if is_removed(&profile.profile_proxy_server_id) {
                profile.profile_proxy_server_id = None;
            }
            for rule in &mut profile.proxy_rules {
                if is_removed(&rule.proxy_server_id) {
                    rule.proxy_server_id = None;
                }
            }
        }

        log::debug!("removed proxy server '{id}'");
        Some(removed)
    }

    /// Give every rule a non-empty id unique within its profile. Returns how
    /// many ids were (re)assigned.
    pub fn ensure_unique_rule_ids(&mut self) -> usize {
        let mut regenerated = 0;
        for profile in &mut self.proxy_profiles {
            let mut seen = HashSet::new();
            for rule in &mut profile.proxy_rules {
                if rule.rule_id.is_empty() || !seen.insert(rule.rule_id.clone()) {
                    rule.rule_id = new_rule_id(&seen);
                    seen.insert(rule.rule_id.clone());
                    regenerated += 1;
                }
            }
        }
        regenerated
    }
}

fn new_rule_id(seen: &HashSet<String>) -> String {
    loop {
        let id = uuid::Uuid::new_v4().to_string();
        if !seen.contains(&id) {
            return id;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RawRule;
    use px_core::decision::{Decision, ProxyRequest, RoutingAction};
    use px_core::types::ProfileType;

    const SETTINGS: &str = r#"{
        "proxyServers": [
            { "id": "main", "name": "Main", "host": "10.0.0.1", "port": 3128, "protocol": "HTTP" },
            { "id": "socks", "name": "Socks", "host": "10.0.0.2", "port": 1080, "protocol": "SOCKS5", "proxyDNS": true }
        ],
        "proxyProfiles": [
            {
                "profileId": "smart",
                "profileName": "Smart",
                "profileType": "SmartRules",
                "profileProxyServerId": "main",
                "proxyRules": [
                    { "ruleId": "r1", "ruleType": "DomainSubdomain", "hostName": "example.com", "ruleSearch": "example.com" },
                    { "ruleId": "r1", "ruleType": "DomainSubdomain", "hostName": "video.test", "ruleSearch": "video.test", "proxyServerId": "socks" },
                    { "ruleType": "RegexHost", "hostName": "bank", "ruleRegex": "^bank\\.", "whiteList": true }
                ]
            },
            { "profileId": "always", "profileType": "AlwaysEnabledBypassRules" }
        ],
        "activeProfileId": "smart",
        "activeIncognitoProfileId": "always",
        "defaultProxyServerId": "socks",
        "bypass": { "enableForAlways": true, "bypassList": ["localhost"] }
    }"#;

    #[test]
    fn loads_and_repairs_ids() {
        let settings = Settings::from_json(SETTINGS).expect("settings should load");
        let rules = &settings.proxy_profiles[0].proxy_rules;
        assert_eq!(rules[0].rule_id, "r1");
        assert_ne!(rules[1].rule_id, "r1");
        assert!(!rules[2].rule_id.is_empty());
        assert!(settings.bypass.enable_for_always);
        assert!(settings.validate_servers().is_ok());
    }

    #[test]
    fn compiles_active_profile() {
        let settings = Settings::from_json(SETTINGS).expect("settings should load");
        let compiled = settings.compile_active(false).expect("active profile");
        let state = &compiled.state;
        assert_eq!(state.profile_type, ProfileType::SmartRules);
        assert_eq!(state.active_proxy_server.as_ref().map(|s| s.id.as_str()), Some("main"));
        assert_eq!(state.compiled_rules.rules.len(), 2);
        assert_eq!(state.compiled_rules.whitelist_rules.len(), 1);

        let decide = |url| px_core::decision::decide(&ProxyRequest::new(url), state, &settings.bypass);
        assert!(matches!(decide("https://www.example.com/"), Decision { action: RoutingAction::Proxy(s), .. } if s.id == "main"));
        assert!(matches!(decide("https://video.test/"), Decision { action: RoutingAction::Proxy(s), .. } if s.id == "socks"));
        assert!(decide("https://bank.example.com/").is_direct());

        // incognito profile falls back to the default server
        let compiled = settings.compile_active(true).expect("incognito profile");
        assert_eq!(compiled.state.profile_type, ProfileType::AlwaysEnabledBypassRules);
        assert_eq!(compiled.state.active_proxy_server.map(|s| s.id), Some("socks".to_string()));
    }

    #[test]
    fn missing_profiles_are_errors() {
        let mut settings = Settings::default();
        assert!(matches!(settings.compile_active(false), Err(SettingsError::NoActiveProfile)));
        settings.active_profile_id = Some("nope".into());
        assert!(matches!(settings.compile_active(false), Err(SettingsError::ProfileNotFound(_))));
    }

    #[test]
    fn removing_a_server_clears_references() {
        let mut settings = Settings::from_json(SETTINGS).expect("settings should load");
        let removed = settings.remove_proxy_server("socks").expect("server exists");
        assert_eq!(removed.id, "socks");
        assert!(settings.default_proxy_server_id.is_none());
        assert!(settings.proxy_profiles[0]
            .proxy_rules
            .iter()
            .all(|r| r.proxy_server_id.is_none()));
        assert_eq!(settings.proxy_profiles[0].profile_proxy_server_id.as_deref(), Some("main"));
        assert!(settings.remove_proxy_server("socks").is_none());
    }

    #[test]
    fn subscribed_servers_are_resolvable() {
        let mut settings = Settings::default();
        settings.server_subscriptions.push(ServerSubscription {
            enabled: true,
            proxies: vec![ProxyServer {
                id: "sub:1.2.3.4:80".into(),
                name: "sub".into(),
                host: "1.2.3.4".into(),
                port: 80,
                ..Default::default()
            }],
            ..Default::default()
        });
        assert!(settings.find_proxy_server("sub:1.2.3.4:80").is_some());
        settings.server_subscriptions[0].enabled = false;
        assert!(settings.find_proxy_server("sub:1.2.3.4:80").is_none());
    }

    #[test]
    fn rejects_invalid_servers() {
        let mut settings = Settings::default();
        settings.proxy_servers.push(ProxyServer {
            id: "bad".into(),
            name: "bad".into(),
            host: "proxy.test".into(),
            port: 0,
            ..Default::default()
        });
        assert!(matches!(
            settings.validate_servers(),
            Err(SettingsError::InvalidServer { ref id, .. }) if id == "bad"
        ));
    }

    #[test]
    fn round_trips_through_json() {
        let mut settings = Settings::default();
        let mut profile = SmartProfile::new("p", ProfileType::SmartRules);
        profile.proxy_rules.push(RawRule::domain_subdomain("1", "example.com"));
        profile.proxy_rules[0].white_list = true;
        settings.proxy_profiles.push(profile);
        let json = settings.to_json_pretty().expect("serialises");
        assert_eq!(Settings::from_json(&json).expect("reloads"), settings);
    }
}
