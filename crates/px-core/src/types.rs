//! Core type definitions shared by the compiler, the matcher and the PAC runtime.
//!
//! Everything here is part of the persisted or cross-context wire shape, so
//! the serde field names follow the camelCase schema the extension stores.

use serde::{Deserialize, Serialize};

// =============================================================================
// Proxy Servers
// =============================================================================

/// Protocol spoken to an upstream proxy server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProxyProtocol {
    #[default]
    #[serde(rename = "HTTP")]
    Http,
    #[serde(rename = "HTTPS")]
    Https,
    #[serde(rename = "SOCKS4")]
    Socks4,
    #[serde(rename = "SOCKS5")]
    Socks5,
}

impl ProxyProtocol {
    /// Keyword used for this protocol in a PAC result string.
    pub fn pac_keyword(self) -> &'static str {
        match self {
            Self::Http => "PROXY",
            Self::Https => "HTTPS",
            Self::Socks4 => "SOCKS",
            Self::Socks5 => "SOCKS5",
        }
    }
}

/// Validation failure for a proxy server definition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServerError {
    #[error("proxy server name is empty")]
    EmptyName,
    #[error("invalid proxy host: '{0}'")]
    InvalidHost(String),
    #[error("invalid proxy port: {0}")]
    InvalidPort(u16),
    #[error("proxy DNS is only supported for SOCKS5 servers")]
    ProxyDnsUnsupported,
}

/// An upstream proxy server.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyServer {
    pub id: String,
    pub name: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub protocol: ProxyProtocol,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Resolve DNS at the proxy (SOCKS5 only).
    #[serde(default, rename = "proxyDNS")]
    pub proxy_dns: bool,
}

impl ProxyServer {
    /// Check the validity invariant: non-empty name, valid host, non-zero port.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.name.trim().is_empty() {
            return Err(ServerError::EmptyName);
        }
        if !is_valid_host(&self.host) {
            return Err(ServerError::InvalidHost(self.host.clone()));
        }
        if self.port == 0 {
            return Err(ServerError::InvalidPort(self.port));
        }
        if self.proxy_dns && self.protocol != ProxyProtocol::Socks5 {
            return Err(ServerError::ProxyDnsUnsupported);
        }
        Ok(())
    }

    /// PAC result string for this server, e.g. `SOCKS5 10.0.0.1:1080`.
    pub fn pac_result(&self) -> String {
        format!("{} {}:{}", self.protocol.pac_keyword(), self.host, self.port)
    }
}

/// Accepts DNS names, IPv4 literals and bracketed IPv6 literals.
pub fn is_valid_host(host: &str) -> bool {
    let host = host.trim();
    if host.is_empty() || host.len() > 253 {
        return false;
    }

    if let Some(inner) = host.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
        return inner.parse::<std::net::Ipv6Addr>().is_ok();
    }

    if host.starts_with('.') || host.ends_with('.') || host.contains("..") {
        return false;
    }

    host.bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-' || b == b'_')
}

// =============================================================================
// Profiles
// =============================================================================

/// Operating mode of a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProfileType {
    /// Never proxy.
    #[default]
    Direct,
    /// Defer to the operating system / browser proxy settings.
    SystemProxy,
    /// Proxy only what the rules select.
    SmartRules,
    /// Proxy everything except bypassed hosts and whitelisted rules.
    AlwaysEnabledBypassRules,
    /// Rules collected from failed requests; routed like `SmartRules`.
    IgnoreFailureRules,
}

bitflags::bitflags! {
    /// What a profile type consults when deciding.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ProfileFeatures: u8 {
        /// Own rules are compiled and matched
        const RULES = 1 << 0;
        /// Rule subscriptions are compiled and matched
        const SUBSCRIPTIONS = 1 << 1;
        /// Unmatched requests go through the profile proxy
        const PROXY_BY_DEFAULT = 1 << 2;
        /// The global bypass list can be applied
        const BYPASS = 1 << 3;
    }
}

impl ProfileType {
    pub fn features(self) -> ProfileFeatures {
        match self {
            Self::Direct => ProfileFeatures::empty(),
            Self::SystemProxy => ProfileFeatures::BYPASS,
            Self::SmartRules => ProfileFeatures::RULES | ProfileFeatures::SUBSCRIPTIONS,
            Self::AlwaysEnabledBypassRules => {
                ProfileFeatures::RULES
                    | ProfileFeatures::SUBSCRIPTIONS
                    | ProfileFeatures::PROXY_BY_DEFAULT
                    | ProfileFeatures::BYPASS
            }
            Self::IgnoreFailureRules => ProfileFeatures::RULES,
        }
    }

    pub fn supports_rules(self) -> bool {
        self.features().contains(ProfileFeatures::RULES)
    }

    pub fn supports_subscriptions(self) -> bool {
        self.features().contains(ProfileFeatures::SUBSCRIPTIONS)
    }
}

// =============================================================================
// Bypass
// =============================================================================

/// Hosts exempted from proxying in Always-Enabled and System modes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BypassConfig {
    pub enable_for_always: bool,
    pub enable_for_system: bool,
    pub bypass_list: Vec<String>,
}

impl BypassConfig {
    /// Whether the bypass list is active for the given mode.
    pub fn applies_to(&self, profile_type: ProfileType) -> bool {
        if !profile_type.features().contains(ProfileFeatures::BYPASS) {
            return false;
        }
        match profile_type {
            ProfileType::SystemProxy => self.enable_for_system,
            _ => self.enable_for_always,
        }
    }

    /// Whether a host is listed, ignoring case.
    ///
    /// Entries are exact host names; `*.example.com` / `.example.com` also
    /// cover subdomains and `<local>` covers dot-less host names.
    pub fn contains_host(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        self.bypass_list.iter().any(|entry| {
            let entry = entry.trim().to_ascii_lowercase();
            if entry == "<local>" {
                return !host.is_empty() && !host.contains('.') && !host.contains(':');
            }
            if let Some(suffix) = entry.strip_prefix("*.").or_else(|| entry.strip_prefix('.')) {
                return host.len() > suffix.len()
                    && host.ends_with(suffix)
                    && host.as_bytes()[host.len() - suffix.len() - 1] == b'.'
                    || host == suffix;
            }
            host == entry
        })
    }
}

// =============================================================================
// Rule provenance
// =============================================================================

/// Where a compiled rule came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RuleSource {
    /// Authored on the profile
    #[default]
    Rules,
    /// Imported from a rule subscription
    Subscriptions,
}

/// Concrete matching strategy of a compiled rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompiledRuleType {
    RegexHost,
    RegexUrl,
    Exact,
    SearchUrl,
    SearchDomain,
    SearchDomainSubdomain,
    SearchDomainAndPath,
    SearchDomainSubdomainAndPath,
}

impl CompiledRuleType {
    /// Regex-backed kinds carry `regex`, every other kind carries `search`.
    pub fn is_regex(self) -> bool {
        matches!(self, Self::RegexHost | Self::RegexUrl)
    }
}
