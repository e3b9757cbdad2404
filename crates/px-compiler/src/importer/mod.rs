//! Third-party rule and server list importers.

pub mod autoproxy;
pub mod servers;
pub mod switchy;

use base64::{engine::general_purpose, Engine as _};

use crate::error::ImportError;
use crate::model::{Obfuscation, ProfileRuleSubscription, RuleListFormat, SubscriptionProxyRule};
use crate::settings::ServerSubscription;

/// Rules parsed out of one list, split by effect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportedRuleList {
    pub black_list: Vec<SubscriptionProxyRule>,
    pub white_list: Vec<SubscriptionProxyRule>,
}

impl ImportedRuleList {
    pub fn len(&self) -> usize {
        self.black_list.len() + self.white_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Parse a rule list in the given format.
pub fn parse_rule_list(format: RuleListFormat, text: &str) -> ImportedRuleList {
    let list = match format {
        RuleListFormat::AutoProxy => autoproxy::parse(text),
        RuleListFormat::SwitchyOmega => switchy::parse(text),
    };
    log::info!(
        "imported {} proxy and {} whitelist rules ({format:?})",
        list.black_list.len(),
        list.white_list.len()
    );
    list
}

/// Undo subscription obfuscation. Base64 payloads may use either alphabet,
/// with or without padding, and may be wrapped across lines.
pub fn decode_payload(raw: &str, obfuscation: Obfuscation) -> Result<String, ImportError> {
    let text = match obfuscation {
        Obfuscation::None => raw.to_string(),
        Obfuscation::Base64 => {
            let compact: String = raw
                .chars()
                .filter(|c| !c.is_whitespace())
                .map(|c| match c {
                    '-' => '+',
                    '_' => '/',
                    c => c,
                })
                .collect();
            let decoded = general_purpose::STANDARD_NO_PAD.decode(compact.trim_end_matches('='))?;
            String::from_utf8(decoded)?
        }
    };

    if text.trim().is_empty() {
        return Err(ImportError::Empty);
    }
    Ok(text)
}

/// Decode a fetched payload, detect its format and parse it.
pub fn import_rule_list(raw: &str, obfuscation: Obfuscation) -> Result<(RuleListFormat, ImportedRuleList), ImportError> {
    let text = decode_payload(raw, obfuscation)?;
    let format = RuleListFormat::detect(&text);
    Ok((format, parse_rule_list(format, &text)))
}

impl ProfileRuleSubscription {
    /// Replace this subscription's rules with a freshly fetched payload.
    /// The format is detected from the payload, not taken from the stored
    /// value. Returns the number of rules now held.
    pub fn apply_payload(&mut self, raw: &str) -> Result<usize, ImportError> {
        let (format, list) = import_rule_list(raw, self.obfuscation)?;
        self.format = format;
        self.proxy_rules = list.black_list;
        self.whitelist_rules = list.white_list;
        Ok(self.proxy_rules.len() + self.whitelist_rules.len())
    }
}

impl ServerSubscription {
    /// Replace the server list with a freshly fetched payload.
    pub fn apply_payload(&mut self, raw: &str) -> Result<usize, ImportError> {
        let text = decode_payload(raw, self.obfuscation)?;
        self.proxies = servers::parse(&text, &self.id, self.proxy_protocol);
        log::info!("server subscription '{}' now has {} servers", self.name, self.proxies.len());
        Ok(self.proxies.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_wrapped_base64() {
        let encoded = general_purpose::STANDARD.encode("[AutoProxy]\n||example.com\n@@||ok.test\n");
        let wrapped = format!("{}\n{}\n", &encoded[..10], &encoded[10..]);
        let text = decode_payload(&wrapped, Obfuscation::Base64).expect("payload should decode");
        assert!(text.contains("||example.com"));
    }

    #[test]
    fn decodes_url_safe_unpadded() {
        let encoded = general_purpose::URL_SAFE_NO_PAD.encode("||a.test\n||b.test??>");
        let text = decode_payload(&encoded, Obfuscation::Base64).expect("payload should decode");
        assert_eq!(text, "||a.test\n||b.test??>");
    }

    #[test]
    fn rejects_bad_payloads() {
        assert!(matches!(decode_payload("%%%", Obfuscation::Base64), Err(ImportError::Base64(_))));
        assert!(matches!(decode_payload("  \n", Obfuscation::None), Err(ImportError::Empty)));
    }

    #[test]
    fn import_detects_format() {
        let (format, list) =
            import_rule_list("[SwitchyOmega Conditions]\n*.example.com\n", Obfuscation::None).expect("import");
        assert_eq!(format, RuleListFormat::SwitchyOmega);
        assert_eq!(list.len(), 1);

        let (format, list) = import_rule_list("||example.com\n@@||ok.test", Obfuscation::None).expect("import");
        assert_eq!(format, RuleListFormat::AutoProxy);
        assert_eq!(list.black_list.len(), 1);
        assert_eq!(list.white_list.len(), 1);
    }

    #[test]
    fn subscriptions_take_fetched_payloads() {
        let mut rules = ProfileRuleSubscription {
            obfuscation: Obfuscation::Base64,
            format: RuleListFormat::SwitchyOmega,
            ..Default::default()
        };
        let payload = general_purpose::STANDARD.encode("! gfwlist\n||a.test\n||b.test\n@@||c.test\n");
        assert_eq!(rules.apply_payload(&payload).expect("payload applies"), 3);
        assert_eq!(rules.format, RuleListFormat::AutoProxy);
        assert_eq!(rules.whitelist_rules.len(), 1);

        let mut servers = ServerSubscription {
            id: "office".into(),
            ..Default::default()
        };
        assert_eq!(servers.apply_payload("10.0.0.1:3128\nsocks5://10.0.0.2:1080\n").expect("payload applies"), 2);
        assert_eq!(servers.proxies[1].id, "office:10.0.0.2:1080");
    }
}
