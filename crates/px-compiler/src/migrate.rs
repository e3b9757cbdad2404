//! Legacy settings migration.
//!
//! Runs on the raw JSON before it is deserialised. Older builds stored rules
//! with `pattern`/`host`/`rule` keys, embedded the proxy server object in the
//! rule, and kept a single rule list at the root instead of profiles.

use serde_json::{Map, Value};

const LEGACY_KEYS: &[(&str, &str)] = &[
    ("pattern", "rulePattern"),
    ("host", "hostName"),
    ("rule", "ruleRegex"),
];

/// Id given to the profile created from a root-level rule list.
pub const LEGACY_PROFILE_ID: &str = "legacy-smart-rules";

/// Canonicalise legacy fields in place. Returns the number of objects changed.
pub fn migrate(settings: &mut Value) -> usize {
    let Some(root) = settings.as_object_mut() else {
        return 0;
    };

    let mut changed = wrap_root_rules(root);

    if let Some(Value::Array(profiles)) = root.get_mut("proxyProfiles") {
        for profile in profiles.iter_mut().filter_map(Value::as_object_mut) {
            if let Some(Value::Array(rules)) = profile.get_mut("proxyRules") {
                changed += rules
                    .iter_mut()
                    .filter_map(Value::as_object_mut)
                    .map(migrate_rule)
                    .filter(|&c| c)
                    .count();
            }
        }
    }

    if changed > 0 {
        log::info!("migrated {changed} legacy settings entries");
    }
    changed
}

/// A root-level `proxyRules` list without profiles becomes one smart profile.
fn wrap_root_rules(root: &mut Map<String, Value>) -> usize {
    if root.contains_key("proxyProfiles") {
        return 0;
    }
    let Some(rules) = root.remove("proxyRules") else {
        return 0;
    };

    let mut profile = Map::new();
    profile.insert("profileId".into(), Value::from(LEGACY_PROFILE_ID));
    profile.insert("profileName".into(), Value::from("Smart Rules"));
    profile.insert("profileType".into(), Value::from("SmartRules"));
    profile.insert("proxyRules".into(), rules);

    root.insert("proxyProfiles".into(), Value::Array(vec![Value::Object(profile)]));
    if !root.contains_key("activeProfileId") {
        root.insert("activeProfileId".into(), Value::from(LEGACY_PROFILE_ID));
    }
    1
}

fn migrate_rule(rule: &mut Map<String, Value>) -> bool {
    let mut changed = false;

    for (legacy, current) in LEGACY_KEYS {
        if let Some(value) = rule.remove(*legacy) {
            if !rule.contains_key(*current) {
                rule.insert((*current).to_string(), value);
            }
            changed = true;
        }
    }

    // an embedded server object becomes a reference
    if let Some(proxy) = rule.remove("proxy") {
        if let Some(id) = proxy.get("id").and_then(Value::as_str) {
            rule.entry("proxyServerId").or_insert_with(|| Value::from(id));
        }
        changed = true;
    }

    if !rule.contains_key("ruleType") {
        let inferred = if rule.contains_key("rulePattern") {
            Some("MatchPatternHost")
        } else if rule.contains_key("ruleRegex") {
            Some("RegexHost")
        } else if rule.contains_key("ruleExact") {
            Some("Exact")
        } else if rule.contains_key("ruleSearch") {
            Some("DomainSubdomain")
        } else {
            None
        };
        if let Some(rule_type) = inferred {
            rule.insert("ruleType".into(), Value::from(rule_type));
            changed = true;
        }
    }

    changed
}
