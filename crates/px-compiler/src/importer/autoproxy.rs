//! GFWList / AutoProxy rule lists.
//!
//! Every line is classified straight into the compiled-rule vocabulary so the
//! output feeds the same compiler and matcher as hand-written rules.

use px_core::types::CompiledRuleType;

use super::ImportedRuleList;
use crate::model::SubscriptionProxyRule;

/// Characters that turn a plain search term into a regex.
const SPECIAL_CHARS: &[char] = &['*', '^', '(', ')', '[', ']', '{', '}', '\\', '$', '+', '?'];

/// `scheme://` plus any number of subdomain labels.
const SCHEME_AND_SUBDOMAINS: &str = r"^[\w\-]+:\/+(?:[^\/]+\.)?";

/// `^` in AutoProxy syntax: a separator or the end of the URL.
const SEPARATOR: &str = r"(?:[^\w\-.%]|$)";

pub fn parse(text: &str) -> ImportedRuleList {
    let mut list = ImportedRuleList::default();

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() || is_comment_line(line) {
            continue;
        }

        let (body, white_list) = match line.strip_prefix("@@") {
            Some(rest) => (rest.trim_start(), true),
            None => (line, false),
        };
        if body.is_empty() {
            continue;
        }

        match convert_line(line, body) {
            Some(rule) if white_list => list.white_list.push(rule),
            Some(rule) => list.black_list.push(rule),
            None => log::debug!("skipping unsupported rule list line '{line}'"),
        }
    }

    list
}

fn is_comment_line(line: &str) -> bool {
    line.starts_with('!') || line.starts_with('[')
}

/// Classify one rule body (`@@` already removed). `name` is the source line.
fn convert_line(name: &str, body: &str) -> Option<SubscriptionProxyRule> {
    if body.len() > 1 && body.starts_with('/') && body.ends_with('/') {
        let regex = &body[1..body.len() - 1];
        return Some(SubscriptionProxyRule::regex(name, CompiledRuleType::RegexUrl, regex));
    }

    if let Some(domain) = body.strip_prefix("||") {
        let (domain, anchored_end) = match domain.strip_suffix('|') {
            Some(domain) => (domain, true),
            None => (domain, false),
        };
        if domain.is_empty() {
            return None;
        }
        if !anchored_end && !has_special(domain) && !domain.contains('/') {
            return Some(SubscriptionProxyRule::search(
                name,
                CompiledRuleType::SearchDomainSubdomain,
                domain.to_lowercase(),
            ));
        }
        let end = if anchored_end { "$" } else { "" };
        let regex = format!("{SCHEME_AND_SUBDOMAINS}{}{end}", wildcard_to_regex(domain));
        return Some(SubscriptionProxyRule::regex(name, CompiledRuleType::RegexUrl, regex));
    }

    if let Some(rest) = body.strip_prefix('|') {
        if let Some(exact) = rest.strip_suffix('|') {
            let regex = format!("^{}$", wildcard_to_regex(exact));
            return Some(SubscriptionProxyRule::regex(name, CompiledRuleType::RegexUrl, regex));
        }
        if rest.is_empty() {
            return None;
        }
        if !has_special(rest) {
            return Some(SubscriptionProxyRule::search(
                name,
                CompiledRuleType::SearchUrl,
                rest.to_lowercase(),
            ));
        }
        let regex = format!("^{}", wildcard_to_regex(rest));
        return Some(SubscriptionProxyRule::regex(name, CompiledRuleType::RegexUrl, regex));
    }

    if let Some(rest) = body.strip_suffix('|') {
        if rest.is_empty() {
            return None;
        }
        let regex = format!("{}$", wildcard_to_regex(rest));
        return Some(SubscriptionProxyRule::regex(name, CompiledRuleType::RegexUrl, regex));
    }

    if let Some(rest) = body.strip_prefix('.') {
        if rest.is_empty() {
            return None;
        }
        if !has_special(rest) {
            return Some(SubscriptionProxyRule::search(
                name,
                CompiledRuleType::SearchDomainSubdomainAndPath,
                rest.to_lowercase(),
            ));
        }
        let regex = format!(r"\.{}", wildcard_to_regex(rest));
        return Some(SubscriptionProxyRule::regex(name, CompiledRuleType::RegexUrl, regex));
    }

    if !has_special(body) {
        return Some(SubscriptionProxyRule::search(
            name,
            CompiledRuleType::SearchDomainAndPath,
            body.to_lowercase(),
        ));
    }
    Some(SubscriptionProxyRule::regex(
        name,
        CompiledRuleType::RegexUrl,
        wildcard_to_regex(body),
    ))
}

fn has_special(text: &str) -> bool {
    text.contains(SPECIAL_CHARS)
}

/// Escape literal text, expanding `*` and `^` wildcards.
fn wildcard_to_regex(text: &str) -> String {
    let lower = text.to_lowercase();
    let mut regex = String::with_capacity(lower.len() * 2);
    let mut buf = [0u8; 4];
    let mut prev_star = false;

    for c in lower.chars() {
        match c {
            '*' => {
                if !prev_star {
                    regex.push_str(".*");
                }
            }
            '^' => regex.push_str(SEPARATOR),
            _ => regex.push_str(&regex::escape(c.encode_utf8(&mut buf))),
        }
        prev_star = c == '*';
    }

    regex
}

#[cfg(test)]
mod tests {
    use super::*;

    fn only(list: &[SubscriptionProxyRule]) -> &SubscriptionProxyRule {
        assert_eq!(list.len(), 1, "expected one rule, got {list:?}");
        &list[0]
    }

    #[test]
    fn skips_comments_headers_and_blanks() {
        let list = parse("[AutoProxy 0.2.9]\n! Checksum: abc\n\n   \n||example.com\n");
        assert_eq!(list.black_list.len(), 1);
        assert!(list.white_list.is_empty());
    }

    #[test]
    fn host_anchor() {
        let list = parse("||blocked.com\n@@||allowed.com");
        let black = only(&list.black_list);
        assert_eq!(black.imported_rule_type, CompiledRuleType::SearchDomainSubdomain);
        assert_eq!(black.search.as_deref(), Some("blocked.com"));
        assert_eq!(black.name, "||blocked.com");

        let white = only(&list.white_list);
        assert_eq!(white.imported_rule_type, CompiledRuleType::SearchDomainSubdomain);
        assert_eq!(white.search.as_deref(), Some("allowed.com"));
    }

    #[test]
    fn host_anchor_escalates_to_regex() {
        let list = parse("||*.cdn.example.com\n||example.com/watch");
        let rule = &list.black_list[0];
        assert_eq!(rule.imported_rule_type, CompiledRuleType::RegexUrl);
        let re = regex::Regex::new(rule.regex.as_deref().expect("regex")).expect("valid regex");
        assert!(re.is_match("https://a.cdn.example.com/x"));
        assert!(!re.is_match("https://cdn.example.org/x"));

        let re = regex::Regex::new(list.black_list[1].regex.as_deref().expect("regex")).expect("valid regex");
        assert!(re.is_match("http://www.example.com/watch?v=1"));
        assert!(re.is_match("https://example.com/watch"));
        assert!(!re.is_match("https://example.com/other"));
    }

    #[test]
    fn host_anchor_with_end_anchor() {
        let list = parse("||example.com|\n||Example.org/Path|");
        let rule = &list.black_list[0];
        assert_eq!(rule.imported_rule_type, CompiledRuleType::RegexUrl);
        assert!(rule.search.is_none());
        let re = regex::Regex::new(rule.regex.as_deref().expect("regex")).expect("valid regex");
        assert!(re.is_match("https://example.com"));
        assert!(re.is_match("http://www.example.com"));
        assert!(!re.is_match("https://example.com/page"));
        assert!(!re.is_match("https://example.com.evil.test"));

        let re = regex::Regex::new(list.black_list[1].regex.as_deref().expect("regex")).expect("valid regex");
        assert!(re.is_match("https://cdn.example.org/path"));
        assert!(!re.is_match("https://example.org/path/more"));
    }

    #[test]
    fn raw_regex_line() {
        let list = parse(r"/^https?:\/\/x\.com/");
        let rule = only(&list.black_list);
        assert_eq!(rule.imported_rule_type, CompiledRuleType::RegexUrl);
        assert_eq!(rule.regex.as_deref(), Some(r"^https?:\/\/x\.com"));
        assert!(rule.search.is_none());
    }

    #[test]
    fn url_prefix_and_suffix_anchors() {
        let list = parse("|http://example.com/path\n|https://*.example.com\nexample.net/end|\n|http://exact.test/|");
        assert_eq!(list.black_list[0].imported_rule_type, CompiledRuleType::SearchUrl);
        assert_eq!(list.black_list[0].search.as_deref(), Some("http://example.com/path"));

        assert_eq!(list.black_list[1].imported_rule_type, CompiledRuleType::RegexUrl);
        assert_eq!(list.black_list[1].regex.as_deref(), Some(r"^https://.*\.example\.com"));

        assert_eq!(list.black_list[2].regex.as_deref(), Some(r"example\.net/end$"));
        assert_eq!(list.black_list[3].regex.as_deref(), Some(r"^http://exact\.test/$"));
    }

    #[test]
    fn dotted_and_bare_tokens() {
        let list = parse(".example.com\nexample.org/news\n*.tracker.test*");
        let dotted = &list.black_list[0];
        assert_eq!(dotted.imported_rule_type, CompiledRuleType::SearchDomainSubdomainAndPath);
        assert_eq!(dotted.search.as_deref(), Some("example.com"));

        let bare = &list.black_list[1];
        assert_eq!(bare.imported_rule_type, CompiledRuleType::SearchDomainAndPath);
        assert_eq!(bare.search.as_deref(), Some("example.org/news"));

        let wild = &list.black_list[2];
        assert_eq!(wild.imported_rule_type, CompiledRuleType::RegexUrl);
        assert_eq!(wild.regex.as_deref(), Some(r".*\.tracker\.test.*"));
    }

    #[test]
    fn separator_wildcard() {
        let list = parse("|http://sep.test^");
        let re = regex::Regex::new(list.black_list[0].regex.as_deref().expect("regex")).expect("valid regex");
        assert!(re.is_match("http://sep.test/"));
        assert!(re.is_match("http://sep.test"));
        assert!(!re.is_match("http://sep.testing/"));
    }

    #[test]
    fn lowercases_search_terms() {
        let list = parse("||Example.COM");
        assert_eq!(list.black_list[0].search.as_deref(), Some("example.com"));
    }
}
