use tracing::debug;
use url::Url;

use super::domain_parts::{DomainParts, SuffixList};
use crate::config::{RedirectorKind, RedirectorRule};

/// A URL taken out of an indirection service's query parameter
#[derive(Debug, Clone)]
pub struct Unwrapped {
    pub url: Url,
    pub parts: DomainParts,
    pub kind: RedirectorKind,
}

fn rule_matches(rule: &RedirectorRule, url: &Url, parts: &DomainParts) -> bool {
    rule.root_domain.eq_ignore_ascii_case(&parts.root_domain)
        && (rule.paths.is_empty() || rule.paths.iter().any(|p| p == url.path()))
}

/// First absolute http(s) target carried by one of the rule's parameters.
/// Query values come back percent-decoded.
fn carried_target(rule: &RedirectorRule, url: &Url) -> Option<Url> {
    rule.params.iter().find_map(|param| {
        url.query_pairs()
            .filter(|(key, value)| key == param.as_str() && !value.is_empty())
            .find_map(|(_, value)| {
                Url::parse(value.trim())
                    .ok()
                    .filter(|target| matches!(target.scheme(), "http" | "https"))
                    .filter(|target| target.host_str().is_some())
            })
    })
}

/// Applies the first matching rule among `rules` accepted by `allow`
fn unwrap_once<F>(
    url: &Url,
    parts: &DomainParts,
    rules: &[RedirectorRule],
    suffixes: &SuffixList,
    allow: F,
) -> Option<Unwrapped>
where
    F: Fn(RedirectorKind) -> bool,
{
    rules
        .iter()
        .filter(|rule| allow(rule.kind))
        .filter(|rule| rule_matches(rule, url, parts))
        .find_map(|rule| {
            let target = carried_target(rule, url)?;
            debug!("Unwrapped {:?} redirector {} -> {}", rule.kind, url, target);
            let parts = suffixes.split_url(&target);
            Some(Unwrapped {
                url: target,
                parts,
                kind: rule.kind,
            })
        })
}

/// Replaces a redirector URL with the target it carries.
///
/// Single pass, except that whatever the first rule unwraps to is checked once
/// more against the affiliate rules. Returns `None` when nothing was unwrapped.
pub fn unwrap_redirectors(
    url: &Url,
    parts: &DomainParts,
    rules: &[RedirectorRule],
    suffixes: &SuffixList,
) -> Option<Unwrapped> {
    let first = unwrap_once(url, parts, rules, suffixes, |_| true)?;
    match unwrap_once(&first.url, &first.parts, rules, suffixes, |kind| {
        kind == RedirectorKind::Affiliate
    }) {
        Some(second) => Some(second),
        None => Some(first),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_redirectors;

    fn run(raw: &str) -> Option<String> {
        let suffixes = SuffixList::embedded().unwrap();
        let url = Url::parse(raw).unwrap();
        let parts = suffixes.split_url(&url);
        unwrap_redirectors(&url, &parts, &default_redirectors(), &suffixes)
            .map(|u| u.url.to_string())
    }

    #[test]
    fn test_google_outbound_link() {
        assert_eq!(
            run("https://www.google.com/url?sa=t&url=https%3A%2F%2Fexample.com%2Fstory%3Fid%3D4&usg=x"),
            Some("https://example.com/story?id=4".to_string())
        );
        assert_eq!(
            run("https://news.google.com/news/url?url=https://example.org/a"),
            Some("https://example.org/a".to_string())
        );
    }

    #[test]
    fn test_google_other_paths_untouched() {
        assert_eq!(run("https://www.google.com/search?url=https://example.com/"), None);
    }

    #[test]
    fn test_missing_or_bad_param_untouched() {
        assert_eq!(run("https://www.google.com/url?sa=t"), None);
        assert_eq!(run("https://www.google.com/url?url=javascript:alert(1)"), None);
    }

    #[test]
    fn test_social_share_feeds_affiliate_check() {
        let inner = "https://go.redirectingat.com/?id=1&url=https%3A%2F%2Fshop.example.com%2Fitem";
        let outer = format!(
            "https://l.facebook.com/l.php?u={}&h=abc",
            urlencoding::encode(inner)
        );
        assert_eq!(run(&outer), Some("https://shop.example.com/item".to_string()));
    }

    #[test]
    fn test_search_feeds_affiliate_check() {
        let inner = "https://go.redirectingat.com/?id=1&url=https%3A%2F%2Fshop.example.com%2Fitem";
        let outer = format!("https://www.google.com/url?url={}", urlencoding::encode(inner));
        assert_eq!(run(&outer), Some("https://shop.example.com/item".to_string()));
    }

    #[test]
    fn test_single_pass_otherwise() {
        // A search redirector pointing at another search redirector is unwrapped once
        let inner = "https://www.google.com/url?url=https://example.com/deep";
        let outer = format!("https://www.google.com/url?url={}", urlencoding::encode(inner));
        assert_eq!(run(&outer), Some(inner.to_string()));
    }
}
