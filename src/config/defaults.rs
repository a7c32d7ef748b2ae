use super::{RedirectorKind, RedirectorRule, ShortenerShape, VideoHost};

// Tracking parameters stripped from cleaned URLs
const DENIED_QUERY_PARAMS: &[&str] = &[
    // campaign tagging
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "utm_id",
    "utm_name",
    "_utm_source",
    "_utm_medium",
    "_utm_campaign",
    "_utm_term",
    "_utm_content",
    // click ids / affiliate
    "fbclid",
    "gclid",
    "dclid",
    "msclkid",
    "yclid",
    "twclid",
    "igshid",
    "mc_cid",
    "mc_eid",
    "ref",
    "ref_src",
    "ref_url",
    "affiliate_id",
    // locale / device / source
    "hl",
    "locale",
    "device",
    "source",
    "src",
];

pub fn default_denied_query_params() -> Vec<String> {
    DENIED_QUERY_PARAMS.iter().map(|p| p.to_string()).collect()
}

pub fn default_slash_exempt_domains() -> Vec<String> {
    ["amazon.com", "amazon.co.jp", "tiktok.com"]
        .iter()
        .map(|d| d.to_string())
        .collect()
}

pub fn default_shorteners() -> Vec<ShortenerShape> {
    vec![
        ShortenerShape {
            host: "t.co".to_string(),
            id_pattern: "[a-zA-Z0-9]+".to_string(),
        },
        ShortenerShape {
            host: "bit.ly".to_string(),
            id_pattern: "[a-zA-Z0-9_-]+".to_string(),
        },
    ]
}

pub fn default_video_hosts() -> Vec<VideoHost> {
    vec![VideoHost {
        domains: vec!["youtube.com".to_string()],
        short_link_hosts: vec!["youtu.be".to_string()],
        canonical_host: "youtube.com".to_string(),
    }]
}

pub fn default_redirectors() -> Vec<RedirectorRule> {
    vec![
        RedirectorRule {
            kind: RedirectorKind::Search,
            root_domain: "google.com".to_string(),
            paths: vec!["/url".to_string(), "/news/url".to_string()],
            params: vec!["url".to_string(), "q".to_string()],
        },
        RedirectorRule {
            kind: RedirectorKind::SocialShare,
            root_domain: "facebook.com".to_string(),
            paths: vec!["/l.php".to_string()],
            params: vec!["u".to_string()],
        },
        RedirectorRule {
            kind: RedirectorKind::Affiliate,
            root_domain: "redirectingat.com".to_string(),
            paths: Vec::new(),
            params: vec!["url".to_string()],
        },
        RedirectorRule {
            kind: RedirectorKind::Affiliate,
            root_domain: "linksynergy.com".to_string(),
            paths: Vec::new(),
            params: vec!["murl".to_string()],
        },
    ]
}
