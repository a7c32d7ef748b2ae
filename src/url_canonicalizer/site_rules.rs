use url::Url;

use super::domain_parts::DomainParts;
use crate::config::VideoHost;

fn watch_url(host: &VideoHost, id: &str) -> String {
    format!(
        "https://{}/watch?v={}",
        host.canonical_host,
        urlencoding::encode(id)
    )
}

fn serves_watch_pages(host: &VideoHost, url: &Url, parts: &DomainParts) -> bool {
    host.domains
        .iter()
        .any(|d| d.eq_ignore_ascii_case(&parts.root_domain))
        || url
            .host_str()
            .is_some_and(|h| h.eq_ignore_ascii_case(&host.canonical_host))
}

fn is_short_link_host(host: &VideoHost, url: &Url, parts: &DomainParts) -> bool {
    host.short_link_hosts.iter().any(|short| {
        url.host_str().is_some_and(|h| h.eq_ignore_ascii_case(short))
            || short.eq_ignore_ascii_case(&parts.root_domain)
    })
}

/// Canonical watch URL for a known video site, if `url` names a video.
///
/// `?v=<id>` on a watch domain or a single path segment on a short-link host
/// both collapse to `https://<canonical_host>/watch?v=<id>`; every other part
/// of the URL is discarded.
pub fn video_canonical(url: &Url, parts: &DomainParts, hosts: &[VideoHost]) -> Option<String> {
    for host in hosts {
        if serves_watch_pages(host, url, parts) {
            let id = url
                .query_pairs()
                .find(|(key, value)| key == "v" && !value.is_empty())
                .map(|(_, value)| value.into_owned());
            if let Some(id) = id {
                return Some(watch_url(host, &id));
            }
        }
        if is_short_link_host(host, url, parts) {
            let segments: Vec<&str> = url
                .path_segments()
                .map(|s| s.filter(|seg| !seg.is_empty()).collect())
                .unwrap_or_default();
            if let [id] = segments.as_slice() {
                let id = urlencoding::decode(id)
                    .map(|decoded| decoded.into_owned())
                    .unwrap_or_else(|_| id.to_string());
                return Some(watch_url(host, &id));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_video_hosts;
    use crate::url_canonicalizer::domain_parts::SuffixList;

    fn run(raw: &str, hosts: &[VideoHost]) -> Option<String> {
        let suffixes = SuffixList::embedded().unwrap();
        let url = Url::parse(raw).unwrap();
        let parts = suffixes.split_url(&url);
        video_canonical(&url, &parts, hosts)
    }

    #[test]
    fn test_watch_page() {
        let hosts = default_video_hosts();
        assert_eq!(
            run("https://www.youtube.com/watch?feature=share&v=dQw4w9WgXcQ&t=42", &hosts),
            Some("https://youtube.com/watch?v=dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            run("https://m.youtube.com/watch?v=abc", &hosts),
            Some("https://youtube.com/watch?v=abc".to_string())
        );
    }

    #[test]
    fn test_short_link() {
        let hosts = default_video_hosts();
        assert_eq!(
            run("https://youtu.be/dQw4w9WgXcQ?si=xyz", &hosts),
            Some("https://youtube.com/watch?v=dQw4w9WgXcQ".to_string())
        );
        // Bare host or nested path is not a video id
        assert_eq!(run("https://youtu.be/", &hosts), None);
        assert_eq!(run("https://youtu.be/a/b", &hosts), None);
    }

    #[test]
    fn test_non_video_pages_untouched() {
        let hosts = default_video_hosts();
        assert_eq!(run("https://www.youtube.com/channel/UC123", &hosts), None);
        assert_eq!(run("https://example.com/watch?v=abc", &hosts), None);
    }

    #[test]
    fn test_configured_host() {
        let hosts = vec![VideoHost {
            domains: vec!["video.example".to_string()],
            short_link_hosts: Vec::new(),
            canonical_host: "video.example".to_string(),
        }];
        assert_eq!(
            run("https://video.example/watch?v=XYZ&t=30", &hosts),
            Some("https://video.example/watch?v=XYZ".to_string())
        );
    }
}
