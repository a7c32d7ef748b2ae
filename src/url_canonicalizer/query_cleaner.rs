use std::collections::HashSet;
use url::Url;

/// Strips tracking noise from a URL's query and normalizes its path.
pub struct QueryCleaner {
    denied: HashSet<String>,
    slash_exempt: HashSet<String>,
}

impl QueryCleaner {
    pub fn new(denied: &[String], slash_exempt: &[String]) -> Self {
        Self {
            denied: denied.iter().cloned().collect(),
            slash_exempt: slash_exempt
                .iter()
                .map(|d| d.to_ascii_lowercase())
                .collect(),
        }
    }

    fn keeps(&self, key: &str, value: &str) -> bool {
        if key.is_empty() || value.is_empty() {
            return false;
        }
        if self.denied.contains(key) {
            return false;
        }
        // page=1 is the implicit default
        !(key == "page" && value == "1")
    }

    /// Drops the fragment and every denied, blank or `page=1` parameter,
    /// re-encodes survivors in their original order, and appends a trailing
    /// slash to the path unless `root_domain` is exempt.
    pub fn clean(&self, url: &Url, root_domain: &str) -> String {
        if url.cannot_be_a_base() {
            return url.to_string();
        }

        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, value)| self.keeps(key, value))
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();

        let mut cleaned = url.clone();
        cleaned.set_fragment(None);
        cleaned.set_query(None);

        if !self.slash_exempt.contains(&root_domain.to_ascii_lowercase())
            && !cleaned.path().ends_with('/')
        {
            let path = format!("{}/", cleaned.path());
            cleaned.set_path(&path);
        }

        if !kept.is_empty() {
            cleaned.query_pairs_mut().extend_pairs(kept);
        }
        cleaned.to_string()
    }
}
