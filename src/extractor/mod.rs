//! Finds links embedded in free-form text.

pub mod patterns;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::trace;

use crate::config::{ExtractorConfig, ShortenerShape};
use patterns::{shortener_regex, URL_REGEX};

struct Shortener {
    host: String,
    strict: Regex,
}

/// Extracts candidate URLs from text.
///
/// Holds only compiled patterns, so one extractor can be shared across every
/// record of a corpus.
pub struct UrlExtractor {
    shorteners: Vec<Shortener>,
}

impl UrlExtractor {
    pub fn new(config: &ExtractorConfig) -> Result<Self> {
        Self::with_shorteners(&config.shorteners)
    }

    pub fn with_shorteners(shapes: &[ShortenerShape]) -> Result<Self> {
        let shorteners = shapes
            .iter()
            .map(|shape| {
                let strict = shortener_regex(&shape.host, &shape.id_pattern).with_context(|| {
                    format!("Invalid id pattern for link shortener {}", shape.host)
                })?;
                Ok(Shortener {
                    host: shape.host.to_ascii_lowercase(),
                    strict,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { shorteners })
    }

    /// Every link in `text`, in order of first appearance, duplicates kept
    pub fn extract<'a>(&'a self, text: &'a str) -> impl Iterator<Item = String> + 'a {
        URL_REGEX.captures_iter(text).filter_map(move |caps| {
            let full = caps.get(1)?.as_str();
            let host = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            Some(self.trim_shortener(full, host))
        })
    }

    /// Convenience wrapper collecting [`Self::extract`]
    pub fn extract_all(&self, text: &str) -> Vec<String> {
        self.extract(text).collect()
    }

    // Shortener links get cut back to their exact path shape so punctuation
    // glued onto them in the source text is dropped.
    fn trim_shortener(&self, matched: &str, host: &str) -> String {
        let shortener = self
            .shorteners
            .iter()
            .find(|s| s.host.eq_ignore_ascii_case(host));
        if let Some(shortener) = shortener {
            if let Some(strict) = shortener.strict.captures(matched).and_then(|c| c.get(1)) {
                trace!("Trimmed shortener link {} -> {}", matched, strict.as_str());
                return strict.as_str().to_string();
            }
        }
        matched.to_string()
    }
}

impl Default for UrlExtractor {
    fn default() -> Self {
        // The default shapes are fixed and known to compile
        Self::new(&ExtractorConfig::default()).unwrap_or(Self {
            shorteners: Vec::new(),
        })
    }
}
