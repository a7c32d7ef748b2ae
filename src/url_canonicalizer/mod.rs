//! Normalizes resolved URLs so equivalent links group together.
//!
//! A URL passes through four steps in a fixed order: redirector unwrapping,
//! the video-site canonical form, generic query/path cleaning, and finally
//! public-suffix decomposition of the cleaned result.

mod domain_parts;
mod query_cleaner;
mod site_rules;
mod unwrap;

pub use domain_parts::{DomainParts, SuffixList};
pub use query_cleaner::QueryCleaner;
pub use site_rules::video_canonical;
pub use unwrap::{unwrap_redirectors, Unwrapped};

use anyhow::{Context, Result};
use tracing::{debug, trace};
use url::Url;

use crate::config::CanonicalizerConfig;

/// Canonical form of one resolved URL
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanonicalUrl {
    pub clean_expanded_url: String,
    pub root_domain: String,
    pub sub_domain: String,
    pub suffix: String,
}

impl CanonicalUrl {
    fn from_clean(clean_expanded_url: String, parts: DomainParts) -> Self {
        Self {
            clean_expanded_url,
            root_domain: parts.root_domain,
            sub_domain: parts.sub_domain,
            suffix: parts.suffix,
        }
    }
}

pub struct Canonicalizer {
    config: CanonicalizerConfig,
    cleaner: QueryCleaner,
    suffixes: SuffixList,
}

impl Canonicalizer {
    pub fn new(config: &CanonicalizerConfig) -> Result<Self> {
        let suffixes = SuffixList::load(config.public_suffix_list.as_deref())
            .context("Failed to load public suffix list")?;
        Ok(Self::with_suffixes(config, suffixes))
    }

    pub fn with_suffixes(config: &CanonicalizerConfig, suffixes: SuffixList) -> Self {
        Self {
            cleaner: QueryCleaner::new(&config.denied_query_params, &config.slash_exempt_domains),
            config: config.clone(),
            suffixes,
        }
    }

    pub fn suffixes(&self) -> &SuffixList {
        &self.suffixes
    }

    /// Canonicalizes one expanded URL.
    ///
    /// Empty or unparseable input yields an all-empty [`CanonicalUrl`]; this is
    /// what an unresolved row carries.
    pub fn canonicalize(&self, expanded_url: &str) -> CanonicalUrl {
        let raw = expanded_url.trim();
        if raw.is_empty() {
            return CanonicalUrl::default();
        }
        let url = match Url::parse(raw) {
            Ok(url) => url,
            Err(e) => {
                debug!("Skipping unparseable expanded URL {:?}: {}", raw, e);
                return CanonicalUrl::default();
            }
        };

        let parts = self.suffixes.split_url(&url);
        let (url, parts) =
            match unwrap_redirectors(&url, &parts, &self.config.redirectors, &self.suffixes) {
                Some(unwrapped) => (unwrapped.url, unwrapped.parts),
                None => (url, parts),
            };

        let clean = match video_canonical(&url, &parts, &self.config.video_hosts) {
            Some(watch) => watch,
            None => self.cleaner.clean(&url, &parts.root_domain),
        };
        trace!("Canonicalized {} -> {}", raw, clean);

        // Decompose what we emit, so a second pass sees the same parts
        let parts = self.suffixes.split_url_str(&clean);
        CanonicalUrl::from_clean(clean, parts)
    }
}
