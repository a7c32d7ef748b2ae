use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::PipelineError;

mod defaults;

pub use defaults::*;

/// Environment prefix for overrides, e.g. `LINK_PIPELINE__RESOLVER__CHUNK_SIZE=500`
pub const ENV_PREFIX: &str = "LINK_PIPELINE";

/// Complete configuration for one pipeline run.
///
/// Loaded once at start-up and handed to each stage by reference; no stage
/// mutates it.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    pub csv: CsvConfig,
    pub records: RecordColumns,
    pub extractor: ExtractorConfig,
    pub resolver: ResolverSettings,
    pub canonicalizer: CanonicalizerConfig,
    pub reports: ReportConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CsvConfig {
    /// Column separator. Accepts `,`, `;`, `|` and `\t` (literal backslash-t too).
    pub delimiter: String,
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            delimiter: ",".to_string(),
        }
    }
}

impl CsvConfig {
    pub fn delimiter_byte(&self) -> Result<u8> {
        parse_delimiter(&self.delimiter)
    }
}

/// Parses a user supplied separator into the single byte the csv crate wants
pub fn parse_delimiter(raw: &str) -> Result<u8> {
    match raw {
        "," => Ok(b','),
        ";" => Ok(b';'),
        "|" => Ok(b'|'),
        "\\t" | "\t" => Ok(b'\t'),
        other => Err(PipelineError::InvalidConfig(format!(
            "unsupported delimiter {other:?}, expected one of , ; | \\t"
        ))
        .into()),
    }
}

/// Names of the columns that make up a Record in the corpus
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecordColumns {
    pub id: String,
    pub text: String,
    pub timestamp: String,
    pub author: String,
    pub weight: String,
}

impl Default for RecordColumns {
    fn default() -> Self {
        Self {
            id: "tweet_id".to_string(),
            text: "text".to_string(),
            timestamp: "created_at".to_string(),
            author: "user_screen_name".to_string(),
            weight: "tweet_retweet_count".to_string(),
        }
    }
}

/// A link shortener whose links get re-matched against a strict shape
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ShortenerShape {
    pub host: String,
    /// Regex character class (or any regex fragment) for the path id
    pub id_pattern: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub shorteners: Vec<ShortenerShape>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            shorteners: default_shorteners(),
        }
    }
}

/// Serialized form of the resolver settings; turned into
/// [`crate::url_resolver::ResolverConfig`] at run time.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResolverSettings {
    pub max_redirect_depth: usize,
    pub chunk_size: usize,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            max_redirect_depth: 1,
            chunk_size: 10_000,
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
            user_agent: format!("link-pipeline/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ResolverSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Which family of indirection service a redirector rule describes
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RedirectorKind {
    Search,
    SocialShare,
    Affiliate,
}

/// An indirection service that carries its real target in a query parameter
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RedirectorRule {
    pub kind: RedirectorKind,
    /// Registrable domain the rule applies to, e.g. `google.com`
    pub root_domain: String,
    /// Exact paths the rule applies to; empty matches every path
    #[serde(default)]
    pub paths: Vec<String>,
    /// Parameters that may carry the target, tried in order
    pub params: Vec<String>,
}

/// A video site whose watch URLs collapse to `https://<canonical_host>/watch?v=<id>`
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct VideoHost {
    /// Registrable domains serving `?v=<id>` URLs
    pub domains: Vec<String>,
    /// Hosts whose single path segment is the video id
    #[serde(default)]
    pub short_link_hosts: Vec<String>,
    pub canonical_host: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CanonicalizerConfig {
    pub denied_query_params: Vec<String>,
    pub slash_exempt_domains: Vec<String>,
    pub video_hosts: Vec<VideoHost>,
    pub redirectors: Vec<RedirectorRule>,
    /// Public suffix list file to use instead of the embedded one
    pub public_suffix_list: Option<PathBuf>,
}

impl Default for CanonicalizerConfig {
    fn default() -> Self {
        Self {
            denied_query_params: default_denied_query_params(),
            slash_exempt_domains: default_slash_exempt_domains(),
            video_hosts: default_video_hosts(),
            redirectors: default_redirectors(),
            public_suffix_list: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Root domains treated as "internal" links and left out of reports
    pub excluded_root_domains: Vec<String>,
    pub archive_base: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            excluded_root_domains: vec!["twitter.com".to_string(), "x.com".to_string()],
            archive_base: "https://web.archive.org/web".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Loads defaults, then the optional TOML file, then `LINK_PIPELINE__*` env vars
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            debug!("Reading configuration file {}", path.display());
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to assemble configuration sources")?;

        let config: PipelineConfig = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        info!(
            "Configuration loaded: delimiter={:?}, max_redirect_depth={}, chunk_size={}",
            config.csv.delimiter, config.resolver.max_redirect_depth, config.resolver.chunk_size
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.csv.delimiter_byte()?;
        if self.resolver.max_redirect_depth == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_redirect_depth must be at least 1".to_string(),
            )
            .into());
        }
        if self.resolver.chunk_size == 0 {
            return Err(
                PipelineError::InvalidConfig("chunk_size must be at least 1".to_string()).into(),
            );
        }
        Ok(())
    }
}
