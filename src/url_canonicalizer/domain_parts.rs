use anyhow::{anyhow, Context, Result};
use publicsuffix::{List, Psl};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use url::{Host, Url};

const EMBEDDED_LIST: &str = include_str!("../../data/public_suffix_list.dat");

/// A URL host split along public-suffix boundaries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainParts {
    /// Registrable domain including its suffix, e.g. `example.co.uk`
    pub root_domain: String,
    /// Labels left of the registrable domain; a lone `www` becomes empty
    pub sub_domain: String,
    /// Public suffix alone, e.g. `co.uk`
    pub suffix: String,
}

impl DomainParts {
    /// Registrable domain without its suffix, e.g. `example`
    pub fn domain_label(&self) -> &str {
        if self.suffix.is_empty() {
            return &self.root_domain;
        }
        self.root_domain
            .strip_suffix(self.suffix.as_str())
            .and_then(|rest| rest.strip_suffix('.'))
            .unwrap_or(&self.root_domain)
    }
}

/// Public suffix list used to split hosts.
///
/// Cheap to clone; the parsed list is shared.
#[derive(Clone)]
pub struct SuffixList {
    list: Arc<List>,
}

impl std::fmt::Debug for SuffixList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuffixList").finish_non_exhaustive()
    }
}

impl SuffixList {
    /// The full publicsuffix.org list compiled into the binary
    pub fn embedded() -> Result<Self> {
        Self::parse(EMBEDDED_LIST)
    }

    /// A full list read from disk, in the publicsuffix.org `.dat` format
    pub fn from_file(path: &Path) -> Result<Self> {
        info!("Loading public suffix list from {}", path.display());
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read public suffix list {}", path.display()))?;
        Self::parse(&raw)
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::embedded(),
        }
    }

    fn parse(raw: &str) -> Result<Self> {
        let list: List = raw
            .parse()
            .map_err(|e| anyhow!("Failed to parse public suffix list: {:?}", e))?;
        Ok(Self {
            list: Arc::new(list),
        })
    }

    /// Splits a bare host name. IP addresses are their own root domain.
    pub fn split_host(&self, host: &str) -> DomainParts {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        if host.is_empty() {
            return DomainParts::default();
        }
        if host.starts_with('[') || host.parse::<IpAddr>().is_ok() {
            return DomainParts {
                root_domain: host,
                ..DomainParts::default()
            };
        }

        match self.list.domain(host.as_bytes()) {
            Some(domain) => {
                let root_domain = String::from_utf8_lossy(domain.as_bytes()).to_string();
                let suffix = String::from_utf8_lossy(domain.suffix().as_bytes()).to_string();
                let sub_domain = host
                    .strip_suffix(root_domain.as_str())
                    .and_then(|rest| rest.strip_suffix('.'))
                    .filter(|sub| *sub != "www")
                    .unwrap_or_default()
                    .to_string();
                DomainParts {
                    root_domain,
                    sub_domain,
                    suffix,
                }
            }
            None => {
                // The host is itself a public suffix (or a bare label)
                debug!("No registrable domain for host {}", host);
                let suffix = self
                    .list
                    .suffix(host.as_bytes())
                    .map(|s| String::from_utf8_lossy(s.as_bytes()).to_string())
                    .unwrap_or_default();
                DomainParts {
                    suffix,
                    ..DomainParts::default()
                }
            }
        }
    }

    /// Splits the host of a parsed URL
    pub fn split_url(&self, url: &Url) -> DomainParts {
        match url.host() {
            Some(Host::Domain(domain)) => self.split_host(domain),
            Some(Host::Ipv4(addr)) => DomainParts {
                root_domain: addr.to_string(),
                ..DomainParts::default()
            },
            Some(Host::Ipv6(addr)) => DomainParts {
                root_domain: format!("[{}]", addr),
                ..DomainParts::default()
            },
            None => DomainParts::default(),
        }
    }

    /// Splits the host of a URL string; unparseable input yields empty parts
    pub fn split_url_str(&self, raw: &str) -> DomainParts {
        Url::parse(raw.trim())
            .map(|url| self.split_url(&url))
            .unwrap_or_default()
    }
}
