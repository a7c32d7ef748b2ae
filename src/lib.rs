//! Link pipeline: extract URLs from a text corpus, resolve their redirects,
//! canonicalize them and report on where they point.

pub mod categorize;
pub mod config;
pub mod error;
pub mod extractor;
pub mod forum;
pub mod pipeline;
pub mod table;
pub mod url_canonicalizer;
pub mod url_resolver;
pub mod utils;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use extractor::UrlExtractor;
pub use url_canonicalizer::{CanonicalUrl, Canonicalizer};
pub use url_resolver::{RedirectResolver, ResolveOutcome, ResolverConfig};
