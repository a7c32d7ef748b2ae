use once_cell::sync::Lazy;
use regex::Regex;

/// Permissive link grammar: scheme, dotted host, then path/query/fragment
/// characters from a safe set. The final character may not be `.`, `,` or `:`
/// so sentence punctuation after a link is left behind.
///
/// Capture 1 is the whole link, capture 2 the host.
pub static URL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?s)((?:https?|ftp)://([\w_-]+(?:\.[\w_-]+)+)([\w.,@?^=%&:/~+#-]*[\w@?^=%&/~+#-]))",
    )
    .unwrap()
});

/// Builds the strict pattern for one link shortener: `^(https?://<host>/<id>)`.
/// Scheme and host compare case-insensitively, the id shape does not.
pub fn shortener_regex(host: &str, id_pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        r"^((?i:https?://{})/{})",
        regex::escape(host),
        id_pattern
    ))
}
