// URL normalization for crawl deduplication and payload injection

use serde::Serialize;
use std::fmt;
use url::Url;

/// Absolute http(s) URL with the fragment stripped.
///
/// Equality, ordering and hashing all go through the serialized form, so two
/// inputs that normalize to the same string are the same page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NormalizedUrl(Url);

impl NormalizedUrl {
    /// Parse and normalize an absolute URL.
    pub fn parse(raw: &str) -> Option<Self> {
        normalize(raw, None)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn as_url(&self) -> &Url {
        &self.0
    }

    /// Lowercased host without port.
    pub fn domain(&self) -> Option<String> {
        self.0.host_str().map(|h| h.to_ascii_lowercase())
    }

    /// Names of query parameters in order of first appearance.
    pub fn query_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = Vec::new();
        for (name, _) in self.0.query_pairs() {
            if !name.is_empty() && !keys.iter().any(|k| k == name.as_ref()) {
                keys.push(name.into_owned());
            }
        }
        keys
    }

    /// First value bound to `name` in the query string.
    pub fn query_value(&self, name: &str) -> Option<String> {
        self.0
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    /// Copy of this URL where `name` is bound to `value` only.
    ///
    /// The parameter keeps the position of its first occurrence; every other
    /// pair keeps its original value and order.
    pub fn with_query_value(&self, name: &str, value: &str) -> String {
        self.with_query_pairs(&[(name.to_string(), value.to_string())])
    }

    /// Copy of this URL with each given pair replacing any existing binding of the
    /// same name. Names not already present are appended.
    pub fn with_query_pairs(&self, overrides: &[(String, String)]) -> String {
        let mut pairs: Vec<(String, String)> = Vec::new();
        for (k, v) in self.0.query_pairs() {
            match overrides.iter().find(|(name, _)| name.as_str() == k.as_ref()) {
                Some((name, value)) => {
                    if !pairs.iter().any(|(existing, _)| existing == name) {
                        pairs.push((name.clone(), value.clone()));
                    }
                }
                None => pairs.push((k.into_owned(), v.into_owned())),
            }
        }
        for (name, value) in overrides {
            if !pairs.iter().any(|(existing, _)| existing == name) {
                pairs.push((name.clone(), value.clone()));
            }
        }

        let mut url = self.0.clone();
        if pairs.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(pairs.iter());
        }
        url.into()
    }
}

impl fmt::Display for NormalizedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// Resolve `raw` against `base` (when given) and normalize it.
///
/// Returns `None` for empty input, unparsable references and any scheme other
/// than http/https (mailto:, tel:, javascript:, data:, ...).
pub fn normalize(raw: &str, base: Option<&NormalizedUrl>) -> Option<NormalizedUrl> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let mut url = match base {
        Some(base) => base.0.join(raw).ok()?,
        None => Url::parse(raw).ok()?,
    };

    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return None;
    }

    url.set_fragment(None);
    if url.query() == Some("") {
        url.set_query(None);
    }

    Some(NormalizedUrl(url))
}
