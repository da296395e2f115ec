//! Supported share-link providers and raw-URL recognition.

use std::fmt;
use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

static ILANZOU_SHARE_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?:www\.)?ilanzou\.com/s/([A-Za-z0-9_-]+)").unwrap()
});
static FEIJIPAN_SHARE_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?:www\.)?feijipan\.com/s/([A-Za-z0-9_-]+)").unwrap()
});
static WEIYUN_SHARE_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"share\.weiyun\.com/([A-Za-z0-9]+)").unwrap()
});

/// A cloud-storage service whose share links this crate can resolve.
///
/// `Ilanzou` and `Feijipan` are a template family: same wire protocol, same
/// share-URL shape, different hosts. The router's fallback chain exists for
/// exactly this case.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Provider {
    Ilanzou,
    Feijipan,
    Weiyun,
    /// A script-driven provider registered at runtime, identified by name.
    Custom(Arc<str>),
}

impl Provider {
    /// Stable lowercase identifier used in cache keys, config, and URLs.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Ilanzou => "ilanzou",
            Self::Feijipan => "feijipan",
            Self::Weiyun => "weiyun",
            Self::Custom(name) => name,
        }
    }

    /// Human-readable service name for log and error messages.
    #[must_use]
    pub fn display_name(&self) -> &str {
        match self {
            Self::Ilanzou => "iLanzou",
            Self::Feijipan => "Feijipan",
            Self::Weiyun => "Weiyun",
            Self::Custom(name) => name,
        }
    }

    /// Canonical share-URL prefix, used to rebuild a normalized URL from a
    /// bare share key.
    #[must_use]
    pub fn share_url_prefix(&self) -> &str {
        match self {
            Self::Ilanzou => "https://www.ilanzou.com/s/",
            Self::Feijipan => "https://www.feijipan.com/s/",
            Self::Weiyun => "https://share.weiyun.com/",
            Self::Custom(_) => "",
        }
    }

    /// Whether the provider keys its responses to the requesting client, so
    /// cache keys must be bound to the caller's user-agent.
    #[must_use]
    pub fn requires_client_binding(&self) -> bool {
        // None of the compiled providers bind to the client today; scripted
        // providers opt in via their registration name suffix.
        matches!(self, Self::Custom(name) if name.ends_with("+ua"))
    }

    /// Parses a provider id as used in config files and CLI arguments.
    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        match id.to_ascii_lowercase().as_str() {
            "ilanzou" => Some(Self::Ilanzou),
            "feijipan" => Some(Self::Feijipan),
            "weiyun" => Some(Self::Weiyun),
            "" => None,
            other => Some(Self::Custom(Arc::from(other))),
        }
    }

    /// Recognizes a raw share URL, returning the provider and extracted
    /// share key. Returns `None` for hosts no compiled provider claims.
    #[must_use]
    pub fn from_share_url(raw_url: &str) -> Option<(Self, String)> {
        // Reject clearly non-URL input early so regexes do not match inside
        // arbitrary text.
        Url::parse(raw_url).ok()?;
        if let Some(caps) = ILANZOU_SHARE_RE.captures(raw_url) {
            return Some((Self::Ilanzou, caps[1].to_string()));
        }
        if let Some(caps) = FEIJIPAN_SHARE_RE.captures(raw_url) {
            return Some((Self::Feijipan, caps[1].to_string()));
        }
        if let Some(caps) = WEIYUN_SHARE_RE.captures(raw_url) {
            return Some((Self::Weiyun, caps[1].to_string()));
        }
        None
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_share_url_extracts_provider_and_key() {
        let (provider, key) =
            Provider::from_share_url("https://www.ilanzou.com/s/aBc12-3").unwrap();
        assert_eq!(provider, Provider::Ilanzou);
        assert_eq!(key, "aBc12-3");

        let (provider, key) = Provider::from_share_url("https://share.weiyun.com/Xy9z").unwrap();
        assert_eq!(provider, Provider::Weiyun);
        assert_eq!(key, "Xy9z");
    }

    #[test]
    fn test_from_share_url_rejects_unknown_hosts() {
        assert!(Provider::from_share_url("https://example.com/s/abc").is_none());
        assert!(Provider::from_share_url("not a url").is_none());
    }

    #[test]
    fn test_from_id_round_trips_compiled_providers() {
        for provider in [Provider::Ilanzou, Provider::Feijipan, Provider::Weiyun] {
            assert_eq!(Provider::from_id(provider.id()), Some(provider.clone()));
        }
    }

    #[test]
    fn test_from_id_produces_custom_for_unknown_names() {
        let provider = Provider::from_id("mycloud").unwrap();
        assert_eq!(provider, Provider::Custom(Arc::from("mycloud")));
        assert!(Provider::from_id("").is_none());
    }

    #[test]
    fn test_client_binding_flag() {
        assert!(!Provider::Ilanzou.requires_client_binding());
        assert!(
            Provider::Custom(Arc::from("p115+ua")).requires_client_binding()
        );
    }
}
