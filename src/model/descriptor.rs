//! Share descriptors: one normalized resolution request plus its extras bag.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tracing::warn;

use super::Provider;

/// Well-known keys in the [`Extras`] bag. Adapters and callers agree on
/// these names; anything else is provider-private.
pub mod extras_keys {
    /// Input: folder id to resume a directory listing into.
    pub const DIR_ID: &str = "dirId";
    /// Input: per-resolution correlation nonce to reuse (deferred listings).
    pub const UUID: &str = "uuid";
    /// Input: credentials object `{"username": .., "password": ..}`.
    pub const AUTHS: &str = "auths";
    /// Input: marker that [`AUTHS`] was supplied by the caller for this
    /// request only and must never touch the shared breaker.
    pub const EPHEMERAL_AUTH: &str = "ephemeralAuth";
    /// Input: proxy URL override for this resolution.
    pub const PROXY: &str = "proxy";
    /// Input: caller-visible base domain for deferred resolution URLs.
    pub const DOMAIN_NAME: &str = "domainName";
    /// Input: caller user-agent, folded into the cache key when the
    /// provider requires client binding.
    pub const USER_AGENT: &str = "UA";
    /// Input: serialized parameters for a deferred per-file resolution.
    pub const PARAM_JSON: &str = "paramJson";
    /// Output: metadata of the resolved file.
    pub const FILE_INFO: &str = "fileInfo";
    /// Output: the computed direct download URL.
    pub const DOWNLOAD_URL: &str = "downloadUrl";
    /// Output: headers the caller must replay when fetching the URL.
    pub const DOWNLOAD_HEADERS: &str = "downloadHeaders";
}

/// Open key/value side channel between the engine and one adapter.
///
/// Writes are first-wins: once a key holds a value, later writes of a
/// different value are dropped with a warning. Cloning shares the underlying
/// map, so a descriptor clone observes the same bag.
#[derive(Debug, Clone, Default)]
pub struct Extras(Arc<DashMap<String, Value>>);

impl Extras {
    /// Stores `value` under `key` unless the key is already set.
    pub fn set(&self, key: &str, value: Value) {
        match self.0.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(value);
            }
            dashmap::mapref::entry::Entry::Occupied(existing) => {
                if *existing.get() != value {
                    warn!(key, "extras key already written; dropping conflicting value");
                }
            }
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.get(key).map(|entry| entry.value().clone())
    }

    /// Convenience accessor for string-typed values.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get(key)
            .and_then(|value| value.as_str().map(ToString::to_string))
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }
}

/// One normalized share-link resolution request.
///
/// Created once per inbound request, passed by shared reference through the
/// whole resolution, and discarded afterwards; never reused across requests.
#[derive(Debug, Clone)]
pub struct ShareDescriptor {
    share_key: String,
    provider: Option<Provider>,
    password: String,
    raw_url: String,
    normalized_url: String,
    extras: Extras,
}

impl ShareDescriptor {
    #[must_use]
    pub fn builder() -> ShareDescriptorBuilder {
        ShareDescriptorBuilder::default()
    }

    #[must_use]
    pub fn share_key(&self) -> &str {
        &self.share_key
    }

    #[must_use]
    pub fn provider(&self) -> Option<&Provider> {
        self.provider.as_ref()
    }

    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }

    #[must_use]
    pub fn raw_url(&self) -> &str {
        &self.raw_url
    }

    #[must_use]
    pub fn normalized_url(&self) -> &str {
        &self.normalized_url
    }

    #[must_use]
    pub fn extras(&self) -> &Extras {
        &self.extras
    }

    /// Returns a copy of this descriptor pinned to a concrete provider,
    /// sharing the same extras bag. The router uses this after inferring the
    /// provider from the raw URL, and again when advancing the fallback
    /// chain to a sibling.
    #[must_use]
    pub fn with_provider(&self, provider: Provider) -> Self {
        let normalized_url = if self.share_key.is_empty() {
            self.normalized_url.clone()
        } else {
            format!("{}{}", provider.share_url_prefix(), self.share_key)
        };
        Self {
            share_key: self.share_key.clone(),
            provider: Some(provider),
            password: self.password.clone(),
            raw_url: self.raw_url.clone(),
            normalized_url,
            extras: self.extras.clone(),
        }
    }

    /// Stable deduplication key for upstream caching layers:
    /// `provider:share_key`, with a user-agent hash suffix for providers
    /// that bind responses to the client. The engine itself never
    /// deduplicates; it only guarantees this key is deterministic.
    #[must_use]
    pub fn cache_key(&self) -> String {
        let provider_id = self.provider.as_ref().map_or("unknown", Provider::id);
        let mut key = format!("{provider_id}:{}", self.share_key);
        if self
            .provider
            .as_ref()
            .is_some_and(Provider::requires_client_binding)
        {
            let ua = self
                .extras
                .get_str(extras_keys::USER_AGENT)
                .unwrap_or_default();
            let mut hasher = DefaultHasher::new();
            ua.hash(&mut hasher);
            key.push('_');
            key.push_str(&format!("{:016x}", hasher.finish()));
        }
        key
    }

    /// Provider-and-share context prefix for error and log messages, so
    /// every failure names which share on which service it belongs to.
    #[must_use]
    pub fn base_msg(&self) -> String {
        let provider_id = self.provider.as_ref().map_or("unknown", Provider::id);
        if self.raw_url.is_empty() {
            format!("{provider_id}: key={}", self.share_key)
        } else {
            format!("{provider_id}: url={}", self.raw_url)
        }
    }
}

/// Builder for [`ShareDescriptor`], mirroring how callers hand over either a
/// raw URL or `(provider, key, password)` parts.
#[derive(Debug, Default)]
pub struct ShareDescriptorBuilder {
    share_key: String,
    provider: Option<Provider>,
    password: String,
    raw_url: String,
    normalized_url: Option<String>,
    extras: Extras,
}

impl ShareDescriptorBuilder {
    #[must_use]
    pub fn share_key(mut self, share_key: impl Into<String>) -> Self {
        self.share_key = share_key.into();
        self
    }

    #[must_use]
    pub fn provider(mut self, provider: Provider) -> Self {
        self.provider = Some(provider);
        self
    }

    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    #[must_use]
    pub fn raw_url(mut self, raw_url: impl Into<String>) -> Self {
        self.raw_url = raw_url.into();
        self
    }

    #[must_use]
    pub fn normalized_url(mut self, normalized_url: impl Into<String>) -> Self {
        self.normalized_url = Some(normalized_url.into());
        self
    }

    #[must_use]
    pub fn extra(self, key: &str, value: Value) -> Self {
        self.extras.set(key, value);
        self
    }

    #[must_use]
    pub fn build(self) -> ShareDescriptor {
        let normalized_url = self.normalized_url.unwrap_or_else(|| {
            match (&self.provider, self.share_key.is_empty()) {
                (Some(provider), false) => {
                    format!("{}{}", provider.share_url_prefix(), self.share_key)
                }
                _ => self.raw_url.clone(),
            }
        });
        ShareDescriptor {
            share_key: self.share_key,
            provider: self.provider,
            password: self.password,
            raw_url: self.raw_url,
            normalized_url,
            extras: self.extras,
        }
    }
}
