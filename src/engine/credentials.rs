//! Process-wide, provider-keyed credential cache with a hard-failure breaker.
//!
//! One entry per provider, shared by every concurrent resolution for that
//! provider. The per-entry async mutex is the concurrency discipline: an
//! adapter holds it across its verify-then-reauthenticate sequence, so two
//! racing first-time authentications produce exactly one login call and a
//! later writer can never clobber an earlier success.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::info;

use crate::model::Provider;

/// Cached authentication state for one provider.
#[derive(Debug, Default)]
pub struct CredentialEntry {
    /// Exchanged auth token; `None` means not yet authenticated.
    pub token: Option<String>,
    /// True after a hard shared-credential rejection: stop attempting
    /// authenticated mode and degrade to anonymous until an explicit reset.
    pub breaker_open: bool,
}

/// Injectable cache shared across adapters and resolutions.
///
/// Deliberately not global state: construct once, hand an `Arc` to every
/// adapter, and tests get an isolated instance each.
#[derive(Debug, Default)]
pub struct CredentialCache {
    entries: DashMap<Provider, Arc<Mutex<CredentialEntry>>>,
}

impl CredentialCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entry for `provider`, creating it lazily on first use.
    #[must_use]
    pub fn entry(&self, provider: &Provider) -> Arc<Mutex<CredentialEntry>> {
        self.entries
            .entry(provider.clone())
            .or_default()
            .value()
            .clone()
    }

    /// Administrative reset: clears the token and closes the breaker so the
    /// next resolution attempts authentication again. Never called
    /// automatically; a provider that revoked credentials must not be
    /// hammered by background re-auth.
    pub async fn reset(&self, provider: &Provider) {
        let entry = self.entry(provider);
        let mut guard = entry.lock().await;
        guard.token = None;
        guard.breaker_open = false;
        info!(provider = %provider, "credential cache reset; authentication re-enabled");
    }

    /// Snapshot of the breaker without holding the entry lock across awaits.
    pub async fn breaker_open(&self, provider: &Provider) -> bool {
        self.entry(provider).lock().await.breaker_open
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_entry_is_shared_per_provider() {
        let cache = CredentialCache::new();
        {
            let entry = cache.entry(&Provider::Ilanzou);
            entry.lock().await.token = Some("tok".to_string());
        }
        let entry = cache.entry(&Provider::Ilanzou);
        assert_eq!(entry.lock().await.token.as_deref(), Some("tok"));
        // Different provider, different entry.
        assert!(cache.entry(&Provider::Weiyun).lock().await.token.is_none());
    }

    #[tokio::test]
    async fn test_reset_clears_token_and_breaker() {
        let cache = CredentialCache::new();
        {
            let entry = cache.entry(&Provider::Feijipan);
            let mut guard = entry.lock().await;
            guard.token = Some("stale".to_string());
            guard.breaker_open = true;
        }
        cache.reset(&Provider::Feijipan).await;
        let entry = cache.entry(&Provider::Feijipan);
        let guard = entry.lock().await;
        assert!(guard.token.is_none());
        assert!(!guard.breaker_open);
    }

    #[tokio::test]
    async fn test_entry_lock_serializes_read_verify_write() {
        let cache = Arc::new(CredentialCache::new());
        let mut handles = Vec::new();
        for i in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                let entry = cache.entry(&Provider::Ilanzou);
                let mut guard = entry.lock().await;
                // Verify-before-write: only the first task authenticates.
                if guard.token.is_none() {
                    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                    guard.token = Some(format!("token-{i}"));
                    true
                } else {
                    false
                }
            }));
        }
        let mut logins = 0;
        for handle in handles {
            if handle.await.unwrap() {
                logins += 1;
            }
        }
        assert_eq!(logins, 1);
    }
}
