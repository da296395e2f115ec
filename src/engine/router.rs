//! Dispatch and fallback routing from a share descriptor to an adapter.
//!
//! The router owns the fixed, ordered adapter chain. A descriptor without a
//! provider is pinned by inferring one from the raw URL's host; a share no
//! adapter recognizes fails with `UnknownProvider` rather than defaulting.
//! When an adapter reports mid-protocol that a URL belongs to a sibling
//! provider, the router advances iteratively through the remaining chain
//! (a loop, never recursion) and re-pins the same descriptor to each
//! candidate; exhaustion fails with `NoMoreAdapters`.

use std::sync::Arc;

use tracing::{debug, info, warn};
use url::Url;

use super::channel::{Resolved, ResolutionCell};
use super::error::ResolveError;
use crate::adapters::{
    Adapter, AdapterContext, LanzouCloudAdapter, ResolveStep, WeiyunAdapter,
};
use crate::model::{FileDescriptor, Provider, ShareDescriptor};

/// Routes resolutions to provider adapters, with sibling fallback.
pub struct Router {
    adapters: Vec<Arc<dyn Adapter>>,
}

impl Router {
    #[must_use]
    pub fn new(adapters: Vec<Arc<dyn Adapter>>) -> Self {
        Self { adapters }
    }

    /// Registered adapter names, in chain order.
    #[must_use]
    pub fn adapter_names(&self) -> Vec<&str> {
        self.adapters.iter().map(|adapter| adapter.name()).collect()
    }

    /// Builds a descriptor from a raw share URL.
    ///
    /// # Errors
    ///
    /// `InvalidShareUrl` when the input is not a URL at all;
    /// `UnknownProvider` when no registered provider claims its host.
    pub fn descriptor_from_url(
        &self,
        raw_url: &str,
        password: &str,
    ) -> Result<ShareDescriptor, ResolveError> {
        if Url::parse(raw_url).is_err() {
            return Err(ResolveError::InvalidShareUrl {
                url: raw_url.to_string(),
            });
        }
        let Some((provider, share_key)) = Provider::from_share_url(raw_url) else {
            return Err(ResolveError::UnknownProvider {
                input: raw_url.to_string(),
            });
        };
        Ok(ShareDescriptor::builder()
            .provider(provider)
            .share_key(share_key)
            .password(password)
            .raw_url(raw_url)
            .build())
    }

    /// Pins the descriptor to a provider: keeps an explicit one, otherwise
    /// infers from the raw URL. Never defaults silently.
    fn pin(&self, share: &ShareDescriptor) -> Result<ShareDescriptor, ResolveError> {
        if share.provider().is_some() {
            return Ok(share.clone());
        }
        match Provider::from_share_url(share.raw_url()) {
            Some((provider, _)) => {
                debug!(provider = %provider, "inferred provider from raw URL");
                Ok(share.with_provider(provider))
            }
            None => Err(ResolveError::UnknownProvider {
                input: if share.raw_url().is_empty() {
                    share.share_key().to_string()
                } else {
                    share.raw_url().to_string()
                },
            }),
        }
    }

    fn adapter_for(&self, provider: &Provider) -> Option<Arc<dyn Adapter>> {
        self.adapters
            .iter()
            .find(|adapter| &adapter.provider() == provider)
            .cloned()
    }

    /// The fallback chain for a pinned provider: its own adapter first, then
    /// every other registered adapter in registration order.
    fn chain_from(&self, provider: &Provider) -> Result<Vec<Arc<dyn Adapter>>, ResolveError> {
        let first = self
            .adapter_for(provider)
            .ok_or_else(|| ResolveError::UnknownProvider {
                input: provider.id().to_string(),
            })?;
        let mut chain = vec![first];
        for adapter in &self.adapters {
            if &adapter.provider() != provider {
                chain.push(adapter.clone());
            }
        }
        Ok(chain)
    }

    /// Resolves one share to a tagged outcome, walking the fallback chain
    /// when an adapter disclaims the share.
    ///
    /// # Errors
    ///
    /// Any [`ResolveError`]; `NoMoreAdapters` when the chain is exhausted.
    pub async fn resolve(&self, share: &ShareDescriptor) -> Result<Resolved, ResolveError> {
        let pinned = self.pin(share)?;
        let Some(start) = pinned.provider().cloned() else {
            // pin() guarantees a provider; defensive for the type system.
            return Err(ResolveError::UnknownProvider {
                input: pinned.share_key().to_string(),
            });
        };
        for adapter in self.chain_from(&start)? {
            let attempt = pinned.with_provider(adapter.provider());
            match adapter.resolve(&attempt).await? {
                ResolveStep::Done(resolved) => return Ok(resolved),
                ResolveStep::WrongProvider => {
                    info!(
                        adapter = adapter.name(),
                        "adapter disclaimed the share; advancing fallback chain"
                    );
                }
            }
        }
        Err(ResolveError::NoMoreAdapters {
            context: pinned.base_msg(),
        })
    }

    /// Like [`Router::resolve`], but delivers through a completion cell so
    /// callers can hold a cancellable handle. The cell's single-assignment
    /// guarantee absorbs any racing completion.
    pub async fn resolve_into(&self, share: &ShareDescriptor, cell: &ResolutionCell) {
        let result = self.resolve(share).await;
        if let Err(error) = &result {
            warn!(%error, "resolution failed");
        }
        cell.complete(result);
    }

    /// Expands the share into a flat file list via its pinned adapter.
    ///
    /// # Errors
    ///
    /// Any [`ResolveError`] from the adapter or the directory walker.
    pub async fn list_files(
        &self,
        share: &ShareDescriptor,
    ) -> Result<Vec<FileDescriptor>, ResolveError> {
        let pinned = self.pin(share)?;
        let Some(provider) = pinned.provider().cloned() else {
            return Err(ResolveError::UnknownProvider {
                input: pinned.share_key().to_string(),
            });
        };
        let adapter = self
            .adapter_for(&provider)
            .ok_or_else(|| ResolveError::UnknownProvider {
                input: provider.id().to_string(),
            })?;
        adapter.list_files(&pinned).await
    }

    /// Re-enters one file's resolution from deferred parameters.
    ///
    /// # Errors
    ///
    /// Any [`ResolveError`] from the adapter.
    pub async fn resolve_deferred(
        &self,
        share: &ShareDescriptor,
    ) -> Result<Resolved, ResolveError> {
        let pinned = self.pin(share)?;
        let Some(provider) = pinned.provider().cloned() else {
            return Err(ResolveError::UnknownProvider {
                input: pinned.share_key().to_string(),
            });
        };
        let adapter = self
            .adapter_for(&provider)
            .ok_or_else(|| ResolveError::UnknownProvider {
                input: provider.id().to_string(),
            })?;
        adapter.resolve_deferred(&pinned).await
    }

    /// Administrative credential/breaker reset for one provider. Returns
    /// false when no adapter is registered for it.
    pub async fn reset_credentials(&self, provider: &Provider) -> bool {
        match self.adapter_for(provider) {
            Some(adapter) => {
                adapter.reset_credentials().await;
                true
            }
            None => false,
        }
    }
}

/// Assembles the default chain: the Lanzou family pair (in sibling fallback
/// order) followed by Weiyun.
#[must_use]
pub fn build_default_router(ctx: &AdapterContext) -> Router {
    Router::new(vec![
        Arc::new(LanzouCloudAdapter::ilanzou(ctx.clone())),
        Arc::new(LanzouCloudAdapter::feijipan(ctx.clone())),
        Arc::new(WeiyunAdapter::new(ctx.clone())),
    ])
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::engine::channel::{ResolvedLink, resolution_channel};

    /// Scripted stand-in adapter: disclaims the first `disclaim` attempts.
    struct StubAdapter {
        provider: Provider,
        disclaim: bool,
        url: &'static str,
        calls: AtomicUsize,
    }

    impl StubAdapter {
        fn claiming(provider: Provider, url: &'static str) -> Self {
            Self {
                provider,
                disclaim: false,
                url,
                calls: AtomicUsize::new(0),
            }
        }

        fn disclaiming(provider: Provider) -> Self {
            Self {
                provider,
                disclaim: true,
                url: "",
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Adapter for StubAdapter {
        fn name(&self) -> &str {
            self.provider.id()
        }

        fn provider(&self) -> Provider {
            self.provider.clone()
        }

        async fn resolve(&self, _share: &ShareDescriptor) -> Result<ResolveStep, ResolveError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.disclaim {
                Ok(ResolveStep::WrongProvider)
            } else {
                Ok(ResolveStep::Done(Resolved::Link(ResolvedLink::new(
                    self.url,
                ))))
            }
        }
    }

    fn keyed_share(provider: Provider) -> ShareDescriptor {
        ShareDescriptor::builder()
            .provider(provider)
            .share_key("abc123")
            .build()
    }

    #[tokio::test]
    async fn test_fallback_chain_advances_to_sibling() {
        let first = Arc::new(StubAdapter::disclaiming(Provider::Ilanzou));
        let second = Arc::new(StubAdapter::claiming(Provider::Feijipan, "https://dl/f"));
        let router = Router::new(vec![first.clone(), second.clone()]);

        let resolved = router.resolve(&keyed_share(Provider::Ilanzou)).await.unwrap();
        assert_eq!(resolved, Resolved::Link(ResolvedLink::new("https://dl/f")));
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_chain_is_no_more_adapters() {
        let router = Router::new(vec![
            Arc::new(StubAdapter::disclaiming(Provider::Ilanzou)) as Arc<dyn Adapter>,
            Arc::new(StubAdapter::disclaiming(Provider::Feijipan)),
        ]);
        let error = router
            .resolve(&keyed_share(Provider::Ilanzou))
            .await
            .unwrap_err();
        assert!(matches!(error, ResolveError::NoMoreAdapters { .. }));
    }

    #[tokio::test]
    async fn test_provider_inferred_from_raw_url() {
        let adapter = Arc::new(StubAdapter::claiming(Provider::Weiyun, "https://dl/w"));
        let router = Router::new(vec![adapter]);
        let share = ShareDescriptor::builder()
            .share_key("Xy9z")
            .raw_url("https://share.weiyun.com/Xy9z")
            .build();
        assert!(share.provider().is_none());
        let resolved = router.resolve(&share).await.unwrap();
        assert_eq!(resolved, Resolved::Link(ResolvedLink::new("https://dl/w")));
    }

    #[tokio::test]
    async fn test_unknown_host_never_defaults() {
        let router = Router::new(vec![
            Arc::new(StubAdapter::claiming(Provider::Ilanzou, "https://dl/x")) as Arc<dyn Adapter>,
        ]);
        let share = ShareDescriptor::builder()
            .share_key("zz")
            .raw_url("https://unrelated.example/s/zz")
            .build();
        assert!(matches!(
            router.resolve(&share).await.unwrap_err(),
            ResolveError::UnknownProvider { .. }
        ));
    }

    #[tokio::test]
    async fn test_descriptor_from_url_classifies_failures() {
        let router = Router::new(vec![]);
        assert!(matches!(
            router.descriptor_from_url("not a url", "").unwrap_err(),
            ResolveError::InvalidShareUrl { .. }
        ));
        assert!(matches!(
            router
                .descriptor_from_url("https://unrelated.example/s/x", "")
                .unwrap_err(),
            ResolveError::UnknownProvider { .. }
        ));
        let share = router
            .descriptor_from_url("https://www.ilanzou.com/s/aB12", "pw")
            .unwrap();
        assert_eq!(share.share_key(), "aB12");
        assert_eq!(share.password(), "pw");
    }

    #[tokio::test]
    async fn test_resolve_into_completes_the_cell_once() {
        let adapter = Arc::new(StubAdapter::claiming(Provider::Ilanzou, "https://dl/c"));
        let router = Router::new(vec![adapter]);
        let (cell, future) = resolution_channel();
        router
            .resolve_into(&keyed_share(Provider::Ilanzou), &cell)
            .await;
        assert!(cell.is_complete());
        let resolved = future.wait().await.unwrap();
        assert_eq!(resolved, Resolved::Link(ResolvedLink::new("https://dl/c")));
    }
}
