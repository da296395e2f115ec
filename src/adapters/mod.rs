//! Provider adapters: one implementation of the resolution protocol per
//! cloud-storage service, unified behind the [`Adapter`] trait.
//!
//! Compiled adapters and the script-driven one share the same contract, so
//! the router dispatches over `Arc<dyn Adapter>` without caring which kind
//! it holds.

mod lanzou_cloud;
mod scripted;
mod weiyun;

pub use lanzou_cloud::LanzouCloudAdapter;
pub use scripted::ScriptedAdapter;
pub use weiyun::WeiyunAdapter;

use std::sync::Arc;

use async_trait::async_trait;

use crate::engine::channel::Resolved;
use crate::engine::credentials::CredentialCache;
use crate::engine::error::ResolveError;
use crate::engine::walker::DEFAULT_MAX_DEPTH;
use crate::model::{FileDescriptor, Provider, ShareDescriptor};
use crate::transport::{TransportConfig, TransportError};

/// Maps transport failures onto the resolution taxonomy: timeouts and
/// connection losses (already retried once inside the transport) surface as
/// transient, everything else as a provider failure.
pub(crate) fn wire_error(context: &str, error: TransportError) -> ResolveError {
    match error {
        TransportError::Timeout { .. } | TransportError::Network { .. } => {
            ResolveError::transient(context, error)
        }
        other => ResolveError::provider(context, other.to_string()),
    }
}

/// Outcome of one adapter attempt, as seen by the router.
#[derive(Debug)]
pub enum ResolveStep {
    /// The adapter finished, successfully, with a tagged outcome.
    Done(Resolved),
    /// The share actually belongs to a sibling provider with the same URL
    /// shape; the router should advance the fallback chain.
    WrongProvider,
}

/// Shared construction context handed to every adapter: the injected
/// credential cache plus the connection and deferred-URL settings.
#[derive(Debug, Clone)]
pub struct AdapterContext {
    pub credentials: Arc<CredentialCache>,
    pub transport: TransportConfig,
    /// Base domain rendered into deferred per-file resolution URLs when the
    /// caller does not override it per request.
    pub deferred_base: String,
    pub max_directory_depth: usize,
}

impl Default for AdapterContext {
    fn default() -> Self {
        Self {
            credentials: Arc::new(CredentialCache::new()),
            transport: TransportConfig::default(),
            deferred_base: "http://127.0.0.1:6400".to_string(),
            max_directory_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// One provider's implementation of the resolution state machine.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Short name for logs and registry listings.
    fn name(&self) -> &str;

    /// The provider this adapter is registered for.
    fn provider(&self) -> Provider;

    /// Runs the full protocol for one share, returning either a tagged
    /// outcome or a wrong-provider signal for the router's fallback chain.
    async fn resolve(&self, share: &ShareDescriptor) -> Result<ResolveStep, ResolveError>;

    /// Expands the share into a flat file list, recursing through folders.
    async fn list_files(
        &self,
        share: &ShareDescriptor,
    ) -> Result<Vec<FileDescriptor>, ResolveError> {
        Err(ResolveError::provider(
            share.base_msg(),
            format!("{} does not support directory listing", self.name()),
        ))
    }

    /// Re-enters the protocol at the link-fetch step using parameters a
    /// previous listing serialized into a deferred resolution URL.
    async fn resolve_deferred(&self, share: &ShareDescriptor) -> Result<Resolved, ResolveError> {
        Err(ResolveError::provider(
            share.base_msg(),
            format!("{} does not support deferred resolution", self.name()),
        ))
    }

    /// Administrative reset of this adapter's cached credentials/breaker.
    async fn reset_credentials(&self) {}
}
