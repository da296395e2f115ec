//! Single-assignment resolution completion channel.
//!
//! Adapters and the router may race to finish one resolution (a challenge
//! retry and a timeout retry can both reach a terminal state). The cell
//! guarantees exactly one transition from pending to done: the first
//! completion wins, every later attempt is logged and dropped, never raised.

use std::sync::Mutex;
use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::error::ResolveError;

/// Successful outcome of one resolution.
///
/// Providers historically returned a folder id through the same success
/// channel as a download URL, distinguished by string shape. Here the two
/// outcomes are tagged instead; callers receiving `Folder` are expected to
/// re-enter via a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// A direct, replayable download link.
    Link(ResolvedLink),
    /// The share's first entry was a folder; recurse with this id.
    Folder { folder_id: String },
}

/// A direct download URL plus the headers the caller must replay verbatim
/// when fetching it (some providers reject downloads without them).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLink {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl ResolvedLink {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_headers(url: impl Into<String>, headers: Vec<(String, String)>) -> Self {
        Self {
            url: url.into(),
            headers,
        }
    }
}

type ResolveResult = Result<Resolved, ResolveError>;

/// Completion side of the channel. Cloneable so racing paths can each hold
/// a handle; only the first `complete` call delivers.
#[derive(Debug, Clone)]
pub struct ResolutionCell {
    sender: Arc<Mutex<Option<oneshot::Sender<ResolveResult>>>>,
}

/// Awaiting side of the channel. Dropping it cancels the resolution: later
/// completions are dropped and in-flight work should stop at its next
/// suspension point.
#[derive(Debug)]
pub struct ResolutionFuture {
    receiver: oneshot::Receiver<ResolveResult>,
}

/// Creates a linked completion cell and future.
#[must_use]
pub fn resolution_channel() -> (ResolutionCell, ResolutionFuture) {
    let (sender, receiver) = oneshot::channel();
    (
        ResolutionCell {
            sender: Arc::new(Mutex::new(Some(sender))),
        },
        ResolutionFuture { receiver },
    )
}

impl ResolutionCell {
    /// Completes the resolution. Returns `true` if this call won the
    /// assignment; a second completion logs a warning and returns `false`.
    pub fn complete(&self, result: ResolveResult) -> bool {
        let taken = self
            .sender
            .lock()
            .map(|mut guard| guard.take())
            .unwrap_or(None);
        match taken {
            Some(sender) => {
                if sender.send(result).is_err() {
                    debug!("resolution caller went away before completion");
                }
                true
            }
            None => {
                warn!("resolution already completed; dropping late result");
                false
            }
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.sender
            .lock()
            .map(|guard| guard.is_none())
            .unwrap_or(true)
    }
}

impl ResolutionFuture {
    /// Waits for the resolution outcome. If every completion handle is
    /// dropped without completing, reports a provider error rather than
    /// hanging forever.
    ///
    /// # Errors
    ///
    /// Returns the failure the resolution was completed with.
    pub async fn wait(self) -> ResolveResult {
        match self.receiver.await {
            Ok(result) => result,
            Err(_) => Err(ResolveError::provider(
                "resolution",
                "resolution abandoned without completion",
            )),
        }
    }
}
