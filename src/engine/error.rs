//! Error taxonomy for share-link resolution.
//!
//! Every failure an adapter can hit funnels into [`ResolveError`]; raw
//! transport errors never escape an adapter. Messages carry the
//! provider-and-share context prefix (`ShareDescriptor::base_msg`) so a
//! caller always knows which provider, which share, and which step failed.

use thiserror::Error;

/// Errors surfaced through the resolution channel's failure slot.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// Neither the descriptor nor the raw URL identified a known provider.
    #[error("unknown provider: no adapter recognizes {input}")]
    UnknownProvider {
        /// The raw URL or provider id that could not be matched.
        input: String,
    },

    /// The router exhausted the sibling fallback chain.
    #[error("{context}: no more adapters in the fallback chain")]
    NoMoreAdapters {
        /// Provider + share context of the request that exhausted the chain.
        context: String,
    },

    /// The share's listing came back empty or missing; terminal.
    #[error("{context}: share {share_key} returned no usable file list")]
    EmptyShare {
        context: String,
        /// Echoed so user-facing messages identify the share.
        share_key: String,
    },

    /// The redirect response carried no `Location` header; terminal.
    #[error(
        "{context}: no download link in redirect response (credentials may be stale or revoked)"
    )]
    NoDownloadLink { context: String },

    /// The anti-bot challenge repeated after the single cookie retry.
    #[error("{context}: anti-bot challenge persisted after cookie retry")]
    PersistentChallenge { context: String },

    /// The provider rejected the supplied credentials.
    #[error("{context}: authentication rejected: {message}")]
    AuthRejected {
        context: String,
        message: String,
        /// True when the credential was caller-supplied and request-scoped;
        /// only shared-credential rejections open the breaker.
        ephemeral: bool,
    },

    /// Directory recursion passed the configured ceiling.
    #[error("{context}: directory nesting exceeded {max_depth} levels")]
    DirectoryTooDeep { context: String, max_depth: usize },

    /// A network call failed after its single retry.
    #[error("{context}: network failure after retry: {message}")]
    TransientNetwork { context: String, message: String },

    /// The provider answered, but with an error status or payload the
    /// protocol does not allow at this step.
    #[error("{context}: provider error: {message}")]
    Provider { context: String, message: String },

    /// A response body could not be decoded as text or JSON.
    #[error("{context}: response body could not be decoded: {message}")]
    BodyDecode { context: String, message: String },

    /// A script-driven adapter raised inside the script runtime.
    #[error("{context}: script adapter failure: {message}")]
    Script { context: String, message: String },

    /// The input was not a recognizable share URL.
    #[error("invalid share URL: {url}")]
    InvalidShareUrl { url: String },
}

impl ResolveError {
    /// Shorthand constructors keep adapter code on one line per failure path.
    #[must_use]
    pub fn provider(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            context: context.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn transient(context: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::TransientNetwork {
            context: context.into(),
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn body_decode(context: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::BodyDecode {
            context: context.into(),
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn script(context: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Script {
            context: context.into(),
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_share_message_contains_share_key() {
        let error = ResolveError::EmptyShare {
            context: "ilanzou: key=abc123".to_string(),
            share_key: "abc123".to_string(),
        };
        assert!(error.to_string().contains("abc123"));
        assert!(error.to_string().contains("ilanzou"));
    }

    #[test]
    fn test_auth_rejected_distinguishes_scope() {
        let shared = ResolveError::AuthRejected {
            context: "ilanzou: key=k".to_string(),
            message: "bad password".to_string(),
            ephemeral: false,
        };
        assert!(matches!(
            shared,
            ResolveError::AuthRejected { ephemeral: false, .. }
        ));
    }
}
