//! Data-driven provider adapter: protocol logic supplied as a script,
//! executed by an embedder-provided [`ScriptExecutor`].
//!
//! The engine treats the script as an opaque black box with the same
//! contract as a compiled adapter. Script failures map onto
//! [`ResolveError::Script`]; returned values are decoded into the same
//! tagged outcomes the compiled adapters produce.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use super::{Adapter, ResolveStep};
use crate::engine::channel::{Resolved, ResolvedLink};
use crate::engine::error::ResolveError;
use crate::model::{FileDescriptor, Provider, ShareDescriptor};
use crate::script::ScriptExecutor;

/// Entry points a provider script must export.
const RESOLVE_FN: &str = "parse";
const LIST_FN: &str = "parseFileList";
const DEFERRED_FN: &str = "parseById";

/// Adapter whose provider logic lives in a script registered at runtime.
pub struct ScriptedAdapter {
    provider: Provider,
    source: String,
    executor: Arc<dyn ScriptExecutor>,
}

impl ScriptedAdapter {
    #[must_use]
    pub fn new(
        provider_name: &str,
        source: impl Into<String>,
        executor: Arc<dyn ScriptExecutor>,
    ) -> Self {
        Self {
            provider: Provider::from_id(provider_name)
                .unwrap_or_else(|| Provider::Custom(Arc::from(provider_name))),
            source: source.into(),
            executor,
        }
    }

    /// The descriptor as the script sees it.
    fn descriptor_arg(share: &ShareDescriptor) -> Value {
        json!({
            "shareKey": share.share_key(),
            "provider": share.provider().map(Provider::id),
            "password": share.password(),
            "rawUrl": share.raw_url(),
            "normalizedUrl": share.normalized_url(),
        })
    }

    async fn call(
        &self,
        share: &ShareDescriptor,
        function: &str,
    ) -> Result<Value, ResolveError> {
        debug!(provider = %self.provider, function, "invoking provider script");
        self.executor
            .call(&self.source, function, vec![Self::descriptor_arg(share)])
            .await
            .map_err(|e| ResolveError::script(share.base_msg(), e))
    }
}

/// Decodes a script return value into a tagged outcome. Accepted shapes:
/// a bare URL string, `{ "url", "headers"? }`, or `{ "folderId" }`.
fn decode_outcome(context: &str, value: &Value) -> Result<Resolved, ResolveError> {
    if let Some(url) = value.as_str() {
        return Ok(Resolved::Link(ResolvedLink::new(url)));
    }
    if let Some(url) = value["url"].as_str() {
        let headers = value["headers"]
            .as_object()
            .map(|map| {
                map.iter()
                    .filter_map(|(name, v)| {
                        v.as_str().map(|v| (name.clone(), v.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default();
        return Ok(Resolved::Link(ResolvedLink::with_headers(url, headers)));
    }
    if let Some(folder_id) = value["folderId"].as_str() {
        return Ok(Resolved::Folder {
            folder_id: folder_id.to_string(),
        });
    }
    Err(ResolveError::script(
        context,
        format!("script returned an unusable outcome: {value}"),
    ))
}

#[async_trait]
impl Adapter for ScriptedAdapter {
    fn name(&self) -> &str {
        self.provider.id()
    }

    fn provider(&self) -> Provider {
        self.provider.clone()
    }

    async fn resolve(&self, share: &ShareDescriptor) -> Result<ResolveStep, ResolveError> {
        let value = self.call(share, RESOLVE_FN).await?;
        Ok(ResolveStep::Done(decode_outcome(&share.base_msg(), &value)?))
    }

    async fn list_files(
        &self,
        share: &ShareDescriptor,
    ) -> Result<Vec<FileDescriptor>, ResolveError> {
        let value = self.call(share, LIST_FN).await?;
        serde_json::from_value(value)
            .map_err(|e| ResolveError::script(share.base_msg(), format!("bad file list: {e}")))
    }

    async fn resolve_deferred(&self, share: &ShareDescriptor) -> Result<Resolved, ResolveError> {
        let value = self.call(share, DEFERRED_FN).await?;
        decode_outcome(&share.base_msg(), &value)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::script::ScriptError;

    /// In-process fake standing in for an embedded script engine.
    struct FakeExecutor {
        reply: Value,
    }

    #[async_trait]
    impl ScriptExecutor for FakeExecutor {
        async fn call(
            &self,
            _source: &str,
            function: &str,
            args: Vec<Value>,
        ) -> Result<Value, ScriptError> {
            assert_eq!(args.len(), 1);
            if function == "explode" {
                return Err(ScriptError::Evaluation {
                    message: "boom".to_string(),
                });
            }
            Ok(self.reply.clone())
        }
    }

    fn share() -> ShareDescriptor {
        ShareDescriptor::builder()
            .provider(Provider::Custom(Arc::from("mycloud")))
            .share_key("s1")
            .build()
    }

    #[tokio::test]
    async fn test_bare_url_reply_becomes_link() {
        let adapter = ScriptedAdapter::new(
            "mycloud",
            "function parse(d) { return 'https://dl/x'; }",
            Arc::new(FakeExecutor {
                reply: json!("https://dl/x"),
            }),
        );
        let step = adapter.resolve(&share()).await.unwrap();
        match step {
            ResolveStep::Done(Resolved::Link(link)) => assert_eq!(link.url, "https://dl/x"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_object_reply_carries_headers_or_folder() {
        let adapter = ScriptedAdapter::new(
            "mycloud",
            "",
            Arc::new(FakeExecutor {
                reply: json!({ "url": "https://dl/y", "headers": { "Cookie": "a=1" } }),
            }),
        );
        match adapter.resolve(&share()).await.unwrap() {
            ResolveStep::Done(Resolved::Link(link)) => {
                assert_eq!(link.headers, vec![("Cookie".to_string(), "a=1".to_string())]);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        let folder = ScriptedAdapter::new(
            "mycloud",
            "",
            Arc::new(FakeExecutor {
                reply: json!({ "folderId": "77" }),
            }),
        );
        match folder.resolve(&share()).await.unwrap() {
            ResolveStep::Done(Resolved::Folder { folder_id }) => assert_eq!(folder_id, "77"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_script_failure_maps_to_script_error() {
        struct Failing;
        #[async_trait]
        impl ScriptExecutor for Failing {
            async fn call(
                &self,
                _source: &str,
                _function: &str,
                _args: Vec<Value>,
            ) -> Result<Value, ScriptError> {
                Err(ScriptError::MissingFunction {
                    function: "parse".to_string(),
                })
            }
        }
        let adapter = ScriptedAdapter::new("mycloud", "", Arc::new(Failing));
        let error = adapter.resolve(&share()).await.unwrap_err();
        assert!(matches!(error, ResolveError::Script { .. }));
    }

    #[tokio::test]
    async fn test_unusable_reply_is_rejected() {
        let adapter = ScriptedAdapter::new(
            "mycloud",
            "",
            Arc::new(FakeExecutor { reply: json!(42) }),
        );
        assert!(adapter.resolve(&share()).await.is_err());
    }
}
