//! Script-executor seam for community-authored provider adapters.
//!
//! The engine itself ships no script runtime. Embedders that want
//! user-supplied adapters implement [`ScriptExecutor`] over whatever engine
//! they embed and hand it to [`crate::adapters::ScriptedAdapter`], which maps
//! script return values onto the same tagged outcomes native adapters
//! produce.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Failures raised by the embedded script runtime.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("script function {function} not found")]
    MissingFunction { function: String },
    #[error("script evaluation failed: {message}")]
    Evaluation { message: String },
    #[error("script returned an unusable value: {message}")]
    BadReturn { message: String },
}

/// Bridge to an embedder-supplied script engine.
///
/// `call` evaluates `source` and invokes `function` with JSON arguments,
/// returning the function's result as JSON. Implementations own sandboxing
/// and timeouts; the engine only translates the outcome.
#[async_trait]
pub trait ScriptExecutor: Send + Sync {
    async fn call(
        &self,
        source: &str,
        function: &str,
        args: Vec<Value>,
    ) -> Result<Value, ScriptError>;
}
