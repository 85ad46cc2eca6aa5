//! Invocation boundary.
//!
//! The handler runs one relay per invocation and always answers with a
//! structured response, `{"message": ...}` on success or `{"error": ...}` on
//! failure. Errors and panics inside the relay are converted here and never
//! escape.
//!
//! # Example
//!
//! ```ignore
//! use s3relay::handler::{handle_event, InvocationContext};
//!
//! let response = handle_event(&serde_json::json!({}), &InvocationContext::new("req-1")).await;
//! println!("{}", response.to_json());
//! ```

use std::future::{self, Future};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, info_span, Instrument};

use crate::config::RelayConfig;
use crate::relay::{relay_until, RelayError};
use crate::source::{ChunkSource, HttpSource};
use crate::storage::{MultipartBackend, S3Backend};

/// Message returned on success.
pub const SUCCESS_MESSAGE: &str = "File uploaded to S3";

/// Structured invocation result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerResponse {
    /// Serialized as `{"message": "..."}`.
    Message(String),
    /// Serialized as `{"error": "..."}`.
    Error(String),
}

impl HandlerResponse {
    /// Failure response for a relay error.
    pub fn from_error(err: &RelayError) -> Self {
        HandlerResponse::Error(err.user_message())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, HandlerResponse::Message(_))
    }

    /// JSON value of the response.
    pub fn to_value(&self) -> Value {
        match self {
            HandlerResponse::Message(m) => serde_json::json!({ "message": m }),
            HandlerResponse::Error(e) => serde_json::json!({ "error": e }),
        }
    }

    /// Compact JSON text of the response.
    pub fn to_json(&self) -> String {
        self.to_value().to_string()
    }
}

/// Per-invocation context supplied by the trigger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvocationContext {
    /// Identifier used to correlate log lines.
    pub request_id: String,
}

impl InvocationContext {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
        }
    }
}

/// Runs relays for invocations with a fixed source and backend.
pub struct RelayHandler {
    config: RelayConfig,
    source: Arc<dyn ChunkSource>,
    backend: Arc<dyn MultipartBackend>,
}

impl RelayHandler {
    pub fn new(
        config: RelayConfig,
        source: Arc<dyn ChunkSource>,
        backend: Arc<dyn MultipartBackend>,
    ) -> Self {
        Self {
            config,
            source,
            backend,
        }
    }

    /// Build a handler with an HTTP source and an S3 backend from `config`.
    pub async fn from_config(config: RelayConfig) -> Result<Self, RelayError> {
        config.validate()?;
        let source = HttpSource::with_timeout(config.chunk_size, config.timeout)?;
        let backend = S3Backend::connect(config.region.clone(), config.endpoint_url.clone()).await;
        Ok(Self::new(config, Arc::new(source), Arc::new(backend)))
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Handle one invocation.
    pub async fn handle(&self, event: &Value, context: &InvocationContext) -> HandlerResponse {
        self.handle_until(event, context, future::pending()).await
    }

    /// Handle one invocation, cancelling the relay when `cancel` resolves.
    pub async fn handle_until<C>(
        &self,
        event: &Value,
        context: &InvocationContext,
        cancel: C,
    ) -> HandlerResponse
    where
        C: Future<Output = ()> + Send,
    {
        let span = info_span!("invocation", request_id = %context.request_id);
        async move {
            debug!(%event, "Invocation received");
            let request = self.config.to_request();

            let run = relay_until(
                self.source.as_ref(),
                Arc::clone(&self.backend),
                &request,
                cancel,
            );
            let outcome = match AssertUnwindSafe(run).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(panic) => Err(RelayError::Unexpected(panic_message(panic.as_ref()))),
            };

            match outcome {
                Ok(object) => {
                    info!(
                        bucket = %object.bucket,
                        key = %object.key,
                        size = object.size,
                        parts = object.parts,
                        "File uploaded to S3 bucket '{}' at '{}'",
                        object.bucket,
                        object.key
                    );
                    HandlerResponse::Message(SUCCESS_MESSAGE.to_string())
                }
                Err(e) => {
                    if e.is_download_failure() {
                        error!(error = %e, "Error downloading the file");
                    } else {
                        error!(error = %e, "Error relaying the file");
                    }
                    HandlerResponse::from_error(&e)
                }
            }
        }
        .instrument(span)
        .await
    }
}

/// Resolve configuration from the environment, build the HTTP source and S3
/// backend, and handle one invocation. Every failure, including bad
/// configuration, becomes an error response.
pub async fn handle_event(event: &Value, context: &InvocationContext) -> HandlerResponse {
    let handler = match RelayConfig::from_env().map_err(RelayError::from) {
        Ok(config) => RelayHandler::from_config(config).await,
        Err(e) => Err(e),
    };

    match handler {
        Ok(handler) => handler.handle(event, context).await,
        Err(e) => {
            error!(error = %e, "Failed to prepare relay");
            HandlerResponse::from_error(&e)
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_serialization() {
        let ok = HandlerResponse::Message(SUCCESS_MESSAGE.to_string());
        assert_eq!(ok.to_json(), r#"{"message":"File uploaded to S3"}"#);

        let err = HandlerResponse::Error("Failed to download the file".to_string());
        assert_eq!(err.to_json(), r#"{"error":"Failed to download the file"}"#);
    }

    #[test]
    fn test_serde_representation_matches_to_value() {
        let err = HandlerResponse::Error("x".to_string());
        assert_eq!(serde_json::to_value(&err).unwrap(), err.to_value());

        let parsed: HandlerResponse = serde_json::from_str(r#"{"message":"ok"}"#).unwrap();
        assert!(parsed.is_success());
    }

    #[test]
    fn test_from_error_uses_user_message() {
        let err = RelayError::Cancelled;
        assert_eq!(
            HandlerResponse::from_error(&err),
            HandlerResponse::Error("The upload was cancelled".to_string())
        );
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");

        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
    }

    #[tokio::test]
    async fn test_invalid_config_becomes_error_response() {
        let config = RelayConfig::default().with_part_size(1);
        let err = RelayHandler::from_config(config).await.err().unwrap();
        let response = HandlerResponse::from_error(&err);
        assert!(!response.is_success());
        assert!(response.to_json().contains("Invalid configuration"));
    }
}
