//! Domain payload responder
//!
//! Maps the status of a domain result to an HTTP response. Handlers are
//! registered per status; the lookup key is the status lowercased with
//! underscores removed, so `NOT_FOUND`, `not_found`, and `NotFound` share a
//! handler.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::http::{build_204_response, response::build_text_response};

/// Status key reserved for domain errors
const ERROR_STATUS: &str = "error";

/// Result of a domain operation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub output: Option<serde_json::Value>,
    #[serde(default)]
    pub messages: Option<String>,
}

impl Payload {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: Some(status.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_output(mut self, output: serde_json::Value) -> Self {
        self.output = Some(output);
        self
    }

    #[must_use]
    pub fn with_messages(mut self, messages: impl Into<String>) -> Self {
        self.messages = Some(messages.into());
        self
    }
}

/// Escalated domain failure (debug mode only)
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("Domain error: {0}")]
    Domain(String),
}

type Handler = Box<dyn Fn(&Payload) -> Response<Full<Bytes>> + Send + Sync>;

/// Dispatches payloads to per-status handlers
#[derive(Default)]
pub struct PayloadResponder {
    handlers: HashMap<String, Handler>,
    debug: bool,
}

impl PayloadResponder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a payload status
    #[must_use]
    pub fn on<F>(mut self, status: &str, handler: F) -> Self
    where
        F: Fn(&Payload) -> Response<Full<Bytes>> + Send + Sync + 'static,
    {
        self.handlers
            .insert(normalize_status(status), Box::new(handler));
        self
    }

    /// Return domain errors to the caller instead of a generic 500
    pub fn enable_debugging(&mut self) {
        self.debug = true;
    }

    pub const fn is_debugging(&self) -> bool {
        self.debug
    }

    /// Build the response for `payload`
    pub fn respond(&self, payload: Option<&Payload>) -> Result<Response<Full<Bytes>>, PayloadError> {
        let Some(payload) = payload else {
            return Ok(build_204_response());
        };

        let key = payload
            .status
            .as_deref()
            .map(normalize_status)
            .unwrap_or_default();

        if let Some(handler) = self.handlers.get(&key) {
            return Ok(handler(payload));
        }

        if key == ERROR_STATUS {
            return self.error(payload);
        }

        Ok(unknown(payload))
    }

    fn error(&self, payload: &Payload) -> Result<Response<Full<Bytes>>, PayloadError> {
        if self.debug {
            let detail = payload
                .output
                .as_ref()
                .map(|o| match o {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .or_else(|| payload.messages.clone())
                .unwrap_or_else(|| "unknown error".to_string());
            return Err(PayloadError::Domain(detail));
        }

        Ok(build_text_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error",
        ))
    }
}

fn unknown(payload: &Payload) -> Response<Full<Bytes>> {
    let status = payload
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .unwrap_or("null");
    build_text_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Invalid Status: \"{status}\""),
    )
}

fn normalize_status(status: &str) -> String {
    status
        .chars()
        .filter(|c| *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}
