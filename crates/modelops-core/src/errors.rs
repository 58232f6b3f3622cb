//! Error types for failure handling across the gateway
//!
//! Errors are split by where they surface. `AgentError` is what the conversation
//! loop and its collaborators return; anything that escapes a model round ends
//! the request. Tool handlers never return it for their own failures: those are
//! folded into structured tool results tagged with a [`FailureKind`] so the model
//! can see and react to them.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::management::ManagementError;

#[derive(Error, Debug, Clone)]
pub enum AgentError {
    #[error("LLM interaction failed: {0}")]
    LLMError(String),
    #[error("Parsing error: {0}")]
    ParsingError(String),
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Resource management call failed: {0}")]
    CollaboratorError(String),
    #[error("Conversation exceeded the maximum of {max_rounds} model rounds")]
    RoundsExhausted { max_rounds: usize },
    #[error("Conversation exceeded its time budget")]
    DeadlineExceeded,
    #[error("Conversation was cancelled")]
    Cancelled,
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("I/O error: {0}")]
    IoError(String),
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<std::io::Error> for AgentError {
    fn from(err: std::io::Error) -> Self {
        AgentError::IoError(err.to_string())
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        AgentError::LLMError(err.to_string())
    }
}

impl From<ManagementError> for AgentError {
    fn from(err: ManagementError) -> Self {
        match err {
            ManagementError::NotFound(msg) => AgentError::NotFound(msg),
            other => AgentError::CollaboratorError(other.to_string()),
        }
    }
}

/// Class of a failure reported back to the model as data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    NotFound,
    Collaborator,
}

impl FailureKind {
    pub fn from_management(err: &ManagementError) -> Self {
        match err {
            ManagementError::NotFound(_) => FailureKind::NotFound,
            _ => FailureKind::Collaborator,
        }
    }
}

/// Structured tool result describing a handler-level failure.
pub fn tool_failure(kind: FailureKind, message: impl Into<String>) -> Value {
    json!({
        "error": message.into(),
        "error_kind": kind,
    })
}
