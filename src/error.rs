//! Error types shared by the coordinator, the bus and the popup.

use crate::bus::protocol::{Endpoint, FailureKind, FailureReport};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single field-level validation message for a draft profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Errors raised by coordinator-side state operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// The draft failed validation. Never persisted.
    #[error("invalid profile: {}", join_fields(.0))]
    Validation(Vec<FieldError>),

    /// The named profile no longer exists.
    #[error("profile not found: {0}")]
    NotFound(String),

    /// The durable write failed; in-memory state was left at its last durable value.
    #[error("failed to persist state: {0}")]
    Persistence(String),
}

fn join_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<&CoreError> for FailureReport {
    fn from(err: &CoreError) -> Self {
        match err {
            CoreError::Validation(fields) => FailureReport {
                kind: FailureKind::Validation,
                messages: fields.iter().map(|f| f.to_string()).collect(),
            },
            CoreError::NotFound(name) => {
                FailureReport::new(FailureKind::NotFound, format!("profile not found: {}", name))
            }
            CoreError::Persistence(msg) => FailureReport::new(FailureKind::Persistence, msg),
        }
    }
}

/// Delivery failures on the message bus.
///
/// A missing listener and a slow one are only distinguishable by the timeout the
/// caller applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("no response from {0} within the timeout")]
    Timeout(Endpoint),

    #[error("no listener for {0}")]
    NoListener(Endpoint),

    /// Fire-and-forget message refused because the target's inbox is full.
    #[error("inbox of {0} is full")]
    Full(Endpoint),
}

/// Errors seen by the popup when talking to the coordinator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClientError {
    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("request rejected: {0}")]
    Rejected(FailureReport),

    #[error("unexpected response to {0}")]
    UnexpectedResponse(&'static str),
}

impl ClientError {
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            ClientError::Rejected(report) => Some(report.kind),
            _ => None,
        }
    }
}
