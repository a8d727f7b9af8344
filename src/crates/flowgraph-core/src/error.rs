//! Crate-wide error taxonomy.
//!
//! Every failure mode the planner and runtime can produce is a variant of
//! [`FlowError`]. There is no automatic retry and no hidden panic path:
//! operator panics surface through [`FlowError::OperatorFailure`] by way of
//! `tokio::task::JoinError`, everything else is a typed `Result`.

use std::fmt;

use crate::descriptor::NodeId;

/// A single validation finding from the planner, tagged by severity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationMessage {
    pub severity: Severity,
    pub message: String,
}

impl ValidationMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self { severity: Severity::Error, message: message.into() }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self { severity: Severity::Warning, message: message.into() }
    }
}

impl fmt::Display for ValidationMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.severity, self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// The crate-level error taxonomy. One variant per category described by the
/// runtime's error handling design: graph validation, type mismatches,
/// missing dependencies, operator failures, loop cap exceedance, and
/// cancellation.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("graph validation failed: {}", summarize(.0))]
    GraphValidation(Vec<ValidationMessage>),

    #[error("node {node}: input socket {socket} expected {expected}, got {got}")]
    TypeMismatch { node: NodeId, socket: String, expected: String, got: String },

    #[error("node {node}: missing required data dependency on socket {socket}")]
    MissingDependency { node: NodeId, socket: String },

    #[error("node {node} failed: {source}")]
    OperatorFailure {
        node: NodeId,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("loop header {header} exceeded its iteration cap")]
    LoopCapExceeded { header: NodeId },

    #[error("execution canceled")]
    Canceled,
}

fn summarize(messages: &[ValidationMessage]) -> String {
    messages
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl FlowError {
    pub fn operator_failure(
        node: NodeId,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        FlowError::OperatorFailure { node, source: Box::new(source) }
    }

    /// True for errors that represent a caller cancellation rather than an
    /// authoring or operator mistake.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, FlowError::Canceled)
    }
}

pub type Result<T> = std::result::Result<T, FlowError>;
