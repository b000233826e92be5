// src/gate/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Arguments of a tool invocation, as received from the transport.
pub type Arguments = Map<String, Value>;

// --- Operation categories ---

/// Classifies an operation by its mutation risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationCategory {
    /// Side-effect-free queries (address, balances, history).
    Read,
    /// Builds unsigned transactions or route suggestions; may read the network.
    Prepare,
    /// External market and network metadata.
    Info,
    /// The only category that changes on-chain state.
    Transaction,
}

impl OperationCategory {
    pub const ALL: [OperationCategory; 4] = [
        OperationCategory::Read,
        OperationCategory::Prepare,
        OperationCategory::Info,
        OperationCategory::Transaction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationCategory::Read => "read",
            OperationCategory::Prepare => "prepare",
            OperationCategory::Info => "info",
            OperationCategory::Transaction => "transaction",
        }
    }
}

impl fmt::Display for OperationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("unknown operation category '{0}' (expected read, prepare, info or transaction)")]
pub struct ParseCategoryError(pub String);

impl FromStr for OperationCategory {
    type Err = ParseCategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "read" => Ok(OperationCategory::Read),
            "prepare" => Ok(OperationCategory::Prepare),
            "info" => Ok(OperationCategory::Info),
            "transaction" | "transactions" => Ok(OperationCategory::Transaction),
            other => Err(ParseCategoryError(other.to_string())),
        }
    }
}

// --- Invocation models ---

/// A single tool call handed over by the transport.
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    pub operation_name: String,
    pub arguments: Arguments,
    /// Opaque correlation id supplied by the transport.
    pub request_id: String,
    /// Transport connection the call arrived on, if the transport has one.
    pub session: Option<String>,
}

impl InvocationRequest {
    pub fn new(operation_name: impl Into<String>, arguments: Arguments, request_id: impl Into<String>) -> Self {
        Self {
            operation_name: operation_name.into(),
            arguments,
            request_id: request_id.into(),
            session: None,
        }
    }

    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }
}

/// Client-visible error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Unknown operation, or unknown/expired confirmation token.
    NotFound,
    /// Operation category not permitted by the policy.
    PolicyDenied,
    /// The wallet backend reported an error.
    BackendFailure,
    /// Confirmation expired before a decision arrived.
    Timeout,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::PolicyDenied => "policy_denied",
            ErrorKind::BackendFailure => "backend_failure",
            ErrorKind::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// Why an invocation was refused without running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum RejectReason {
    PolicyDenied { category: OperationCategory },
    DeniedByApprover,
    ConfirmationExpired,
    /// The request id already has a confirmation awaiting approval.
    AlreadyPending,
}

impl RejectReason {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RejectReason::PolicyDenied { .. } => ErrorKind::PolicyDenied,
            RejectReason::DeniedByApprover => ErrorKind::PolicyDenied,
            RejectReason::ConfirmationExpired => ErrorKind::Timeout,
            RejectReason::AlreadyPending => ErrorKind::PolicyDenied,
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::PolicyDenied { category } => {
                write!(f, "operation not permitted: category '{}' is not allowed", category)
            }
            RejectReason::DeniedByApprover => f.write_str("operation denied by approver"),
            RejectReason::ConfirmationExpired => f.write_str("confirmation expired before approval"),
            RejectReason::AlreadyPending => {
                f.write_str("request is already awaiting confirmation")
            }
        }
    }
}

/// Terminal (or parked) outcome of an invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InvocationResult {
    Success { value: Value },
    Rejected { reason: RejectReason },
    Pending { confirmation_token: String, expires_at: DateTime<Utc> },
    Failed { error_kind: ErrorKind, backend_kind: Option<String>, message: String },
}

impl InvocationResult {
    pub fn not_found(message: impl Into<String>) -> Self {
        InvocationResult::Failed {
            error_kind: ErrorKind::NotFound,
            backend_kind: None,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, InvocationResult::Success { .. })
    }

    /// Error classification for anything that is not a success or a pending park.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            InvocationResult::Rejected { reason } => Some(reason.kind()),
            InvocationResult::Failed { error_kind, .. } => Some(*error_kind),
            _ => None,
        }
    }
}

// --- Confirmation models ---

/// Decision delivered by the approval channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Deny,
}

/// A mutating invocation parked until someone approves or denies it.
#[derive(Debug, Clone, Serialize)]
pub struct PendingConfirmation {
    pub token: String,
    pub request_id: String,
    pub operation_name: String,
    pub arguments: Arguments,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PendingConfirmation {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
