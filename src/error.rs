use crate::models::{QuizId, ValidationIssue};
use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteOperation {
    Create,
    Update,
    Publish,
}

impl fmt::Display for RemoteOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RemoteOperation::Create => "create",
            RemoteOperation::Update => "update",
            RemoteOperation::Publish => "publish",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum RemoteCause {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server rejected request with status {status}: {message}")]
    Rejected {
        status: u16,
        code: Option<String>,
        message: String,
        details: Vec<ValidationIssue>,
    },
    #[error("undecodable response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("server returned identifier {returned}, expected {expected}")]
    IdentityMismatch { expected: QuizId, returned: QuizId },
    #[error("server response carries no quiz identifier")]
    MissingIdentifier,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// The single failure kind raised by the remote quiz service.
#[derive(Debug, Error)]
#[error("quiz {operation} failed: {cause}")]
pub struct RemoteError {
    pub operation: RemoteOperation,
    #[source]
    pub cause: RemoteCause,
}

impl RemoteError {
    pub fn new(operation: RemoteOperation, cause: impl Into<RemoteCause>) -> Self {
        Self {
            operation,
            cause: cause.into(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match &self.cause {
            RemoteCause::Rejected { status, .. } => Some(*status),
            RemoteCause::Transport(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("question index {index} is out of range for {len} questions")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("draft cannot {action} yet: {}", describe(.issues))]
    NotReady {
        action: &'static str,
        issues: Vec<ValidationIssue>,
    },
    #[error("a save or publish is already running for {key}")]
    Busy { key: String },
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

fn describe(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|i| format!("{} {}", i.field, i.issue))
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    pub field: String,
    pub issue: String,
}

impl From<ValidationIssue> for ErrorDetail {
    fn from(value: ValidationIssue) -> Self {
        Self {
            field: value.field,
            issue: value.issue,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: ErrorPayload,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<ErrorDetail>,
    pub request_id: String,
}

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub details: Vec<ErrorDetail>,
    pub request_id: String,
}

impl AppError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: Vec::new(),
            request_id: request_id.into(),
        }
    }

    pub fn with_details(mut self, details: Vec<ErrorDetail>) -> Self {
        self.details = details;
        self
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let payload = ErrorBody {
            error: ErrorPayload {
                code: self.code,
                message: self.message,
                details: self.details,
                request_id: self.request_id,
            },
        };
        (self.status, Json(payload)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_error_names_the_operation() {
        let err = RemoteError::new(
            RemoteOperation::Publish,
            RemoteCause::Rejected {
                status: 404,
                code: Some("NOT_FOUND".into()),
                message: "quiz not found".into(),
                details: Vec::new(),
            },
        );
        assert_eq!(err.status(), Some(404));
        assert_eq!(
            err.to_string(),
            "quiz publish failed: server rejected request with status 404: quiz not found"
        );
    }

    #[test]
    fn not_ready_lists_issues() {
        let err = ControllerError::NotReady {
            action: "publish",
            issues: vec![ValidationIssue {
                field: "title".into(),
                issue: "must not be empty".into(),
            }],
        };
        assert_eq!(err.to_string(), "draft cannot publish yet: title must not be empty");
    }
}
