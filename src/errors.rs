//! Error type shared by every command.
//!
//! AWS SDK failures are folded into [`AppError`] by [`aws_error`], which keeps
//! the operation name and sorts permission and credential problems into their
//! own variants so they can be reported with a useful hint.

use aws_sdk_ec2::error::{DisplayErrorContext, ProvideErrorMetadata};
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(
        "permission denied for {operation}: {message} (check the IAM policy of the active AWS profile)"
    )]
    PermissionDenied { operation: String, message: String },
    #[error(
        "AWS rejected the credentials for {operation}: {message} (check `aws configure` or the AWS_* environment)"
    )]
    CredentialsRejected { operation: String, message: String },
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0} already exists")]
    AlreadyExists(String),
    #[error("{0} was not created by this tool and cannot be modified")]
    NotManaged(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error("instance {id} is {state}; cannot {action} it")]
    InvalidState {
        id: String,
        state: String,
        action: String,
    },
    #[error("{running} instances are already running (limit {limit}); cannot start more")]
    LimitReached { running: usize, limit: usize },
    #[error("bucket `{bucket}` still holds objects or object versions")]
    BucketNotEmpty { bucket: String },
    #[error("hosted zone `{zone}` still holds {records} record(s) besides NS and SOA")]
    ZoneNotEmpty { zone: String, records: usize },
    #[error("{operation} failed: {message}")]
    Aws {
        operation: String,
        code: Option<String>,
        message: String,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("prompt failed: {0}")]
    Prompt(#[from] dialoguer::Error),
    #[error("could not render JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type AppResult<T> = Result<T, AppError>;

const PERMISSION_CODES: [&str; 4] = [
    "AccessDenied",
    "AccessDeniedException",
    "UnauthorizedOperation",
    "Forbidden",
];

const CREDENTIAL_CODES: [&str; 5] = [
    "AuthFailure",
    "InvalidClientTokenId",
    "ExpiredToken",
    "SignatureDoesNotMatch",
    "UnrecognizedClientException",
];

impl AppError {
    /// Classify an AWS failure by its error code.
    pub fn from_aws_code(operation: &str, code: Option<&str>, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            Some(code) if PERMISSION_CODES.contains(&code) => AppError::PermissionDenied {
                operation: operation.to_string(),
                message,
            },
            Some(code) if CREDENTIAL_CODES.contains(&code) => AppError::CredentialsRejected {
                operation: operation.to_string(),
                message,
            },
            _ => AppError::Aws {
                operation: operation.to_string(),
                code: code.map(str::to_string),
                message,
            },
        }
    }

    /// Error code reported by AWS, if this error came from an AWS call.
    pub fn aws_code(&self) -> Option<&str> {
        match self {
            AppError::Aws { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        AppError::InvalidInput(msg.into())
    }
}

/// Convert any SDK error (usually an `SdkError<OperationError>`) into an [`AppError`].
pub fn aws_error<E>(operation: &str, err: E) -> AppError
where
    E: ProvideErrorMetadata + std::error::Error,
{
    let message = err
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| DisplayErrorContext(&err).to_string());
    AppError::from_aws_code(operation, err.code(), message)
}

/// Convert an SDK request builder failure (missing required field).
pub fn build_error(operation: &str, err: impl std::fmt::Display) -> AppError {
    AppError::Aws {
        operation: operation.to_string(),
        code: None,
        message: format!("invalid request: {err}"),
    }
}
