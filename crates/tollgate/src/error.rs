//! Error types for the signup service.

use tollgate_kernel::KernelError;
use tollgate_store::StoreError;
use tollgate_types::SignupKey;

/// Result type for signup operations.
pub type Result<T, E = SignupError> = std::result::Result<T, E>;

/// Coarse error category, used to pick a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Conflict,
    Forbidden,
    NotFound,
    BadRequest,
    TransientConflict,
    Internal,
}

/// Errors surfaced by [`crate::SignupService`].
///
/// Business-rule failures carry a user-facing `message` and a short
/// `details` label. They are deterministic and never retried internally.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SignupError {
    #[error("{message}")]
    Conflict { message: String, details: String },

    #[error("{message}")]
    Forbidden { message: String, details: String },

    #[error("{message}")]
    NotFound { message: String, details: String },

    #[error("{message}")]
    BadRequest { message: String, details: String },

    /// Conditional-update retries were exhausted; safe to retry.
    #[error("signup {key} is being updated concurrently, please retry")]
    TransientConflict { key: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

const CREATE_DETAILS: &str = "error creating signup";
const VERIFY_DETAILS: &str = "error while verifying";

impl SignupError {
    pub fn conflict(message: impl Into<String>, details: impl Into<String>) -> Self {
        SignupError::Conflict {
            message: message.into(),
            details: details.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>, details: impl Into<String>) -> Self {
        SignupError::Forbidden {
            message: message.into(),
            details: details.into(),
        }
    }

    pub fn not_found(message: impl Into<String>, details: impl Into<String>) -> Self {
        SignupError::NotFound {
            message: message.into(),
            details: details.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>, details: impl Into<String>) -> Self {
        SignupError::BadRequest {
            message: message.into(),
            details: details.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        SignupError::Internal {
            message: message.into(),
        }
    }

    pub(crate) fn signup_not_found(key: &SignupKey) -> Self {
        Self::not_found(format!("signup {key} not found"), "signup not found")
    }

    pub(crate) fn reserved_username(username: &str) -> Self {
        Self::forbidden(
            format!("forbidden: failed to create signup for {username}"),
            CREATE_DETAILS,
        )
    }

    pub(crate) fn phone_in_use(e164: &str) -> Self {
        Self::forbidden(
            format!("phone number already in use: cannot register using phone number: {e164}"),
            "phone number already in use",
        )
    }

    /// Maps a kernel rejection onto the service taxonomy.
    pub(crate) fn from_kernel(err: KernelError, key: &SignupKey) -> Self {
        match err {
            KernelError::AlreadyActive { .. } => Self::conflict(err.to_string(), CREATE_DETAILS),
            KernelError::NotFound => Self::signup_not_found(key),
            KernelError::InvalidTransition { .. } => {
                Self::conflict(err.to_string(), "invalid signup state transition")
            }
            KernelError::ActivationRejected(_) | KernelError::EventAlreadyAttached => {
                Self::forbidden(err.to_string(), "activation code rejected")
            }
            KernelError::NoOutstandingVerification
            | KernelError::CodeMismatch
            | KernelError::CodeExpired
            | KernelError::TooManyAttempts { .. }
            | KernelError::DailyLimitExceeded { .. }
            | KernelError::NotAwaitingVerification => {
                Self::forbidden(err.to_string(), VERIFY_DETAILS)
            }
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SignupError::Conflict { .. } => ErrorKind::Conflict,
            SignupError::Forbidden { .. } => ErrorKind::Forbidden,
            SignupError::NotFound { .. } => ErrorKind::NotFound,
            SignupError::BadRequest { .. } => ErrorKind::BadRequest,
            SignupError::TransientConflict { .. } => ErrorKind::TransientConflict,
            SignupError::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Short machine-stable label accompanying the message.
    pub fn details(&self) -> &str {
        match self {
            SignupError::Conflict { details, .. }
            | SignupError::Forbidden { details, .. }
            | SignupError::NotFound { details, .. }
            | SignupError::BadRequest { details, .. } => details,
            SignupError::TransientConflict { .. } => "conflicting concurrent updates",
            SignupError::Internal { .. } => "internal error",
        }
    }
}

impl From<StoreError> for SignupError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::RetriesExhausted { key, .. } => SignupError::TransientConflict { key },
            other => SignupError::internal(other.to_string()),
        }
    }
}
