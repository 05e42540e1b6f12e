//! Shared error type across huddle crates.

use thiserror::Error;

/// Client-facing error codes (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCode {
    /// No resolvable identity for the caller.
    Unauthorized,
    /// Caller is not a member of the target room.
    NotAMember,
    /// Input rejected before reaching any collaborator.
    Validation,
    /// Room or user does not exist.
    NotFound,
    /// Malformed frame or envelope.
    BadRequest,
    /// Unsupported protocol version.
    UnsupportedVersion,
    /// Internal or collaborator failure.
    Internal,
}

impl ClientCode {
    /// String representation used in JSON events.
    pub fn as_str(self) -> &'static str {
        match self {
            ClientCode::Unauthorized => "UNAUTHORIZED",
            ClientCode::NotAMember => "NOT_A_MEMBER",
            ClientCode::Validation => "VALIDATION",
            ClientCode::NotFound => "NOT_FOUND",
            ClientCode::BadRequest => "BAD_REQUEST",
            ClientCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ClientCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, HuddleError>;

/// Unified error type used by core and gateway.
#[derive(Debug, Error)]
pub enum HuddleError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("not a member of this chat room")]
    NotAMember,
    #[error("validation: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("collaborator failure: {0}")]
    Collaborator(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unsupported protocol version")]
    UnsupportedVersion,
    #[error("internal: {0}")]
    Internal(String),
}

impl HuddleError {
    /// Map internal error to a stable client-facing code.
    pub fn client_code(&self) -> ClientCode {
        match self {
            HuddleError::Unauthorized => ClientCode::Unauthorized,
            HuddleError::NotAMember => ClientCode::NotAMember,
            HuddleError::Validation(_) => ClientCode::Validation,
            HuddleError::NotFound(_) => ClientCode::NotFound,
            HuddleError::BadRequest(_) => ClientCode::BadRequest,
            HuddleError::UnsupportedVersion => ClientCode::UnsupportedVersion,
            HuddleError::Collaborator(_) | HuddleError::Internal(_) => ClientCode::Internal,
        }
    }

    /// Text safe to show the caller.
    ///
    /// Collaborator and internal details stay in the logs.
    pub fn client_message(&self) -> String {
        match self {
            HuddleError::Collaborator(_) | HuddleError::Internal(_) => "internal error".to_string(),
            HuddleError::Validation(msg) => msg.clone(),
            other => other.to_string(),
        }
    }

    /// Whether the failure came from a collaborator call and may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, HuddleError::Collaborator(_))
    }
}
