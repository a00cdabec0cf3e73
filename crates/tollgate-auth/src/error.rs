//! Authentication and authorization error types.
//!
//! Every error carries a stable machine-readable code ([`AuthError::code`]),
//! a message that is safe to return to callers ([`AuthError::public_message`])
//! and, for infrastructure failures, an optional internal cause that is only
//! ever written to logs ([`AuthError::cause`]).

use std::fmt;

/// Errors that can occur during token issuance, validation and revocation.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The request is malformed or missing a required parameter.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of why the request is invalid.
        message: String,
    },

    /// The client is unknown or the presented secret does not match.
    #[error("Invalid client: {message}")]
    InvalidClient {
        /// Description of why the client is invalid.
        message: String,
    },

    /// The authorization server does not support the requested grant type.
    #[error("Unsupported grant type: {grant_type}")]
    UnsupportedGrantType {
        /// The unsupported grant type.
        grant_type: String,
    },

    /// The request lacks a usable bearer credential.
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Description of why the request is unauthorized.
        message: String,
    },

    /// The credential signature or algorithm does not verify.
    #[error("Invalid token signature")]
    InvalidSignature,

    /// The credential cannot be parsed or is missing required claims.
    #[error("Malformed token: {message}")]
    MalformedToken {
        /// Description of the parse failure.
        message: String,
    },

    /// The credential has expired.
    #[error("Token expired")]
    TokenExpired,

    /// The credential has been explicitly revoked.
    #[error("Token revoked")]
    TokenRevoked,

    /// The credential is valid but does not grant the requested scope.
    #[error("Scope not authorized: {scope}")]
    InsufficientScope {
        /// The scope that was requested.
        scope: String,
    },

    /// A requested entity does not exist.
    #[error("Not found: {message}")]
    NotFound {
        /// Description of what was not found.
        message: String,
    },

    /// The entity already exists.
    #[error("Conflict: {message}")]
    Conflict {
        /// Description of the conflict.
        message: String,
    },

    /// A credential could not be confirmed as valid.
    #[error("Validation failed: {message}")]
    ValidationFailed {
        /// Description of the failed check.
        message: String,
        /// Internal cause, logged only.
        cause: Option<String>,
    },

    /// An error occurred while reading or writing durable state.
    #[error("Storage error: {message}")]
    Storage {
        /// Operation context.
        message: String,
        /// Driver-level cause, logged only.
        cause: Option<String>,
    },

    /// A storage call did not complete within its deadline.
    #[error("Operation timed out: {operation}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
    },

    /// The service is shutting down or a dependency is unavailable.
    #[error("Service unavailable: {message}")]
    ServiceUnavailable {
        /// Description of the unavailability.
        message: String,
    },

    /// A background component was stopped more than once.
    #[error("{component} already stopped")]
    AlreadyStopped {
        /// The component name.
        component: &'static str,
    },

    /// The configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
        /// Underlying cause, logged only.
        cause: Option<String>,
    },
}

impl AuthError {
    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidClient` error.
    #[must_use]
    pub fn invalid_client(message: impl Into<String>) -> Self {
        Self::InvalidClient {
            message: message.into(),
        }
    }

    /// Creates a new `UnsupportedGrantType` error.
    #[must_use]
    pub fn unsupported_grant_type(grant_type: impl Into<String>) -> Self {
        Self::UnsupportedGrantType {
            grant_type: grant_type.into(),
        }
    }

    /// Creates a new `Unauthorized` error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Creates a new `MalformedToken` error.
    #[must_use]
    pub fn malformed_token(message: impl Into<String>) -> Self {
        Self::MalformedToken {
            message: message.into(),
        }
    }

    /// Creates a new `InsufficientScope` error.
    #[must_use]
    pub fn insufficient_scope(scope: impl Into<String>) -> Self {
        Self::InsufficientScope {
            scope: scope.into(),
        }
    }

    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates a new `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates a new `ValidationFailed` error.
    #[must_use]
    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            message: message.into(),
            cause: None,
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            cause: None,
        }
    }

    /// Creates a new `Timeout` error.
    #[must_use]
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Creates a new `ServiceUnavailable` error.
    #[must_use]
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            cause: None,
        }
    }

    /// Attaches an internal cause. No-op for variants that do not carry one.
    #[must_use]
    pub fn with_cause(mut self, err: impl fmt::Display) -> Self {
        match &mut self {
            Self::ValidationFailed { cause, .. }
            | Self::Storage { cause, .. }
            | Self::Internal { cause, .. } => *cause = Some(err.to_string()),
            _ => {}
        }
        self
    }

    /// Returns the internal cause, if any. Never send this to a caller.
    #[must_use]
    pub fn cause(&self) -> Option<&str> {
        match self {
            Self::ValidationFailed { cause, .. }
            | Self::Storage { cause, .. }
            | Self::Internal { cause, .. } => cause.as_deref(),
            _ => None,
        }
    }

    /// Returns `true` if this is a client error (4xx category).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidRequest { .. }
                | Self::InvalidClient { .. }
                | Self::UnsupportedGrantType { .. }
                | Self::Unauthorized { .. }
                | Self::InvalidSignature
                | Self::MalformedToken { .. }
                | Self::TokenExpired
                | Self::TokenRevoked
                | Self::InsufficientScope { .. }
                | Self::NotFound { .. }
                | Self::Conflict { .. }
                | Self::ValidationFailed { .. }
        )
    }

    /// Returns `true` if this is a server error (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Storage { .. }
                | Self::Timeout { .. }
                | Self::ServiceUnavailable { .. }
                | Self::AlreadyStopped { .. }
                | Self::Configuration { .. }
                | Self::Internal { .. }
        )
    }

    /// Returns `true` if a presented credential was rejected.
    ///
    /// These all surface to callers as the same unauthorized response.
    #[must_use]
    pub fn is_token_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidSignature
                | Self::MalformedToken { .. }
                | Self::TokenExpired
                | Self::TokenRevoked
                | Self::ValidationFailed { .. }
        )
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidRequest { .. } | Self::UnsupportedGrantType { .. } => {
                ErrorCategory::Validation
            }
            Self::InvalidClient { .. } | Self::Unauthorized { .. } => {
                ErrorCategory::Authentication
            }
            Self::InvalidSignature
            | Self::MalformedToken { .. }
            | Self::TokenExpired
            | Self::TokenRevoked
            | Self::ValidationFailed { .. } => ErrorCategory::Token,
            Self::InsufficientScope { .. } => ErrorCategory::Authorization,
            Self::NotFound { .. } | Self::Conflict { .. } => ErrorCategory::Validation,
            Self::Storage { .. } | Self::Timeout { .. } | Self::ServiceUnavailable { .. } => {
                ErrorCategory::Infrastructure
            }
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::AlreadyStopped { .. } | Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns the stable machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => "invalid_request",
            Self::InvalidClient { .. } => "invalid_client",
            Self::UnsupportedGrantType { .. } => "unsupported_grant_type",
            Self::Unauthorized { .. } => "unauthorized",
            Self::InvalidSignature
            | Self::MalformedToken { .. }
            | Self::TokenExpired
            | Self::TokenRevoked
            | Self::ValidationFailed { .. } => "invalid_token",
            Self::InsufficientScope { .. } => "insufficient_scope",
            Self::NotFound { .. } => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::Timeout { .. } => "timeout",
            Self::ServiceUnavailable { .. } => "service_unavailable",
            Self::Storage { .. } => "storage_error",
            Self::AlreadyStopped { .. } | Self::Configuration { .. } | Self::Internal { .. } => {
                "server_error"
            }
        }
    }

    /// Returns a message that is safe to send to callers.
    ///
    /// Token rejections collapse into one message so a caller cannot tell
    /// which check failed. Infrastructure errors never expose driver detail.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            _ if self.is_token_rejection() => "The access token is invalid or expired".to_string(),
            Self::InvalidClient { .. } => "Client authentication failed".to_string(),
            Self::Storage { .. } | Self::AlreadyStopped { .. } | Self::Configuration { .. } => {
                "Internal server error".to_string()
            }
            Self::Internal { .. } => "Internal server error".to_string(),
            Self::Timeout { .. } => "The request timed out".to_string(),
            Self::InsufficientScope { .. } => {
                "The access token does not grant access to this resource".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Categories of errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Client authentication errors.
    Authentication,
    /// Scope/permission errors.
    Authorization,
    /// Presented-credential errors.
    Token,
    /// Request validation errors.
    Validation,
    /// Storage and dependency errors.
    Infrastructure,
    /// Configuration errors.
    Configuration,
    /// Internal server errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::Authorization => write!(f, "authorization"),
            Self::Token => write!(f, "token"),
            Self::Validation => write!(f, "validation"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
