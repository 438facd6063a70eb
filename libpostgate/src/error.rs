//! Error types for Postgate

use thiserror::Error;

use crate::types::{BodyFormat, PostType};

pub type Result<T> = std::result::Result<T, GateError>;

#[derive(Error, Debug)]
pub enum GateError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Request cancelled: {0}")]
    Cancelled(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl GateError {
    /// Stable machine-readable code surfaced in error responses
    pub fn code(&self) -> &'static str {
        match self {
            GateError::Validation(_) => "VALIDATION_ERROR",
            GateError::NotFound(_) => "NOT_FOUND",
            GateError::Conflict(_) => "CONFLICT",
            GateError::Platform(PlatformError::Timeout(_)) => "TIMEOUT",
            GateError::Platform(_) => "UPSTREAM_ERROR",
            GateError::Cancelled(_) => "CANCELLED",
            GateError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            GateError::Cache(_) => "CACHE_ERROR",
            GateError::Config(_) => "CONFIG_ERROR",
        }
    }

    /// HTTP-equivalent status for transports that need one
    pub fn status_code(&self) -> u16 {
        match self {
            GateError::Validation(_) => 400,
            GateError::NotFound(_) => 404,
            GateError::Conflict(_) => 409,
            GateError::Platform(PlatformError::Timeout(_)) => 504,
            GateError::Platform(_) => 502,
            GateError::Cancelled(_) => 499,
            GateError::ServiceUnavailable(_) => 503,
            GateError::Cache(_) | GateError::Config(_) => 500,
        }
    }

    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        exit_code_for(self.code(), self.is_authentication())
    }

    /// Human-readable message without the variant prefix
    pub fn message(&self) -> String {
        match self {
            GateError::Validation(e) => e.to_string(),
            GateError::Platform(e) => e.to_string(),
            GateError::Config(e) => e.to_string(),
            GateError::NotFound(msg)
            | GateError::Conflict(msg)
            | GateError::Cancelled(msg)
            | GateError::ServiceUnavailable(msg)
            | GateError::Cache(msg) => msg.clone(),
        }
    }

    /// Whether a dispatch that failed with this error may be attempted again
    pub fn is_transient(&self) -> bool {
        matches!(self, GateError::Platform(e) if e.is_transient())
    }

    fn is_authentication(&self) -> bool {
        matches!(
            self,
            GateError::Platform(PlatformError::Authentication(_))
                | GateError::Validation(ValidationError::InvalidAuth(_))
                | GateError::Validation(ValidationError::MissingCredentials)
        )
    }
}

/// Map a stable error code to a process exit code
///
/// Kept as a free function so cached error responses, which only carry the
/// code and message, exit the same way as live errors.
pub fn exit_code_for(code: &str, authentication: bool) -> i32 {
    if authentication {
        return 2;
    }
    match code {
        "VALIDATION_ERROR" => 3,
        "NOT_FOUND" => 2,
        "SERVICE_UNAVAILABLE" => 4,
        _ => 1,
    }
}

/// Whether an error message was produced by a credential problem
///
/// Relies on the fixed prefixes of the credential error variants.
pub fn is_authentication_message(message: &str) -> bool {
    ["Invalid credentials:", "Missing credentials:", "Authentication failed:"]
        .iter()
        .any(|prefix| message.starts_with(prefix))
}

/// User-caused request problems, all surfaced as `VALIDATION_ERROR`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Platform is required")]
    MissingPlatform,

    #[error("Platform '{0}' is not supported")]
    NotSupported(String),

    #[error("Missing credentials: provide a channel/account name or inline auth")]
    MissingCredentials,

    #[error(
        "Platform mismatch: channel is configured for '{channel}' but request targets '{requested}'"
    )]
    PlatformMismatch { channel: String, requested: String },

    #[error("Invalid credentials: {0}")]
    InvalidAuth(String),

    #[error("Request must contain a non-empty body or at least one media field")]
    MissingContent,

    #[error("Ambiguous media fields: cannot use '{first}' and '{second}' together")]
    AmbiguousMedia {
        first: &'static str,
        second: &'static str,
    },

    #[error("Platform '{platform}' does not support post type {post_type}")]
    UnsupportedType { platform: String, post_type: PostType },

    #[error("Conversion from {from} to {to} is not available")]
    ConversionUnavailable { from: BodyFormat, to: BodyFormat },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value: {0}")]
    Invalid(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Content rejected: {0}")]
    Validation(String),

    #[error("Posting failed: {0}")]
    Posting(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Request timed out: {0}")]
    Timeout(String),
}

impl PlatformError {
    /// Transient errors include network issues, rate limiting and timeouts.
    /// Permanent errors include authentication and content rejections.
    pub fn is_transient(&self) -> bool {
        match self {
            PlatformError::Network(_) | PlatformError::RateLimit(_) | PlatformError::Timeout(_) => {
                true
            }
            PlatformError::Authentication(_)
            | PlatformError::Validation(_)
            | PlatformError::Posting(_) => false,
        }
    }
}
