//! Error types for the Tilecast domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`RunError`] is the only one
//! that ends a generation run early.

use thiserror::Error;

use crate::plan::DashboardPlan;

/// The top-level error type for all Tilecast operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Model provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Generation run errors ---
    #[error("Run error: {0}")]
    Run(#[from] RunError),

    // --- Registry errors ---
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures of the model client. Every variant means the model is
/// unavailable for this iteration.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider produced no text")]
    EmptyResponse,

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Conditions that terminate a generation run before a finished plan.
#[derive(Debug, Clone, Error)]
pub enum RunError {
    #[error("Model unavailable: {0}")]
    ModelUnavailable(#[from] ProviderError),

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    /// A non-finished plan without a usable endpoint or body. Carries the
    /// layout of the violating response so callers still have a last plan.
    #[error("Protocol violation: {reason}")]
    ProtocolViolation {
        reason: String,
        last_plan: Option<Box<DashboardPlan>>,
    },
}

impl RunError {
    /// Short machine-readable name for logs and events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ModelUnavailable(_) => "model_unavailable",
            Self::MalformedResponse(_) => "malformed_response",
            Self::ProtocolViolation { .. } => "protocol_violation",
        }
    }
}

/// Soft, field-local normalization failures. Recorded, never raised.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FieldError {
    #[error("Could not parse coordinates of tile '{tile_id}' ({raw}): {reason}")]
    CoordinateParse {
        tile_id: String,
        raw: String,
        reason: String,
    },

    #[error("Could not parse api_body ({raw}): {reason}")]
    BodyParse { raw: String, reason: String },
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("User already exists: {0}")]
    UserExists(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Endpoint must start with /: {0}")]
    InvalidEndpoint(String),

    #[error("Endpoint {endpoint} already exists for user {owner}")]
    EndpointTaken { endpoint: String, owner: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),
}
