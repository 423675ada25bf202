use thiserror::Error;

/// Validation and contract errors exposed by `mstlink-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("identifier is empty after stripping non-digit characters")]
    EmptyIdentifier,
    #[error("identifier has {len} digits, expected between {min} and {max}")]
    IdentifierLength { len: usize, min: usize, max: usize },

    #[error("invalid source '{value}', expected one of registry, insurance")]
    InvalidSource { value: String },

    #[error("invalid field category '{value}'")]
    InvalidFieldCategory { value: String },

    #[error("rate limit capacity must be greater than zero")]
    ZeroRateCapacity,
    #[error("rate limit refill window must be greater than zero")]
    ZeroRateWindow,
    #[error("worker pool size must be greater than zero")]
    ZeroWorkers,
    // Field is not named `source`: thiserror would treat that as the
    // std::error::Error source and demand an Error impl.
    #[error("endpoint list for '{source_name}' must contain at least one entry")]
    EmptyEndpointList { source_name: &'static str },
}

/// Top-level error type for core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
