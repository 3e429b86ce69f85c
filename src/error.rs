use thiserror::Error;

/// Failures surfaced by planner operations.
#[derive(Debug, Error)]
pub enum PlannerError {
    /// No resolvable identity for the request.
    #[error("unauthorized")]
    Unauthorized,

    /// Required fields missing or contradictory for the given status.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Referenced student or enrollment is absent.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, PlannerError>;

/// Raised when a stored or submitted enum token is not recognized.
#[derive(Debug, Error)]
#[error("unknown {kind} value '{value}'")]
pub struct ParseTokenError {
    pub kind: &'static str,
    pub value: String,
}
