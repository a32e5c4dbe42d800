use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnomalyError {
    /// Caller-supplied parameters or data cannot be used as given.
    #[error("validation error: {0}")]
    Validation(String),

    /// The method could not be fitted to otherwise valid data.
    #[error("numerical error: {0}")]
    Numerical(String),
}
