use thiserror::Error;

use crate::validator::ValidationError;

#[derive(Error, Debug)]
pub enum Text2SqlError {
    /// The normalized statement was rejected by the safety validator.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("SQL generation failed - {0}")]
    Generation(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl Text2SqlError {
    /// Failures caused by what the caller asked for, as opposed to faults in
    /// the generation machinery. The HTTP layer answers these with 400.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Text2SqlError::Validation(_))
    }
}

impl From<reqwest::Error> for Text2SqlError {
    fn from(err: reqwest::Error) -> Self {
        Text2SqlError::Engine(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Text2SqlError>;
