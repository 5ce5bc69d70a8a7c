//! Generator error types

use crate::Target;
use thiserror::Error;

/// Fatal errors: the plugin cannot produce a response at all
#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed CodeGeneratorRequest: {0}")]
    MalformedRequest(#[from] prost::DecodeError),

    #[error("failed to load stub templates: {0}")]
    Template(String),
}

impl From<minijinja::Error> for GenerateError {
    fn from(err: minijinja::Error) -> Self {
        GenerateError::Template(err.to_string())
    }
}

/// A failure to render one (service, target) pair
///
/// Recovered locally and reported through the response's `error` field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{service} [{target}]: {message}")]
pub struct RenderError {
    pub target: Target,
    /// Fully-qualified service name
    pub service: String,
    pub message: String,
}

impl RenderError {
    pub fn new(target: Target, service: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            target,
            service: service.into(),
            message: message.into(),
        }
    }
}
