//! Page rendering error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PageError {
    /// No embedded template with that name
    #[error("Template not found: {0}")]
    NotFound(String),

    /// Template failed to parse or render
    #[error("Template error: {0}")]
    TemplateError(String),
}
