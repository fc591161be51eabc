//! Data models and DTOs (Data Transfer Objects)
//!
//! Contains all request/response structures used by the API.

pub mod cluster;
pub mod masking;

// Re-export commonly used types
pub use cluster::*;
pub use masking::*;

use crate::masking::orchestrator::is_identifier;
use serde::Serialize;

/// Generic success response
#[derive(Debug, Serialize)]
pub struct SuccessResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> SuccessResponse<T> {
    pub fn with_data(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn message_only(message: impl Into<String>) -> SuccessResponse<()> {
        SuccessResponse {
            success: true,
            message: message.into(),
            data: None,
        }
    }
}

/// Validate a SQL identifier that ends up in generated statements
fn validate_identifier(name: &str) -> Result<(), validator::ValidationError> {
    if !is_identifier(name) {
        let mut err = validator::ValidationError::new("invalid_identifier");
        err.message = Some(
            "Must start with a letter or underscore and contain only letters, digits, underscores and dollar signs."
                .into(),
        );
        return Err(err);
    }
    Ok(())
}
