//! Masking request and response DTOs

use super::validate_identifier;
use crate::masking::{SensitivityType, TargetingStrategy};
use crate::statement::WarehouseSession;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Which schema a scan, preview or run works on
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MaskingRequest {
    #[validate(length(min = 1, message = "Cluster identifier is required"))]
    pub cluster_identifier: String,

    #[validate(length(min = 1, max = 127, message = "Database name is required"))]
    #[validate(custom(function = "validate_identifier"))]
    pub database: String,

    /// Falls back to the configured default schema
    #[validate(custom(function = "validate_identifier"))]
    pub schema: Option<String>,

    /// Run statements as this database user
    #[validate(custom(function = "validate_identifier"))]
    pub db_user: Option<String>,

    /// Defaults to public, analyst_role and admin_role
    #[serde(default)]
    pub strategy: TargetingStrategy,
}

impl MaskingRequest {
    pub fn session(&self) -> WarehouseSession {
        let session = WarehouseSession::new(&self.cluster_identifier, &self.database);
        match &self.db_user {
            Some(user) => session.as_user(user),
            None => session,
        }
    }

    pub fn schema_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.schema.as_deref().unwrap_or(default)
    }
}

/// Column names to classify without touching a warehouse
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ClassifyRequest {
    #[validate(length(min = 1, max = 10000, message = "At least one column name is required"))]
    pub columns: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnClassification {
    pub column: String,
    #[serde(rename = "type")]
    pub sensitivity: Option<SensitivityType>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifyResponse {
    pub classifications: Vec<ColumnClassification>,
    pub sensitive: usize,
}
