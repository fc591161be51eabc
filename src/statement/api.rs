//! Asynchronous SQL execution API
//!
//! The warehouse is driven through a submit/describe/fetch protocol: a
//! statement is submitted and receives an opaque id, its status is polled
//! until it reaches a terminal state, and rows are fetched afterwards.

use crate::error::AppError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque statement identifier handed out on submission
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatementId(pub String);

impl fmt::Display for StatementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Remote statement status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatementStatus {
    Submitted,
    Picked,
    Started,
    Running,
    Finished,
    Failed,
    Aborted,
}

impl StatementStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StatementStatus::Finished | StatementStatus::Failed | StatementStatus::Aborted
        )
    }
}

/// Snapshot of a statement as reported by the execution service
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementDescription {
    pub id: StatementId,
    pub status: StatementStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A typed result cell
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    StringValue(String),
    LongValue(i64),
    DoubleValue(f64),
    BooleanValue(bool),
    IsNull,
}

impl Field {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Field::StringValue(s) => Some(s),
            _ => None,
        }
    }
}

/// Rows returned by a finished statement
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementResult {
    pub column_names: Vec<String>,
    pub records: Vec<Vec<Field>>,
}

/// Where a statement runs: cluster, database and optionally the user it runs as
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarehouseSession {
    pub cluster_identifier: String,
    pub database: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_user: Option<String>,
}

impl WarehouseSession {
    pub fn new(cluster_identifier: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            cluster_identifier: cluster_identifier.into(),
            database: database.into(),
            db_user: None,
        }
    }

    pub fn as_user(mut self, db_user: impl Into<String>) -> Self {
        self.db_user = Some(db_user.into());
        self
    }
}

/// Execution service capability injected into the scanner, tracker and provisioner
#[async_trait]
pub trait StatementApi: Send + Sync {
    /// Submit a statement; returns as soon as the service has accepted it
    async fn execute_statement(
        &self,
        session: &WarehouseSession,
        sql: &str,
    ) -> Result<StatementId, AppError>;

    /// Read the current status of a statement
    async fn describe_statement(&self, id: &StatementId) -> Result<StatementDescription, AppError>;

    /// Fetch the rows of a finished statement
    async fn get_statement_result(&self, id: &StatementId) -> Result<StatementResult, AppError>;
}
