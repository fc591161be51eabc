//! Schema scanner
//!
//! Reads column metadata for one schema through the statement tracker and
//! classifies every column name with the rule set.

use crate::error::AppError;
use crate::masking::rules::RuleSet;
use crate::masking::types::{ClassifiedColumn, ColumnDescriptor, SensitiveColumns};
use crate::statement::{AsyncStatementTracker, StatementResult, WarehouseSession};
use std::sync::Arc;
use tracing::{debug, warn};

/// Excludes the cluster superuser the warehouse uses for maintenance
const LIST_USERS: &str = "SELECT usename::varchar FROM pg_user WHERE usename != 'rdsdb' ORDER BY usename";

pub struct SchemaScanner {
    tracker: Arc<AsyncStatementTracker>,
    rules: Arc<RuleSet>,
}

impl SchemaScanner {
    pub fn new(tracker: Arc<AsyncStatementTracker>, rules: Arc<RuleSet>) -> Self {
        Self { tracker, rules }
    }

    /// Column metadata query for one schema
    pub fn columns_query(schema: &str) -> String {
        format!(
            "SELECT table_name::varchar, column_name::varchar FROM information_schema.columns \
             WHERE table_schema = '{}' ORDER BY table_name, ordinal_position",
            schema.replace('\'', "''")
        )
    }

    /// Read all (table, column) pairs of a schema
    pub async fn columns(
        &self,
        session: &WarehouseSession,
        schema: &str,
    ) -> Result<Vec<ColumnDescriptor>, AppError> {
        let result = self
            .tracker
            .query(session, &Self::columns_query(schema))
            .await?;
        Ok(Self::descriptors(&result))
    }

    /// Scan a schema and keep only columns that match a rule
    pub async fn scan(
        &self,
        session: &WarehouseSession,
        schema: &str,
    ) -> Result<SensitiveColumns, AppError> {
        let columns = self.columns(session, schema).await?;
        let total = columns.len();
        let sensitive = self.classify_all(columns);

        debug!(
            "Scanned {}.{}: {} columns, {} sensitive",
            session.database,
            schema,
            total,
            sensitive.values().map(Vec::len).sum::<usize>()
        );
        Ok(sensitive)
    }

    /// Group classified columns per table, dropping unmatched ones
    pub fn classify_all(&self, columns: Vec<ColumnDescriptor>) -> SensitiveColumns {
        let mut sensitive = SensitiveColumns::new();
        for ColumnDescriptor { table, column } in columns {
            if let Some(sensitivity) = self.rules.classify(&column) {
                sensitive
                    .entry(table)
                    .or_default()
                    .push(ClassifiedColumn { column, sensitivity });
            }
        }
        sensitive
    }

    /// Database users, for user-based targeting
    pub async fn list_users(&self, session: &WarehouseSession) -> Result<Vec<String>, AppError> {
        let result = self.tracker.query(session, LIST_USERS).await?;
        Ok(result
            .records
            .iter()
            .filter_map(|record| record.first().and_then(|f| f.as_str()).map(str::to_string))
            .collect())
    }

    fn descriptors(result: &StatementResult) -> Vec<ColumnDescriptor> {
        result
            .records
            .iter()
            .filter_map(|record| {
                match (
                    record.first().and_then(|f| f.as_str()),
                    record.get(1).and_then(|f| f.as_str()),
                ) {
                    (Some(table), Some(column)) => Some(ColumnDescriptor {
                        table: table.to_string(),
                        column: column.to_string(),
                    }),
                    _ => {
                        warn!("Skipping malformed metadata row: {:?}", record);
                        None
                    }
                }
            })
            .collect()
    }
}
