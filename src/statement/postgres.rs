//! Execution service backed by PostgreSQL-protocol connection pools
//!
//! Each submitted statement runs on its own tokio task against the pool that
//! the cluster registry resolves for (cluster, database). Status transitions
//! are recorded in an in-memory statement table that `describe_statement`
//! reads from.

use crate::cluster::ClusterRegistry;
use crate::error::AppError;
use crate::statement::api::{
    Field, StatementApi, StatementDescription, StatementId, StatementResult, StatementStatus,
    WarehouseSession,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use deadpool_postgres::{Object, Pool};
use postgres_types::Type;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_postgres::Row;
use tracing::{debug, warn};
use uuid::Uuid;

/// Statements untouched for longer than this are dropped from the statement
/// table, whatever their status
const RETENTION_MINUTES: i64 = 15;

#[derive(Debug, Clone)]
struct StatementRecord {
    status: StatementStatus,
    error: Option<String>,
    result: Option<StatementResult>,
    updated_at: DateTime<Utc>,
}

type StatementTable = Arc<RwLock<HashMap<StatementId, StatementRecord>>>;

pub struct PostgresStatementApi {
    clusters: Arc<ClusterRegistry>,
    statements: StatementTable,
}

impl PostgresStatementApi {
    pub fn new(clusters: Arc<ClusterRegistry>) -> Self {
        Self {
            clusters,
            statements: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn set_status(statements: &StatementTable, id: &StatementId, status: StatementStatus) {
        if let Some(record) = statements.write().await.get_mut(id) {
            record.status = status;
            record.updated_at = Utc::now();
        }
    }

    async fn complete(
        statements: &StatementTable,
        id: &StatementId,
        outcome: Result<StatementResult, AppError>,
    ) {
        let mut table = statements.write().await;
        let Some(record) = table.get_mut(id) else {
            return;
        };
        match outcome {
            Ok(result) => {
                record.status = StatementStatus::Finished;
                record.result = Some(result);
            }
            Err(e) => {
                record.status = StatementStatus::Failed;
                record.error = Some(e.to_string());
            }
        }
        record.updated_at = Utc::now();
    }

    async fn run_statement(
        pool: &Pool,
        db_user: Option<&str>,
        sql: &str,
        statements: &StatementTable,
        id: &StatementId,
    ) -> Result<StatementResult, AppError> {
        let client = pool.get().await?;
        Self::set_status(statements, id, StatementStatus::Started).await;

        if let Some(user) = db_user {
            client
                .batch_execute(&format!("SET SESSION AUTHORIZATION {}", quote_ident(user)))
                .await?;
        }

        Self::set_status(statements, id, StatementStatus::Running).await;
        let outcome = async {
            let prepared = client.prepare(sql).await?;
            let rows = client.query(&prepared, &[]).await?;
            let column_names = prepared
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect();
            Ok::<_, tokio_postgres::Error>(StatementResult {
                column_names,
                records: rows.iter().map(convert_row).collect(),
            })
        }
        .await;

        // Pooled connections are shared; never hand one back impersonating a user
        if db_user.is_some() {
            let reset = client.batch_execute("RESET SESSION AUTHORIZATION").await;
            if let Err(e) = reset {
                warn!("Failed to reset session authorization, discarding connection: {}", e);
                drop(Object::take(client));
            }
        }

        Ok(outcome?)
    }

    async fn purge_stale(&self) {
        retain_recent(&mut *self.statements.write().await, Utc::now());
    }
}

/// Drop records not updated within the retention window. A task that never
/// reports back leaves its record non-terminal, so status is not consulted.
fn retain_recent(table: &mut HashMap<StatementId, StatementRecord>, now: DateTime<Utc>) {
    let cutoff = now - Duration::minutes(RETENTION_MINUTES);
    let before = table.len();
    table.retain(|id, r| {
        let keep = r.updated_at > cutoff;
        if !keep && !r.status.is_terminal() {
            warn!(statement_id = %id, "Evicting statement stuck in {:?}", r.status);
        }
        keep
    });
    if table.len() < before {
        debug!("Purged {} stale statement record(s)", before - table.len());
    }
}

#[async_trait]
impl StatementApi for PostgresStatementApi {
    async fn execute_statement(
        &self,
        session: &WarehouseSession,
        sql: &str,
    ) -> Result<StatementId, AppError> {
        let pool = self
            .clusters
            .pool_for(&session.cluster_identifier, &session.database)
            .await?;
        self.purge_stale().await;

        let id = StatementId(Uuid::new_v4().to_string());
        self.statements.write().await.insert(
            id.clone(),
            StatementRecord {
                status: StatementStatus::Submitted,
                error: None,
                result: None,
                updated_at: Utc::now(),
            },
        );

        let statements = self.statements.clone();
        let task_id = id.clone();
        let sql = sql.to_string();
        let db_user = session.db_user.clone();
        tokio::spawn(async move {
            Self::set_status(&statements, &task_id, StatementStatus::Picked).await;
            let outcome =
                Self::run_statement(&pool, db_user.as_deref(), &sql, &statements, &task_id).await;
            if let Err(e) = &outcome {
                debug!(statement_id = %task_id, "Statement failed: {}", e);
            }
            Self::complete(&statements, &task_id, outcome).await;
        });

        Ok(id)
    }

    async fn describe_statement(&self, id: &StatementId) -> Result<StatementDescription, AppError> {
        let statements = self.statements.read().await;
        let record = statements
            .get(id)
            .ok_or_else(|| AppError::NotFound(format!("Statement {} not found", id)))?;

        Ok(StatementDescription {
            id: id.clone(),
            status: record.status,
            error: record.error.clone(),
        })
    }

    async fn get_statement_result(&self, id: &StatementId) -> Result<StatementResult, AppError> {
        let statements = self.statements.read().await;
        let record = statements
            .get(id)
            .ok_or_else(|| AppError::NotFound(format!("Statement {} not found", id)))?;

        match (&record.status, &record.result) {
            (StatementStatus::Finished, Some(result)) => Ok(result.clone()),
            (status, _) => Err(AppError::Execution(format!(
                "Statement {} has no result (status {:?})",
                id, status
            ))),
        }
    }
}

/// Quote an identifier for interpolation into a statement
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn convert_row(row: &Row) -> Vec<Field> {
    (0..row.len()).map(|idx| convert_cell(row, idx)).collect()
}

fn convert_cell(row: &Row, idx: usize) -> Field {
    let ty = row.columns()[idx].type_();
    let field = if *ty == Type::BOOL {
        row.try_get::<_, Option<bool>>(idx).ok().flatten().map(Field::BooleanValue)
    } else if *ty == Type::INT2 {
        row.try_get::<_, Option<i16>>(idx)
            .ok()
            .flatten()
            .map(|v| Field::LongValue(v.into()))
    } else if *ty == Type::INT4 {
        row.try_get::<_, Option<i32>>(idx)
            .ok()
            .flatten()
            .map(|v| Field::LongValue(v.into()))
    } else if *ty == Type::INT8 {
        row.try_get::<_, Option<i64>>(idx).ok().flatten().map(Field::LongValue)
    } else if *ty == Type::FLOAT4 {
        row.try_get::<_, Option<f32>>(idx)
            .ok()
            .flatten()
            .map(|v| Field::DoubleValue(v.into()))
    } else if *ty == Type::FLOAT8 {
        row.try_get::<_, Option<f64>>(idx).ok().flatten().map(Field::DoubleValue)
    } else {
        row.try_get::<_, Option<String>>(idx).ok().flatten().map(Field::StringValue)
    };
    field.unwrap_or(Field::IsNull)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("analyst_user"), "\"analyst_user\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[tokio::test]
    async fn test_unknown_cluster_is_refused_at_submission() {
        let api = PostgresStatementApi::new(Arc::new(ClusterRegistry::new()));
        let session = WarehouseSession::new("missing", "dev");

        let err = api.execute_statement(&session, "SELECT 1").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    fn record(status: StatementStatus, updated_at: DateTime<Utc>) -> StatementRecord {
        StatementRecord {
            status,
            error: None,
            result: None,
            updated_at,
        }
    }

    #[test]
    fn test_retain_recent_evicts_stale_records_of_any_status() {
        let now = Utc::now();
        let stale = now - Duration::minutes(RETENTION_MINUTES + 1);
        let mut table = HashMap::new();
        table.insert(StatementId("stuck".into()), record(StatementStatus::Running, stale));
        table.insert(StatementId("done".into()), record(StatementStatus::Finished, stale));
        table.insert(StatementId("live".into()), record(StatementStatus::Running, now - Duration::minutes(1)));
        table.insert(StatementId("fresh".into()), record(StatementStatus::Finished, now));

        retain_recent(&mut table, now);

        let mut kept: Vec<&str> = table.keys().map(|id| id.0.as_str()).collect();
        kept.sort_unstable();
        assert_eq!(kept, vec!["fresh", "live"]);
    }

    #[tokio::test]
    async fn test_describe_unknown_statement() {
        let api = PostgresStatementApi::new(Arc::new(ClusterRegistry::new()));
        let err = api
            .describe_statement(&StatementId("nope".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
