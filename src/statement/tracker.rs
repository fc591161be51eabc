//! Statement tracker
//!
//! Submits one statement and waits for it to reach FINISHED or FAILED,
//! polling at a fixed interval. Gives up once the wait budget measured from
//! submission is spent. Never resubmits.

use crate::config::MaskingConfig;
use crate::error::AppError;
use crate::statement::api::{
    StatementApi, StatementId, StatementResult, StatementStatus, WarehouseSession,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Terminal outcome of one tracked statement
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerOutcome {
    Finished(StatementId),
    /// Remote FAILED/ABORTED, or the submission itself was refused
    Failed {
        id: Option<StatementId>,
        reason: String,
    },
    TimedOut {
        id: StatementId,
        elapsed: Duration,
    },
}

impl TrackerOutcome {
    /// Collapse into a `Result`, keeping failure and timeout distinct
    pub fn into_result(self) -> Result<StatementId, AppError> {
        match self {
            TrackerOutcome::Finished(id) => Ok(id),
            TrackerOutcome::Failed { reason, .. } => Err(AppError::Execution(reason)),
            TrackerOutcome::TimedOut { elapsed, .. } => Err(AppError::Timeout { elapsed }),
        }
    }
}

pub struct AsyncStatementTracker {
    api: Arc<dyn StatementApi>,
    poll_interval: Duration,
    max_wait: Duration,
}

impl AsyncStatementTracker {
    pub fn new(api: Arc<dyn StatementApi>, config: &MaskingConfig) -> Self {
        Self::with_timing(api, config.poll_interval, config.max_wait)
    }

    pub fn with_timing(api: Arc<dyn StatementApi>, poll_interval: Duration, max_wait: Duration) -> Self {
        Self {
            api,
            poll_interval,
            max_wait,
        }
    }

    /// Submit `sql` and wait for a terminal state
    pub async fn submit(&self, session: &WarehouseSession, sql: &str) -> TrackerOutcome {
        let id = match self.api.execute_statement(session, sql).await {
            Ok(id) => id,
            Err(e) => {
                warn!("Statement submission refused: {}", e);
                return TrackerOutcome::Failed {
                    id: None,
                    reason: e.to_string(),
                };
            }
        };
        let submitted_at = Instant::now();
        debug!(statement_id = %id, cluster = %session.cluster_identifier, "Submitted statement");

        loop {
            let elapsed = submitted_at.elapsed();
            if elapsed >= self.max_wait {
                warn!(statement_id = %id, "Statement timed out after {}ms", elapsed.as_millis());
                return TrackerOutcome::TimedOut { id, elapsed };
            }

            let description = match self.api.describe_statement(&id).await {
                Ok(d) => d,
                Err(e) => {
                    return TrackerOutcome::Failed {
                        id: Some(id),
                        reason: format!("Failed to describe statement: {}", e),
                    };
                }
            };

            match description.status {
                StatementStatus::Finished => {
                    debug!(statement_id = %id, "Statement finished after {}ms", elapsed.as_millis());
                    return TrackerOutcome::Finished(id);
                }
                StatementStatus::Failed | StatementStatus::Aborted => {
                    let reason = description
                        .error
                        .unwrap_or_else(|| format!("Statement {:?}", description.status));
                    return TrackerOutcome::Failed { id: Some(id), reason };
                }
                StatementStatus::Submitted
                | StatementStatus::Picked
                | StatementStatus::Started
                | StatementStatus::Running => {}
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Submit and wait, mapping the outcome onto `AppError`
    pub async fn execute(&self, session: &WarehouseSession, sql: &str) -> Result<StatementId, AppError> {
        self.submit(session, sql).await.into_result()
    }

    /// Submit, wait and fetch the result rows
    pub async fn query(&self, session: &WarehouseSession, sql: &str) -> Result<StatementResult, AppError> {
        let id = self.execute(session, sql).await?;
        self.api.get_statement_result(&id).await
    }
}
