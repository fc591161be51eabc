//! Masking run orchestrator
//!
//! A run scans one schema, then provisions a policy for every sensitive
//! column and every target, one action at a time. Per-action failures are
//! recorded in the run ledger and the run carries on; only validation, scan
//! and user discovery failures abort it.

use crate::config::MaskingConfig;
use crate::error::AppError;
use crate::masking::catalog::PolicyCatalog;
use crate::masking::provisioner::{PolicyPlan, PolicyProvisioner};
use crate::masking::rules::RuleSet;
use crate::masking::scanner::SchemaScanner;
use crate::masking::target::{PolicyTarget, TargetingStrategy};
use crate::masking::templates::PolicyTemplateRegistry;
use crate::masking::types::{LedgerEntry, RunSummary, SensitiveColumns};
use crate::statement::{AsyncStatementTracker, StatementApi, WarehouseSession};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Names that are interpolated into generated SQL
pub static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*$").expect("identifier pattern compiles")
});

pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

fn validate_identifier(kind: &str, name: &str) -> Result<(), AppError> {
    if is_identifier(name) {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "Invalid {} '{}'. Must start with a letter or underscore and contain only letters, digits, underscores and dollar signs.",
            kind, name
        )))
    }
}

fn validate_session(session: &WarehouseSession, schema: &str) -> Result<(), AppError> {
    if session.cluster_identifier.trim().is_empty() {
        return Err(AppError::Validation("Cluster identifier is required".to_string()));
    }
    validate_identifier("database name", &session.database)?;
    validate_identifier("schema name", schema)?;
    if let Some(user) = &session.db_user {
        validate_identifier("database user", user)?;
    }
    Ok(())
}

fn validate_targets(targets: &[PolicyTarget]) -> Result<(), AppError> {
    for target in targets {
        match target {
            PolicyTarget::Public => {}
            PolicyTarget::Role { name, .. } => validate_identifier("role name", name)?,
            PolicyTarget::User { name } => validate_identifier("user name", name)?,
        }
    }
    Ok(())
}

/// SHA-256 over the classification map, stable across runs
pub fn classification_checksum(sensitive: &SensitiveColumns) -> String {
    let mut hasher = Sha256::new();
    for (table, columns) in sensitive {
        for column in columns {
            hasher.update(format!("{}.{}:{}\n", table, column.column, column.sensitivity).as_bytes());
        }
    }
    format!("{:x}", hasher.finalize())
}

/// Dry run result: classifications and the DDL a run would issue
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaskingPreview {
    pub schema: String,
    pub sensitive_columns: SensitiveColumns,
    pub targets: Vec<PolicyTarget>,
    pub plans: Vec<PolicyPlan>,
    /// Template lookups that would fail at apply time
    pub unresolved: Vec<String>,
    pub checksum: String,
}

/// Outcome of one masking run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaskingRun {
    pub run_id: Uuid,
    pub cluster_identifier: String,
    pub database: String,
    pub schema: String,
    pub sensitive_columns: SensitiveColumns,
    pub ledger: Vec<LedgerEntry>,
    #[serde(flatten)]
    pub summary: RunSummary,
    pub checksum: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl MaskingRun {
    /// Every action applied or skipped
    pub fn is_complete(&self) -> bool {
        self.summary.failures() == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.ledger.iter().filter(|entry| entry.is_failure())
    }
}

pub struct Orchestrator {
    tracker: Arc<AsyncStatementTracker>,
    scanner: SchemaScanner,
    provisioner: PolicyProvisioner,
    skip_existing: bool,
}

impl Orchestrator {
    pub fn new(
        api: Arc<dyn StatementApi>,
        templates: Arc<PolicyTemplateRegistry>,
        rules: Arc<RuleSet>,
        config: &MaskingConfig,
    ) -> Self {
        let tracker = Arc::new(AsyncStatementTracker::new(api, config));
        Self {
            scanner: SchemaScanner::new(tracker.clone(), rules),
            provisioner: PolicyProvisioner::new(tracker.clone(), templates),
            tracker,
            skip_existing: config.skip_existing,
        }
    }

    /// Classify a schema without issuing any DDL
    pub async fn scan(
        &self,
        session: &WarehouseSession,
        schema: &str,
    ) -> Result<SensitiveColumns, AppError> {
        validate_session(session, schema)?;
        self.scanner.scan(session, schema).await
    }

    /// Scan and plan every action of a run without executing DDL
    pub async fn preview(
        &self,
        session: &WarehouseSession,
        schema: &str,
        strategy: &TargetingStrategy,
    ) -> Result<MaskingPreview, AppError> {
        validate_session(session, schema)?;
        validate_targets(&strategy.targets())?;

        let sensitive_columns = self.scanner.scan(session, schema).await?;
        let targets = self.resolve_targets(session, strategy).await?;

        let mut plans = Vec::new();
        let mut unresolved = Vec::new();
        for (table, columns) in &sensitive_columns {
            for column in columns {
                for target in &targets {
                    match self.provisioner.plan(schema, table, column, target) {
                        Ok(plan) => plans.push(plan),
                        Err(e) => unresolved.push(e.to_string()),
                    }
                }
            }
        }

        Ok(MaskingPreview {
            schema: schema.to_string(),
            checksum: classification_checksum(&sensitive_columns),
            sensitive_columns,
            targets,
            plans,
            unresolved,
        })
    }

    /// Scan a schema and provision masking policies for every sensitive
    /// column and target
    pub async fn apply_masking(
        &self,
        session: &WarehouseSession,
        schema: &str,
        strategy: &TargetingStrategy,
    ) -> Result<MaskingRun, AppError> {
        validate_session(session, schema)?;
        validate_targets(&strategy.targets())?;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(
            %run_id,
            cluster = %session.cluster_identifier,
            "Starting masking run for {}.{}",
            session.database,
            schema
        );

        let sensitive_columns = match self.scanner.scan(session, schema).await {
            Ok(columns) => columns,
            Err(e) => {
                error!(%run_id, "Schema scan failed, aborting run: {}", e);
                return Err(e);
            }
        };

        let targets = match self.resolve_targets(session, strategy).await {
            Ok(targets) => targets,
            Err(e) => {
                error!(%run_id, "User discovery failed, aborting run: {}", e);
                return Err(e);
            }
        };

        let catalog = if self.skip_existing {
            PolicyCatalog::load(&self.tracker, session).await
        } else {
            PolicyCatalog::empty()
        };

        let mut ledger = Vec::new();
        for (table, columns) in &sensitive_columns {
            for column in columns {
                for target in &targets {
                    let entry = self
                        .provisioner
                        .create_and_attach(session, schema, table, column, target, &catalog)
                        .await;
                    ledger.push(entry);
                }
            }
        }

        let summary = RunSummary::from_ledger(&ledger);
        if summary.failures() > 0 {
            warn!(
                %run_id,
                "Masking run finished with {} failures out of {} actions",
                summary.failures(),
                summary.attempted
            );
        } else {
            info!(
                %run_id,
                "Masking run finished: {} applied, {} skipped",
                summary.succeeded,
                summary.skipped
            );
        }

        Ok(MaskingRun {
            run_id,
            cluster_identifier: session.cluster_identifier.clone(),
            database: session.database.clone(),
            schema: schema.to_string(),
            checksum: classification_checksum(&sensitive_columns),
            sensitive_columns,
            ledger,
            summary,
            started_at,
            finished_at: Utc::now(),
        })
    }

    async fn resolve_targets(
        &self,
        session: &WarehouseSession,
        strategy: &TargetingStrategy,
    ) -> Result<Vec<PolicyTarget>, AppError> {
        if !strategy.needs_user_discovery() {
            return Ok(strategy.targets());
        }

        let users = self.scanner.list_users(session).await?;
        let (valid, invalid): (Vec<String>, Vec<String>) =
            users.into_iter().partition(|user| is_identifier(user));
        if !invalid.is_empty() {
            warn!("Ignoring users with unsafe names: {:?}", invalid);
        }
        info!("Discovered {} database users", valid.len());
        Ok(valid.into_iter().map(|name| PolicyTarget::User { name }).collect())
    }
}
