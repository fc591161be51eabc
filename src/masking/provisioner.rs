//! Policy provisioner
//!
//! Builds and executes the CREATE MASKING POLICY and ATTACH MASKING POLICY
//! statements for one (table, column, target) triple.

use crate::error::AppError;
use crate::masking::catalog::{ExistingPolicy, PolicyCatalog};
use crate::masking::target::PolicyTarget;
use crate::masking::templates::PolicyTemplateRegistry;
use crate::masking::types::{
    ActionStatus, ClassifiedColumn, LedgerEntry, PolicyRecord, ProvisionFailure, ProvisionStage,
};
use crate::statement::{AsyncStatementTracker, WarehouseSession};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Statements planned for one provisioning action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyPlan {
    pub policy_name: String,
    pub table: String,
    pub column: String,
    pub target: PolicyTarget,
    pub expression: String,
    pub create_sql: String,
    pub attach_sql: String,
}

pub fn create_policy_sql(policy_name: &str, column: &str, expression: &str) -> String {
    format!(
        "CREATE MASKING POLICY {} WITH ({} VARCHAR(256)) USING ({})",
        policy_name, column, expression
    )
}

pub fn attach_policy_sql(policy_name: &str, table: &str, column: &str, target: &PolicyTarget) -> String {
    let mut sql = format!("ATTACH MASKING POLICY {} ON {}({})", policy_name, table, column);
    if target.binds_column() {
        sql.push_str(&format!(" USING ({})", column));
    }
    match target {
        PolicyTarget::Public => sql.push_str(" TO PUBLIC"),
        PolicyTarget::Role { name, priority } => {
            sql.push_str(&format!(" TO ROLE {} PRIORITY {}", name, priority))
        }
        PolicyTarget::User { name } => sql.push_str(&format!(" TO USER {}", name)),
    }
    sql
}

/// Tables in the default schema stay unqualified
fn qualified_table(schema: &str, table: &str) -> String {
    if schema == "public" {
        table.to_string()
    } else {
        format!("{}.{}", schema, table)
    }
}

pub struct PolicyProvisioner {
    tracker: Arc<AsyncStatementTracker>,
    templates: Arc<PolicyTemplateRegistry>,
}

impl PolicyProvisioner {
    pub fn new(tracker: Arc<AsyncStatementTracker>, templates: Arc<PolicyTemplateRegistry>) -> Self {
        Self { tracker, templates }
    }

    /// Build the statements without executing anything
    pub fn plan(
        &self,
        schema: &str,
        table: &str,
        column: &ClassifiedColumn,
        target: &PolicyTarget,
    ) -> Result<PolicyPlan, AppError> {
        let policy_name = target.policy_name(table, &column.column);
        let expression =
            self.templates
                .render(target.template_key(), column.sensitivity, &column.column)?;

        Ok(PolicyPlan {
            create_sql: create_policy_sql(&policy_name, &column.column, &expression),
            attach_sql: attach_policy_sql(
                &policy_name,
                &qualified_table(schema, table),
                &column.column,
                target,
            ),
            policy_name,
            table: table.to_string(),
            column: column.column.clone(),
            target: target.clone(),
            expression,
        })
    }

    /// Create the policy and attach it; never fails the caller, the outcome
    /// is reported in the returned ledger entry
    pub async fn create_and_attach(
        &self,
        session: &WarehouseSession,
        schema: &str,
        table: &str,
        column: &ClassifiedColumn,
        target: &PolicyTarget,
        catalog: &PolicyCatalog,
    ) -> LedgerEntry {
        let mut entry = LedgerEntry {
            policy: PolicyRecord {
                policy_name: target.policy_name(table, &column.column),
                table: table.to_string(),
                column: column.column.clone(),
                sensitivity: column.sensitivity,
                target: target.clone(),
                priority: target.priority(),
                created: false,
                attached: false,
            },
            status: ActionStatus::Failed,
            failure: None,
            statements: Vec::new(),
        };

        let plan = match self.plan(schema, table, column, target) {
            Ok(plan) => plan,
            Err(e) => {
                warn!("No template for {}: {}", entry.policy.policy_name, e);
                entry.failure = Some(failure(ProvisionStage::Template, &e, None));
                return entry;
            }
        };

        let mut already_present = false;
        match catalog.policy(&plan.policy_name, &plan.expression) {
            ExistingPolicy::Identical => {
                already_present = true;
                entry.policy.created = true;
            }
            ExistingPolicy::Different { expression } => {
                let e = AppError::Conflict(format!(
                    "Policy {} already exists with a different expression ({})",
                    plan.policy_name, expression
                ));
                warn!("{}", e);
                entry.failure = Some(failure(ProvisionStage::Create, &e, None));
                return entry;
            }
            ExistingPolicy::Absent => {
                entry.statements.push(plan.create_sql.clone());
                if let Err(e) = self.tracker.execute(session, &plan.create_sql).await {
                    warn!("Failed to create masking policy {}: {}", plan.policy_name, e);
                    entry.failure = Some(failure(ProvisionStage::Create, &e, Some(&plan.create_sql)));
                    return entry;
                }
                entry.policy.created = true;
                info!("Created masking policy: {}", plan.policy_name);
            }
        }

        if catalog.is_attached(&plan.policy_name, schema, table, target.grantee()) {
            entry.policy.attached = true;
            entry.status = if already_present {
                ActionStatus::Skipped
            } else {
                ActionStatus::Applied
            };
            return entry;
        }

        entry.statements.push(plan.attach_sql.clone());
        match self.tracker.execute(session, &plan.attach_sql).await {
            Ok(_) => {
                entry.policy.attached = true;
                entry.status = ActionStatus::Applied;
                info!("Attached policy {} to {}", plan.policy_name, target.label());
            }
            Err(e) => {
                warn!("Error attaching policy {} to {}: {}", plan.policy_name, target.label(), e);
                entry.status = ActionStatus::PartiallyApplied;
                entry.failure = Some(failure(ProvisionStage::Attach, &e, Some(&plan.attach_sql)));
            }
        }
        entry
    }
}

fn failure(stage: ProvisionStage, error: &AppError, sql: Option<&str>) -> ProvisionFailure {
    ProvisionFailure {
        stage,
        code: error.code().to_string(),
        message: error.to_string(),
        sql: sql.map(str::to_string),
    }
}
