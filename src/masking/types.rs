//! Shared types for classification, provisioning and run ledgers

use crate::masking::rules::SensitivityType;
use crate::masking::target::PolicyTarget;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A (table, column) pair read from warehouse metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescriptor {
    pub table: String,
    pub column: String,
}

/// A column with its sensitivity type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedColumn {
    pub column: String,
    #[serde(rename = "type")]
    pub sensitivity: SensitivityType,
}

/// Sensitive columns per table, in metadata order within each table
pub type SensitiveColumns = BTreeMap<String, Vec<ClassifiedColumn>>;

/// The policy one provisioning action targets and how far it got
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRecord {
    pub policy_name: String,
    pub table: String,
    pub column: String,
    pub sensitivity: SensitivityType,
    pub target: PolicyTarget,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
    pub created: bool,
    pub attached: bool,
}

/// Where a provisioning action stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionStage {
    Template,
    Create,
    Attach,
}

/// Why a provisioning action did not fully apply
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionFailure {
    pub stage: ProvisionStage,
    /// Error code, see `AppError::code`
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    /// Created and attached
    Applied,
    /// An identical policy and attachment already exist
    Skipped,
    /// Created (or already present) but not attached
    PartiallyApplied,
    Failed,
}

/// One ledger line: a (column, target) provisioning action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub policy: PolicyRecord,
    pub status: ActionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<ProvisionFailure>,
    /// Statements actually submitted for this action
    pub statements: Vec<String>,
}

impl LedgerEntry {
    pub fn is_failure(&self) -> bool {
        matches!(self.status, ActionStatus::PartiallyApplied | ActionStatus::Failed)
    }
}

/// Counts over a run's ledger
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub partial: usize,
    pub failed: usize,
    pub timed_out: usize,
}

impl RunSummary {
    pub fn from_ledger(ledger: &[LedgerEntry]) -> Self {
        let mut summary = RunSummary {
            attempted: ledger.len(),
            ..Default::default()
        };
        for entry in ledger {
            match entry.status {
                ActionStatus::Applied => summary.succeeded += 1,
                ActionStatus::Skipped => summary.skipped += 1,
                ActionStatus::PartiallyApplied => summary.partial += 1,
                ActionStatus::Failed => summary.failed += 1,
            }
            if entry.failure.as_ref().is_some_and(|f| f.code == "TIMEOUT") {
                summary.timed_out += 1;
            }
        }
        summary
    }

    /// Failed plus partially applied actions
    pub fn failures(&self) -> usize {
        self.failed + self.partial
    }
}
