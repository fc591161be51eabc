//! Existing masking policies
//!
//! A run loads the warehouse's policy and attachment catalogs once so that
//! re-running against an unchanged schema skips policies that already exist
//! with the same definition.

use crate::error::AppError;
use crate::statement::{AsyncStatementTracker, StatementResult, WarehouseSession};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

const LIST_POLICIES: &str =
    "SELECT policy_name::varchar, policy_expression::varchar FROM svv_masking_policy";

const LIST_ATTACHMENTS: &str = "SELECT policy_name::varchar, schema_name::varchar, \
     table_name::varchar, grantee::varchar FROM svv_attached_masking_policy";

/// What the catalog knows about one policy name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExistingPolicy {
    Absent,
    /// Same expression, or the catalog does not expose one
    Identical,
    Different { expression: String },
}

/// One element of the `policy_expression` JSON array
#[derive(Debug, Deserialize)]
struct CatalogExpression {
    expr: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct AttachmentKey {
    policy_name: String,
    schema: String,
    table: String,
    grantee: String,
}

#[derive(Debug, Clone, Default)]
pub struct PolicyCatalog {
    /// policy name -> normalized expression, if the catalog exposes one
    policies: HashMap<String, Option<String>>,
    attachments: HashSet<AttachmentKey>,
}

impl PolicyCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load both catalogs; any failure degrades to an empty catalog
    pub async fn load(tracker: &AsyncStatementTracker, session: &WarehouseSession) -> Self {
        match Self::try_load(tracker, session).await {
            Ok(catalog) => {
                debug!(
                    "Loaded policy catalog: {} policies, {} attachments",
                    catalog.policies.len(),
                    catalog.attachments.len()
                );
                catalog
            }
            Err(e) => {
                warn!("Policy catalog unavailable, existing policies will not be skipped: {}", e);
                Self::empty()
            }
        }
    }

    async fn try_load(
        tracker: &AsyncStatementTracker,
        session: &WarehouseSession,
    ) -> Result<Self, AppError> {
        let policies = tracker.query(session, LIST_POLICIES).await?;
        let attachments = tracker.query(session, LIST_ATTACHMENTS).await?;
        Ok(Self::from_results(&policies, &attachments))
    }

    fn from_results(policies: &StatementResult, attachments: &StatementResult) -> Self {
        let mut catalog = Self::empty();
        for record in &policies.records {
            if let Some(name) = record.first().and_then(|f| f.as_str()) {
                let expression = record
                    .get(1)
                    .and_then(|f| f.as_str())
                    .map(|cell| normalize(&catalog_expression(cell)));
                catalog.policies.insert(name.to_string(), expression);
            }
        }
        for record in &attachments.records {
            let cell = |i: usize| record.get(i).and_then(|f| f.as_str()).map(str::to_string);
            if let (Some(policy_name), Some(schema), Some(table), Some(grantee)) =
                (cell(0), cell(1), cell(2), cell(3))
            {
                catalog.attachments.insert(AttachmentKey {
                    policy_name,
                    schema,
                    table,
                    grantee: grantee.to_lowercase(),
                });
            }
        }
        catalog
    }

    #[cfg(test)]
    pub fn insert_policy(&mut self, name: &str, expression: Option<&str>) {
        self.policies.insert(name.to_string(), expression.map(normalize));
    }

    #[cfg(test)]
    pub fn insert_attachment(&mut self, policy_name: &str, schema: &str, table: &str, grantee: &str) {
        self.attachments.insert(AttachmentKey {
            policy_name: policy_name.to_string(),
            schema: schema.to_string(),
            table: table.to_string(),
            grantee: grantee.to_lowercase(),
        });
    }

    pub fn policy(&self, name: &str, expression: &str) -> ExistingPolicy {
        match self.policies.get(name) {
            None => ExistingPolicy::Absent,
            Some(None) => ExistingPolicy::Identical,
            Some(Some(existing)) if *existing == normalize(expression) => ExistingPolicy::Identical,
            Some(Some(existing)) => ExistingPolicy::Different {
                expression: existing.clone(),
            },
        }
    }

    pub fn is_attached(&self, policy_name: &str, schema: &str, table: &str, grantee: &str) -> bool {
        self.attachments.contains(&AttachmentKey {
            policy_name: policy_name.to_string(),
            schema: schema.to_string(),
            table: table.to_string(),
            grantee: grantee.to_lowercase(),
        })
    }
}

/// The catalog stores `[{"expr": "...", "type": "..."}]`; anything else is
/// taken as a bare expression
fn catalog_expression(cell: &str) -> String {
    match serde_json::from_str::<Vec<CatalogExpression>>(cell) {
        Ok(items) if !items.is_empty() => items
            .into_iter()
            .map(|item| item.expr)
            .collect::<Vec<_>>()
            .join(", "),
        _ => cell.to_string(),
    }
}

/// Case- and whitespace-insensitive form of an expression
fn normalize(expression: &str) -> String {
    let mut current = expression.trim();
    while let Some(inner) = strip_enclosing_parens(current) {
        current = inner.trim();
    }
    current
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Inner text when the first `(` is closed by the final `)`; parentheses
/// inside string literals do not count
fn strip_enclosing_parens(expression: &str) -> Option<&str> {
    let inner = expression.strip_prefix('(')?.strip_suffix(')')?;
    let mut depth = 0usize;
    let mut in_literal = false;
    for c in inner.chars() {
        match c {
            '\'' => in_literal = !in_literal,
            '(' if !in_literal => depth += 1,
            ')' if !in_literal => {
                if depth == 0 {
                    return None;
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    (depth == 0 && !in_literal).then_some(inner)
}
