//! Scripted in-memory execution service for tests

use crate::error::AppError;
use crate::statement::api::{
    Field, StatementApi, StatementDescription, StatementId, StatementResult, StatementStatus,
    WarehouseSession,
};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// How the fake responds to statements whose SQL contains a needle
#[derive(Debug, Clone)]
pub struct Behavior {
    statuses: Vec<StatementStatus>,
    error: Option<String>,
    result: StatementResult,
    reject: Option<String>,
}

impl Behavior {
    pub fn finish() -> Self {
        Self::statuses(vec![StatementStatus::Finished])
    }

    /// Walk through `statuses`; the last one repeats forever
    pub fn statuses(statuses: Vec<StatementStatus>) -> Self {
        Self {
            statuses,
            error: None,
            result: StatementResult::default(),
            reject: None,
        }
    }

    pub fn fail(message: &str) -> Self {
        Self {
            error: Some(message.to_string()),
            ..Self::statuses(vec![StatementStatus::Running, StatementStatus::Failed])
        }
    }

    pub fn hang() -> Self {
        Self::statuses(vec![StatementStatus::Running])
    }

    pub fn reject(message: &str) -> Self {
        Self {
            reject: Some(message.to_string()),
            ..Self::finish()
        }
    }

    /// Finish with string rows
    pub fn rows(columns: &[&str], records: Vec<Vec<&str>>) -> Self {
        let result = StatementResult {
            column_names: columns.iter().map(|c| c.to_string()).collect(),
            records: records
                .into_iter()
                .map(|r| r.into_iter().map(|v| Field::StringValue(v.to_string())).collect())
                .collect(),
        };
        Self {
            result,
            ..Self::finish()
        }
    }
}

struct Tracked {
    statuses: VecDeque<StatementStatus>,
    error: Option<String>,
    result: StatementResult,
}

#[derive(Default)]
struct ScriptState {
    rules: Vec<(String, Behavior)>,
    submitted: Vec<(WarehouseSession, String)>,
    statements: HashMap<StatementId, Tracked>,
    describe_calls: usize,
}

/// Fake execution service; statements not matching any rule finish immediately
#[derive(Default)]
pub struct ScriptedStatementApi {
    state: Mutex<ScriptState>,
}

impl ScriptedStatementApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a behavior; earlier registrations win when several needles match
    pub fn on(self, needle: &str, behavior: Behavior) -> Self {
        self.state
            .lock()
            .unwrap()
            .rules
            .push((needle.to_string(), behavior));
        self
    }

    pub fn submitted_sql(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .submitted
            .iter()
            .map(|(_, sql)| sql.clone())
            .collect()
    }

    pub fn submitted_sessions(&self) -> Vec<WarehouseSession> {
        self.state
            .lock()
            .unwrap()
            .submitted
            .iter()
            .map(|(session, _)| session.clone())
            .collect()
    }

    pub fn describe_calls(&self) -> usize {
        self.state.lock().unwrap().describe_calls
    }
}

#[async_trait]
impl StatementApi for ScriptedStatementApi {
    async fn execute_statement(
        &self,
        session: &WarehouseSession,
        sql: &str,
    ) -> Result<StatementId, AppError> {
        let mut state = self.state.lock().unwrap();
        let behavior = state
            .rules
            .iter()
            .find(|(needle, _)| sql.contains(needle.as_str()))
            .map(|(_, b)| b.clone())
            .unwrap_or_else(Behavior::finish);

        state.submitted.push((session.clone(), sql.to_string()));

        if let Some(message) = behavior.reject {
            return Err(AppError::NotFound(message));
        }

        let id = StatementId(format!("stmt-{}", state.submitted.len()));
        state.statements.insert(
            id.clone(),
            Tracked {
                statuses: behavior.statuses.into(),
                error: behavior.error,
                result: behavior.result,
            },
        );
        Ok(id)
    }

    async fn describe_statement(&self, id: &StatementId) -> Result<StatementDescription, AppError> {
        let mut state = self.state.lock().unwrap();
        state.describe_calls += 1;
        let tracked = state
            .statements
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("Statement {} not found", id)))?;

        let status = if tracked.statuses.len() > 1 {
            tracked.statuses.pop_front().unwrap_or(StatementStatus::Finished)
        } else {
            tracked.statuses.front().copied().unwrap_or(StatementStatus::Finished)
        };
        let error = if status == StatementStatus::Failed {
            tracked.error.clone()
        } else {
            None
        };

        Ok(StatementDescription {
            id: id.clone(),
            status,
            error,
        })
    }

    async fn get_statement_result(&self, id: &StatementId) -> Result<StatementResult, AppError> {
        let state = self.state.lock().unwrap();
        state
            .statements
            .get(id)
            .map(|t| t.result.clone())
            .ok_or_else(|| AppError::NotFound(format!("Statement {} not found", id)))
    }
}
