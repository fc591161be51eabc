//! Masking route handlers
//!
//! Scan, preview and apply all take the same request body. Apply answers 200
//! when every action applied or was skipped and 207 when some failed; the
//! ledger in the body says which.

use crate::error::{validation_error, ApiResult, AppError};
use crate::masking::rules::RuleInfo;
use crate::masking::templates::MaskingTemplate;
use crate::masking::types::SensitiveColumns;
use crate::masking::{MaskingPreview, MaskingRun};
use crate::models::{
    ClassifyRequest, ClassifyResponse, ColumnClassification, MaskingRequest, SuccessResponse,
};
use crate::state::SharedState;
use axum::{extract::State, http::StatusCode, Json};
use tracing::{debug, info};
use validator::Validate;

/// Ordered sensitivity rules
pub async fn list_rules(State(state): State<SharedState>) -> Json<SuccessResponse<Vec<RuleInfo>>> {
    Json(SuccessResponse::with_data(
        "Rules are evaluated in order; the first match wins.",
        state.rules.describe(),
    ))
}

/// Registered masking templates
pub async fn list_templates(
    State(state): State<SharedState>,
) -> Json<SuccessResponse<Vec<MaskingTemplate>>> {
    let templates = state.templates.templates();
    Json(SuccessResponse::with_data(
        format!("{} template(s) registered.", templates.len()),
        templates,
    ))
}

/// Classify column names without touching a warehouse
pub async fn classify_columns(
    State(state): State<SharedState>,
    Json(payload): Json<ClassifyRequest>,
) -> ApiResult<Json<SuccessResponse<ClassifyResponse>>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let classifications: Vec<ColumnClassification> = payload
        .columns
        .into_iter()
        .map(|column| ColumnClassification {
            sensitivity: state.rules.classify(&column),
            column,
        })
        .collect();
    let sensitive = classifications.iter().filter(|c| c.sensitivity.is_some()).count();

    Ok(Json(SuccessResponse::with_data(
        format!("{} of {} column(s) are sensitive.", sensitive, classifications.len()),
        ClassifyResponse {
            classifications,
            sensitive,
        },
    )))
}

/// Scan a schema for sensitive columns
pub async fn scan_schema(
    State(state): State<SharedState>,
    Json(payload): Json<MaskingRequest>,
) -> ApiResult<Json<SuccessResponse<SensitiveColumns>>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let schema = payload.schema_or(&state.masking.default_schema);
    let sensitive = state.orchestrator.scan(&payload.session(), schema).await?;

    let columns: usize = sensitive.values().map(Vec::len).sum();
    debug!("Scan of {} found {} sensitive column(s)", schema, columns);

    Ok(Json(SuccessResponse::with_data(
        format!("Found {} sensitive column(s) in {} table(s).", columns, sensitive.len()),
        sensitive,
    )))
}

/// Show the DDL a run would issue
pub async fn preview_masking(
    State(state): State<SharedState>,
    Json(payload): Json<MaskingRequest>,
) -> ApiResult<Json<SuccessResponse<MaskingPreview>>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let schema = payload.schema_or(&state.masking.default_schema);
    let preview = state
        .orchestrator
        .preview(&payload.session(), schema, &payload.strategy)
        .await?;

    Ok(Json(SuccessResponse::with_data(
        format!("{} policy action(s) planned.", preview.plans.len()),
        preview,
    )))
}

/// Run masking for a schema
pub async fn apply_masking(
    State(state): State<SharedState>,
    Json(payload): Json<MaskingRequest>,
) -> ApiResult<(StatusCode, Json<SuccessResponse<MaskingRun>>)> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    // Detached from the request future; a dropped connection does not cancel the run
    let session = payload.session();
    let schema = payload.schema_or(&state.masking.default_schema).to_string();
    let strategy = payload.strategy;
    let runner = state.clone();
    let handle = tokio::spawn(async move {
        runner
            .orchestrator
            .apply_masking(&session, &schema, &strategy)
            .await
    });
    let run = handle
        .await
        .map_err(|e| AppError::Internal(format!("Masking run task failed: {}", e)))??;

    let (status, message) = if run.is_complete() {
        (
            StatusCode::OK,
            format!(
                "Masking applied: {} created, {} already in place.",
                run.summary.succeeded, run.summary.skipped
            ),
        )
    } else {
        (
            StatusCode::MULTI_STATUS,
            format!(
                "Masking partially applied: {} of {} action(s) failed.",
                run.summary.failures(),
                run.summary.attempted
            ),
        )
    };
    info!(run_id = %run.run_id, "{}", message);

    Ok((status, Json(SuccessResponse::with_data(message, run))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ClusterRegistry;
    use crate::config::MaskingConfig;
    use crate::masking::SensitivityType;
    use crate::masking::TargetingStrategy;
    use crate::state::AppState;
    use crate::statement::fake::{Behavior, ScriptedStatementApi};
    use axum::response::IntoResponse;
    use crate::statement::api::StatementStatus;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    fn state(api: ScriptedStatementApi) -> SharedState {
        shared_state(Arc::new(api))
    }

    fn shared_state(api: Arc<ScriptedStatementApi>) -> SharedState {
        let config = MaskingConfig {
            skip_existing: false,
            ..MaskingConfig::default()
        };
        Arc::new(AppState::with_api(Arc::new(ClusterRegistry::new()), api, config))
    }

    fn customer_api() -> ScriptedStatementApi {
        ScriptedStatementApi::new().on(
            "information_schema.columns",
            Behavior::rows(
                &["table_name", "column_name"],
                vec![vec!["customer", "customer_id"], vec!["customer", "e_mail"], vec!["customer", "SSN"]],
            ),
        )
    }

    fn request(schema: &str) -> MaskingRequest {
        MaskingRequest {
            cluster_identifier: "analytics-cluster".into(),
            database: "dev".into(),
            schema: Some(schema.into()),
            db_user: None,
            strategy: TargetingStrategy::default(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_full_success_is_ok() {
        let (status, Json(body)) = assert_ok!(apply_masking(State(state(customer_api())), Json(request("public"))).await);
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.data.unwrap().summary.succeeded, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_partial_failure_is_multi_status() {
        let api = customer_api().on(
            "ATTACH MASKING POLICY mask_customer_SSN_public",
            Behavior::fail("permission denied"),
        );
        let (status, Json(body)) = assert_ok!(apply_masking(State(state(api)), Json(request("public"))).await);
        assert_eq!(status, StatusCode::MULTI_STATUS);
        assert_eq!(body.data.unwrap().summary.partial, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_run_survives_dropped_request() {
        let api = Arc::new(customer_api().on(
            "CREATE MASKING POLICY",
            Behavior::statuses(vec![
                StatementStatus::Running,
                StatementStatus::Running,
                StatementStatus::Finished,
            ]),
        ));
        let handler = apply_masking(State(shared_state(api.clone())), Json(request("public")));
        assert_err!(tokio::time::timeout(Duration::from_millis(100), handler).await);

        tokio::time::sleep(Duration::from_secs(60)).await;

        // one metadata query, then a CREATE and an ATTACH per action
        let sql = api.submitted_sql();
        assert_eq!(sql.len(), 13);
        assert_eq!(sql.iter().filter(|s| s.starts_with("ATTACH MASKING POLICY")).count(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_invalid_schema_is_bad_request() {
        let err = assert_err!(apply_masking(State(state(customer_api())), Json(request("bad-schema"))).await);
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_scan_timeout_is_gateway_timeout() {
        let api = ScriptedStatementApi::new().on("information_schema.columns", Behavior::hang());
        let err = assert_err!(apply_masking(State(state(api)), Json(request("public"))).await);
        assert_eq!(err.into_response().status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn test_classify_is_pure() {
        let Json(body) = assert_ok!(
            classify_columns(
                State(state(ScriptedStatementApi::new())),
                Json(ClassifyRequest {
                    columns: vec!["customer_id".into(), "Email_Address".into(), "ssn_name".into()],
                }),
            )
            .await
        );
        let data = body.data.unwrap();
        assert_eq!(data.sensitive, 2);
        assert_eq!(data.classifications[0].sensitivity, None);
        assert_eq!(data.classifications[1].sensitivity, Some(SensitivityType::Email));
        assert_eq!(data.classifications[2].sensitivity, Some(SensitivityType::Ssn));
    }

    #[tokio::test]
    async fn test_rules_are_listed_in_order() {
        let Json(body) = list_rules(State(state(ScriptedStatementApi::new()))).await;
        let rules = body.data.unwrap();
        assert_eq!(rules.len(), 6);
        assert_eq!(rules[0].sensitivity, SensitivityType::Email);
        assert_eq!(rules[5].sensitivity, SensitivityType::Address);
    }
}
