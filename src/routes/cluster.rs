//! Cluster registration route handlers

use crate::cluster::ClusterInfo;
use crate::error::{validation_error, ApiResult};
use crate::models::{RegisterClusterRequest, SuccessResponse};
use crate::state::SharedState;
use axum::{
    extract::{Path, State},
    Json,
};
use tracing::info;
use validator::Validate;

/// List registered clusters
pub async fn list_clusters(
    State(state): State<SharedState>,
) -> ApiResult<Json<SuccessResponse<Vec<ClusterInfo>>>> {
    let clusters = state.clusters.list().await;
    Ok(Json(SuccessResponse::with_data(
        format!("{} cluster(s) registered.", clusters.len()),
        clusters,
    )))
}

/// Register a cluster from a connection string
pub async fn register_cluster(
    State(state): State<SharedState>,
    Json(payload): Json<RegisterClusterRequest>,
) -> ApiResult<Json<SuccessResponse<ClusterInfo>>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let cluster = state
        .clusters
        .register(&payload.identifier, &payload.connection_string)
        .await?;

    Ok(Json(SuccessResponse::with_data(
        format!("Cluster '{}' registered.", cluster.identifier),
        cluster,
    )))
}

/// Remove a registered cluster
pub async fn deregister_cluster(
    State(state): State<SharedState>,
    Path(identifier): Path<String>,
) -> ApiResult<Json<SuccessResponse<()>>> {
    state.clusters.deregister(&identifier).await?;
    info!("Cluster '{}' removed via API", identifier);
    Ok(Json(SuccessResponse::<()>::message_only(format!(
        "Cluster '{}' removed.",
        identifier
    ))))
}
