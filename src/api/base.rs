use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::read_view;
use crate::cli::{APP_NAME, APP_VERSION};
use crate::membership::MemberId;
use crate::node::SharedView;

pub async fn root(State(view): State<SharedView>) -> Result<String, StatusCode> {
    let view = read_view(&view)?;
    Ok(format!("murmur member {}", view.self_id))
}

/// 200 while the node takes part in the cluster, 503 while it is still
/// joining or once it left
pub async fn health(
    State(view): State<SharedView>,
) -> Result<(StatusCode, &'static str), StatusCode> {
    let view = read_view(&view)?;
    if view.joined {
        Ok((StatusCode::OK, "OK"))
    } else {
        Ok((StatusCode::SERVICE_UNAVAILABLE, "not a cluster member"))
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AboutResponse {
    pub name: String,
    pub version: String,
    pub member_id: MemberId,
    // self included
    pub cluster_size: usize,
}

#[instrument(skip(view), level = "debug")]
pub async fn about(State(view): State<SharedView>) -> Result<Json<AboutResponse>, StatusCode> {
    let view = read_view(&view)?;
    Ok(Json(AboutResponse {
        name: APP_NAME.to_string(),
        version: APP_VERSION.to_string(),
        cluster_size: view.members.len() + 1,
        member_id: view.self_id,
    }))
}
