use axum::{extract::State, http::StatusCode, Json};
use tracing::instrument;

use super::read_view;
use crate::gossip::MembershipView;
use crate::node::SharedView;

/// The local membership view: this node and every peer it knows
#[instrument(skip(view), level = "debug")]
pub async fn members(State(view): State<SharedView>) -> Result<Json<MembershipView>, StatusCode> {
    read_view(&view).map(Json)
}
