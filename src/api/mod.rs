//! HTTP status API
mod base;
mod members;

use std::borrow::Cow;

use axum::{
    error_handling::HandleErrorLayer, http::StatusCode, response::IntoResponse, routing, Router,
};
use tokio::time::Duration;
use tower::{BoxError, ServiceBuilder};
use tower_http::trace::TraceLayer;
use tracing::{event, Level};

pub mod paths;

pub use base::AboutResponse;

use crate::gossip::MembershipView;
use crate::node::SharedView;

/// Build the API serving the published membership view
pub fn api(view: SharedView) -> Router {
    Router::new()
        .route(paths::base::ROOT, routing::get(base::root))
        .route(paths::base::HEALTH, routing::get(base::health))
        .route(paths::base::ABOUT, routing::get(base::about))
        .route(paths::membership::MEMBERS, routing::get(members::members))
        .layer(
            ServiceBuilder::new()
                // Handle errors from middleware
                .layer(HandleErrorLayer::new(handle_error))
                .load_shed()
                .timeout(Duration::from_secs(10)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(view)
}

// copy of the published view, so no lock is held across an await
fn read_view(view: &SharedView) -> Result<MembershipView, StatusCode> {
    let published = view.read().map(|published| published.clone());
    published.map_err(|err| {
        event!(
            Level::ERROR,
            message = "Failed reading membership view",
            err = format!("{:?}", err)
        );
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

async fn handle_error(error: BoxError) -> impl IntoResponse {
    if error.is::<tower::timeout::error::Elapsed>() {
        return (StatusCode::REQUEST_TIMEOUT, Cow::from("request timed out"));
    }

    if error.is::<tower::load_shed::error::Overloaded>() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Cow::from("service is overloaded, try again later"),
        );
    }

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Cow::from(format!("Unhandled internal error: {}", error)),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, RwLock};

    use axum::body::Body;
    use axum::extract::State;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::membership::{GossipTerm, MemberId, MemberRecord, MembershipStatus};

    fn view() -> SharedView {
        Arc::new(RwLock::new(MembershipView {
            self_id: MemberId::from("10.0.0.1:8512"),
            joined: true,
            members: vec![MemberRecord {
                id: MemberId::from("10.0.0.2:8512"),
                status: MembershipStatus::Suspect,
                term: GossipTerm::new(3, 2),
            }],
        }))
    }

    #[tokio::test]
    async fn test_health() {
        let response = api(view())
            .oneshot(Request::builder().uri(paths::base::HEALTH).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_unavailable_until_joined() {
        let shared = view();
        shared.write().unwrap().joined = false;
        let response = api(shared)
            .oneshot(Request::builder().uri(paths::base::HEALTH).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_unknown_path() {
        let response = api(view())
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_members_serves_published_view() {
        let shared = view();
        let response = api(shared.clone())
            .oneshot(Request::builder().uri(paths::membership::MEMBERS).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let axum::Json(served) = members::members(State(shared)).await.unwrap();
        assert_eq!(served.members.len(), 1);
        assert_eq!(served.members[0].status, MembershipStatus::Suspect);

        let json = serde_json::to_value(&served).unwrap();
        assert_eq!(json["self_id"], "10.0.0.1:8512");
        assert_eq!(json["members"][0]["status"], "Suspect");
    }

    #[tokio::test]
    async fn test_about_reports_member_and_cluster_size() {
        let axum::Json(about) = base::about(State(view())).await.unwrap();
        assert_eq!(about.name, "murmur");
        assert_eq!(about.member_id, MemberId::from("10.0.0.1:8512"));
        assert_eq!(about.cluster_size, 2);

        let banner = base::root(State(view())).await.unwrap();
        assert_eq!(banner, "murmur member 10.0.0.1:8512");
    }
}
