use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::state::AppState;
use crate::utils::time::now_millis;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: i64,
    pub users: usize,
    pub checked_in: usize,
    pub admin_sessions: usize,
}

/// Health check handler
///
/// GET /health
pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
            timestamp: now_millis(),
            users: state.store.user_count(),
            checked_in: state.store.open_count(),
            admin_sessions: state.sessions.len(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{add_user, create_test_state, LOCATION};
    use crate::models::user::UserKey;
    use crate::stores::repository::{PresenceChange, Repository};
    use axum::body::Body;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_health_handler() {
        let state = create_test_state();
        let response = health_handler(State(state)).await.into_response();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_response_counts() {
        let state = create_test_state();
        add_user(&state, 20000001, 0, true, None);
        add_user(&state, 20000002, 0, true, None);
        state
            .store
            .transact_presence(UserKey::new(20000001, LOCATION), 5, &mut |_| PresenceChange::Open)
            .unwrap();

        let response = health_handler(State(state)).await.into_response();

        let (parts, body) = response.into_parts();
        assert_eq!(parts.status, StatusCode::OK);

        let bytes = Body::new(body).collect().await.unwrap().to_bytes();
        let health: HealthResponse = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(health.status, "ok");
        assert!(health.timestamp > 0);
        assert_eq!(health.users, 2);
        assert_eq!(health.checked_in, 1);
        assert_eq!(health.admin_sessions, 0);
    }
}
