use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::core::error::KioskError;
use crate::core::state::AppState;
use crate::models::kiosk::{LocationAuthRequest, LocationSummary, LocationsResponse, SuccessResponse};
use crate::security::pin::verify_location_secret;

/// Locations a kiosk can be paired with
///
/// GET /auth
pub async fn locations_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let locations = state
        .store
        .locations()
        .into_iter()
        .map(|location| LocationSummary {
            id: location.id,
            name: location.name,
        })
        .collect();

    (StatusCode::OK, Json(LocationsResponse { locations }))
}

/// Pair a kiosk with a location by checking the location secret
///
/// POST /auth  {location_id, secret}
pub async fn location_auth_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LocationAuthRequest>,
) -> Result<Response, KioskError> {
    let location_id = request.location_id;
    let store = Arc::clone(&state.store);

    // Key derivation is slow; keep it off the async workers
    let verified = tokio::task::spawn_blocking(move || {
        verify_location_secret(store.as_ref(), location_id, &request.secret)
    })
    .await
    .map_err(|e| {
        error!(error = %e, "Location secret check panicked");
        KioskError::Internal
    })?;

    if !verified {
        warn!(location_id, "Invalid location secret");
        return Err(KioskError::InvalidSecret);
    }

    info!(location_id, "Kiosk paired with location");

    Ok((
        StatusCode::OK,
        Json(SuccessResponse::new("Location authenticated.").with_next("/")),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{body_json, create_test_state, LOCATION, LOCATION_SECRET};

    #[tokio::test]
    async fn test_locations_listed() {
        let state = create_test_state();

        let response = locations_handler(State(state)).await.into_response();
        let json = body_json(response).await;

        let locations = json["locations"].as_array().unwrap();
        assert_eq!(locations.len(), 2);
        assert_eq!(locations[0]["name"], "Idea Shop");
        assert!(locations[0].get("secret").is_none());
    }

    #[tokio::test]
    async fn test_location_auth() {
        let state = create_test_state();

        let ok = location_auth_handler(
            State(state.clone()),
            Json(LocationAuthRequest {
                location_id: LOCATION,
                secret: LOCATION_SECRET.to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);

        let wrong = location_auth_handler(
            State(state.clone()),
            Json(LocationAuthRequest {
                location_id: LOCATION,
                secret: "other-secret".to_string(),
            }),
        )
        .await;
        assert_eq!(wrong.unwrap_err().into_response().status(), StatusCode::UNAUTHORIZED);

        let unknown = location_auth_handler(
            State(state),
            Json(LocationAuthRequest {
                location_id: 77,
                secret: LOCATION_SECRET.to_string(),
            }),
        )
        .await;
        assert_eq!(unknown.unwrap_err().into_response().status(), StatusCode::UNAUTHORIZED);
    }
}
