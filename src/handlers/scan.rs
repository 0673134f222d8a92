use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Form,
};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::checkin::resolver::{resolve_scan, Outcome, Scan};
use crate::core::error::KioskError;
use crate::core::state::AppState;
use crate::models::kiosk::{CardReadForm, KioskEvent, ScanResponse};
use crate::models::user::UserKey;
use crate::models::{CardNumber, LocationId};
use crate::stores::repository::Repository;
use crate::utils::time::now_millis;

/// Card reader tap. Kiosk screens of the location are told about the tap
/// and then where to go next.
///
/// POST /card_read/{location_id}  (form: facility, cardnum)
pub async fn card_read_handler(
    State(state): State<Arc<AppState>>,
    Path(location_id): Path<LocationId>,
    Form(form): Form<CardReadForm>,
) -> Result<Response, KioskError> {
    let card_number = form.cardnum.trim().parse::<CardNumber>().map_err(|_| {
        warn!(location_id, cardnum = %form.cardnum, "Unreadable card number");
        KioskError::Validation(format!("Invalid card number '{}'", form.cardnum))
    })?;

    // The facility code is informational only
    let facility = form.facility.trim().parse::<i64>().ok();

    let scan = Scan {
        card_number,
        location_id,
        facility,
    };
    debug!(card = card_number, location_id, facility = ?facility, "Card read");

    let holder = state
        .store
        .card(card_number)
        .and_then(|card| card.sid)
        .and_then(|sid| state.store.user(UserKey::new(sid, location_id)));
    state.events.publish(
        location_id,
        KioskEvent::Scan {
            facility,
            card: card_number,
            location_id,
            sid: holder.as_ref().map(|user| user.sid),
            name: holder.map(|user| user.name),
        },
    );

    let now = now_millis();
    let outcome = resolve_scan(state.store.as_ref(), &scan, now)?;

    let status = match outcome {
        Outcome::LocationNotFound { .. } => StatusCode::NOT_FOUND,
        Outcome::NeedsWaiver { user_id } => {
            state.waivers.mark(UserKey::new(user_id, location_id), now);
            StatusCode::OK
        }
        _ => StatusCode::OK,
    };

    let response = ScanResponse::new(outcome);
    let notified = state.events.publish(
        location_id,
        KioskEvent::Go {
            to: response.next.clone(),
        },
    );
    debug!(location_id, kiosks = notified, next = %response.next, "Kiosks notified");

    Ok((status, Json(response)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{add_user, body_json, create_test_state, LOCATION};
    use crate::models::user::UserKey;

    fn form(cardnum: &str) -> Form<CardReadForm> {
        Form(CardReadForm {
            facility: "12".to_string(),
            cardnum: cardnum.to_string(),
        })
    }

    #[tokio::test]
    async fn test_unknown_card_routes_to_registration() {
        let state = create_test_state();

        let response = card_read_handler(State(state.clone()), Path(LOCATION), form("31337"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["outcome"], "needs_registration");
        assert_eq!(json["card_number"], 31337);
        assert_eq!(json["next"], "/register?card_id=31337");
        assert_eq!(state.store.scans_for(31337).len(), 1);
    }

    #[tokio::test]
    async fn test_check_in_and_out() {
        let state = create_test_state();
        let user = add_user(&state, 20123456, 0, true, None);
        state.store.link_card(4242, user.sid).unwrap();

        let response = card_read_handler(State(state.clone()), Path(LOCATION), form("4242"))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["outcome"], "checked_in");
        assert_eq!(json["next"], "/success/checkin");
        assert!(state.store.open_access(UserKey::new(user.sid, LOCATION)).is_some());

        let response = card_read_handler(State(state.clone()), Path(LOCATION), form("4242"))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["outcome"], "checked_out");
        assert!(state.store.open_access(UserKey::new(user.sid, LOCATION)).is_none());
    }

    #[tokio::test]
    async fn test_unknown_location() {
        let state = create_test_state();

        let response = card_read_handler(State(state.clone()), Path(99), form("4242"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["outcome"], "location_not_found");
        assert_eq!(state.store.scans_for(4242).len(), 1);
    }

    #[tokio::test]
    async fn test_kiosks_receive_scan_and_next_page() {
        let state = create_test_state();
        let user = add_user(&state, 20123456, 0, false, None);
        state.store.link_card(4242, user.sid).unwrap();
        let mut kiosk = state.events.subscribe(LOCATION);
        let mut elsewhere = state.events.subscribe(2);

        card_read_handler(State(state.clone()), Path(LOCATION), form("4242"))
            .await
            .unwrap();

        assert_eq!(
            kiosk.recv().await.unwrap(),
            KioskEvent::Scan {
                facility: Some(12),
                card: 4242,
                location_id: LOCATION,
                sid: Some(user.sid),
                name: Some(user.name.clone()),
            }
        );
        assert_eq!(
            kiosk.recv().await.unwrap(),
            KioskEvent::Go {
                to: "/waiver?sid=20123456".to_string()
            }
        );
        assert!(elsewhere.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unknown_card_event_has_no_holder() {
        let state = create_test_state();
        let mut kiosk = state.events.subscribe(LOCATION);

        card_read_handler(State(state.clone()), Path(LOCATION), form("31337"))
            .await
            .unwrap();

        match kiosk.recv().await.unwrap() {
            KioskEvent::Scan { card, sid, name, .. } => {
                assert_eq!(card, 31337);
                assert!(sid.is_none());
                assert!(name.is_none());
            }
            other => panic!("Expected a scan event, got {:?}", other),
        }
        assert_eq!(
            kiosk.recv().await.unwrap(),
            KioskEvent::Go {
                to: "/register?card_id=31337".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_needs_waiver_opens_waiver_window() {
        let state = create_test_state();
        let user = add_user(&state, 20123456, 0, false, None);
        state.store.link_card(4242, user.sid).unwrap();
        let key = UserKey::new(user.sid, LOCATION);

        card_read_handler(State(state.clone()), Path(LOCATION), form("4242"))
            .await
            .unwrap();

        assert!(state.waivers.take(key, now_millis()));
    }

    #[tokio::test]
    async fn test_invalid_card_number() {
        let state = create_test_state();

        let result = card_read_handler(State(state.clone()), Path(LOCATION), form("not-a-card")).await;
        let response = result.unwrap_err().into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.store.scan_count(), 0);
    }
}
