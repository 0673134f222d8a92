// HTTP routes configuration

use crate::core::state::AppState;
use crate::handlers::{
    admin, checkout, fallback, health, kiosk_socket, location_auth, presence, register, scan, waiver,
};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))

        // Kiosk endpoints
        .route("/card_read/{location_id}", post(scan::card_read_handler))
        .route("/checkout_button/{location_id}", post(checkout::checkout_handler))
        .route("/presence/{location_id}", get(presence::presence_handler))
        .route(
            "/auth",
            get(location_auth::locations_handler).post(location_auth::location_auth_handler),
        )
        .route(
            "/register",
            get(register::register_form_handler).post(register::register_handler),
        )
        .route("/waiver", post(waiver::waiver_handler))
        .route("/events/{location_id}", get(kiosk_socket::kiosk_socket_handler))

        // Admin endpoints (require x-admin-token unless logging in)
        .route("/admin", get(admin::status_handler))
        .route("/admin/login", post(admin::login_handler))
        .route("/admin/auth", post(admin::auth_handler))
        .route("/admin/logout", post(admin::logout_handler))
        .route("/admin/change_pin", post(admin::change_pin_handler))
        .route("/admin/clear_lab", post(admin::clear_lab_handler))
        .route("/admin/lookup", get(admin::lookup_handler))
        .route("/admin/clear_waiver", post(admin::clear_waiver_handler))
        .route("/admin/training/add", post(admin::training_add_handler))
        .route("/admin/training/remove", post(admin::training_remove_handler))
        .route("/admin/card/link", post(admin::card_link_handler))
        .route("/admin/type/set", post(admin::type_set_handler))

        // 404 fallback for all unmatched routes
        .fallback(fallback::fallback_handler)

        .with_state(state)
}
