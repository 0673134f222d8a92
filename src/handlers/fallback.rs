use axum::{
    http::HeaderMap,
    response::{Html, IntoResponse, Response},
};

use crate::core::error::KioskError;

pub async fn fallback_handler(headers: HeaderMap) -> Response {
    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let is_browser = user_agent.contains("Mozilla")
        || user_agent.contains("Chrome")
        || user_agent.contains("Safari")
        || user_agent.contains("Firefox")
        || user_agent.contains("Edge");

    if is_browser {
        return Html("Page not found. Tap your card at a kiosk to check in.").into_response();
    }

    KioskError::NotFound("Endpoint".to_string()).into_response()
}
