pub mod kiosk_events;
pub mod record_store;
pub mod repository;
pub mod session_store;
pub mod waiver_store;
