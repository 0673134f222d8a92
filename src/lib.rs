pub mod api;
pub mod checkin;
pub mod core;
pub mod handlers;
pub mod models;
pub mod security;
pub mod stores;
pub mod utils;
pub mod validation;
pub mod wal;
