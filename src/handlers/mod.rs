pub mod admin;
pub mod checkout;
pub mod fallback;
pub mod health;
pub mod kiosk_socket;
pub mod location_auth;
pub mod presence;
pub mod register;
pub mod scan;
pub mod waiver;
