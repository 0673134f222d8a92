pub mod permissions;
pub mod pin;
pub mod secret;
