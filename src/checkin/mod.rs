pub mod registration;
pub mod resolver;
