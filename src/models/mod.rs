pub mod access;
pub mod admin;
pub mod audit;
pub mod card;
pub mod kiosk;
pub mod location;
pub mod user;

/// Student/staff id number printed on the card holder's record
pub type Sid = i64;
pub type LocationId = i32;
pub type CardNumber = i64;
pub type TypeId = i32;
pub type MachineId = i32;
pub type AccessId = i64;

/// Milliseconds since the Unix epoch
pub type Timestamp = i64;
