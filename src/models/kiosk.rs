use serde::{Deserialize, Serialize};

use super::{CardNumber, LocationId, Sid, Timestamp};
use crate::checkin::resolver::Outcome;

/// Form posted by the card reader
#[derive(Debug, Deserialize)]
pub struct CardReadForm {
    #[serde(default)]
    pub facility: String,
    pub cardnum: String,
}

#[derive(Debug, Serialize)]
pub struct ScanResponse {
    pub success: bool,
    #[serde(flatten)]
    pub outcome: Outcome,
    /// Page the kiosk should show next
    pub next: String,
}

impl ScanResponse {
    pub fn new(outcome: Outcome) -> Self {
        Self {
            success: !matches!(outcome, Outcome::LocationNotFound { .. }),
            next: outcome.next_path(),
            outcome,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

impl SuccessResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            next: None,
        }
    }

    pub fn with_next(mut self, next: impl Into<String>) -> Self {
        self.next = Some(next.into());
        self
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutQuery {
    pub sid: Sid,
}

#[derive(Debug, Serialize)]
pub struct PresentUser {
    pub sid: Sid,
    pub name: String,
    pub type_name: Option<String>,
    pub level: i32,
    /// Check-in time of the open Access row
    pub since: Timestamp,
}

/// Who is in the lab right now
#[derive(Debug, Serialize)]
pub struct PresenceResponse {
    pub location_id: LocationId,
    pub students: Vec<PresentUser>,
    /// Highest level first
    pub staff: Vec<PresentUser>,
}

#[derive(Debug, Serialize)]
pub struct LocationSummary {
    pub id: LocationId,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct LocationsResponse {
    pub locations: Vec<LocationSummary>,
}

#[derive(Deserialize)]
pub struct LocationAuthRequest {
    pub location_id: LocationId,
    pub secret: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterQuery {
    pub card_id: CardNumber,
}

/// Registration form prefilled from the directory
#[derive(Debug, Serialize)]
pub struct RegisterPrefill {
    pub card_id: CardNumber,
    pub sid: Option<Sid>,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub sid: Sid,
    pub name: String,
    pub card_id: CardNumber,
    pub location_id: LocationId,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub success: bool,
    pub sid: Sid,
    pub name: String,
    pub next: String,
}

#[derive(Debug, Deserialize)]
pub struct WaiverRequest {
    pub sid: Sid,
    pub location_id: LocationId,
    pub agreed: bool,
}

/// Pushed to the kiosk screens of a location over the event socket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum KioskEvent {
    /// A card was read; sid and name are set when the card belongs to a
    /// user of this location
    Scan {
        facility: Option<i64>,
        card: CardNumber,
        location_id: LocationId,
        sid: Option<Sid>,
        name: Option<String>,
    },
    /// Move the kiosk browser to another page
    Go { to: String },
}
