use serde::{Deserialize, Serialize};

use super::audit::Training;
use super::location::Machine;
use super::user::{User, UserType};
use super::{CardNumber, LocationId, MachineId, Sid, Timestamp, TypeId};
use crate::stores::session_store::SessionScope;

/// Header carrying the admin session token
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub sid: Sid,
    pub location_id: LocationId,
}

#[derive(Deserialize)]
pub struct AuthRequest {
    pub sid: Sid,
    pub location_id: LocationId,
    pub pin: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginStatus {
    /// Send the PIN to /admin/auth
    PinRequired,
    /// No PIN yet; the token may only be used to set one
    PinSetup,
    Authenticated,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    pub status: LoginStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub next: String,
}

#[derive(Deserialize)]
pub struct ChangePinRequest {
    pub pin: String,
}

#[derive(Debug, Serialize)]
pub struct AdminStatusResponse {
    pub sid: Sid,
    pub name: String,
    pub level: i32,
    pub location_id: LocationId,
    pub scope: SessionScope,
}

#[derive(Debug, Serialize)]
pub struct ClearLabResponse {
    pub success: bool,
    pub closed: usize,
    pub next: String,
}

#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    pub sid: Option<String>,
    pub name: Option<String>,
}

/// A user as shown to admins. Never carries the PIN.
#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub sid: Sid,
    pub name: String,
    pub type_id: Option<TypeId>,
    pub type_name: Option<String>,
    pub level: i32,
    pub waiver_signed: Option<Timestamp>,
    pub has_pin: bool,
    pub present: bool,
}

impl UserSummary {
    pub fn new(user: &User, user_type: Option<&UserType>, present: bool) -> Self {
        Self {
            sid: user.sid,
            name: user.name.clone(),
            type_id: user.type_id,
            type_name: user_type.map(|t| t.name.clone()),
            level: user_type.map_or(0, |t| t.level),
            waiver_signed: user.waiver_signed,
            has_pin: user.has_pin(),
            present,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LookupResponse {
    pub results: Vec<UserSummary>,
    /// Only filled in when exactly one user matched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machines: Option<Vec<Machine>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trainings: Option<Vec<Training>>,
    /// Types the admin may assign to the single match
    #[serde(skip_serializing_if = "Option::is_none")]
    pub types: Option<Vec<UserType>>,
}

#[derive(Debug, Deserialize)]
pub struct SidQuery {
    pub sid: Sid,
}

#[derive(Debug, Deserialize)]
pub struct TrainingAddRequest {
    pub student_id: Sid,
    pub machine: MachineId,
}

#[derive(Debug, Deserialize)]
pub struct TrainingRemoveQuery {
    pub id: i64,
}

/// Attach a replacement card to an existing user
#[derive(Debug, Deserialize)]
pub struct CardLinkRequest {
    pub sid: Sid,
    pub card_id: CardNumber,
}

#[derive(Debug, Deserialize)]
pub struct TypeSetQuery {
    pub sid: Sid,
    pub tid: TypeId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::secret::HashedSecret;

    #[test]
    fn test_user_summary_hides_pin() {
        let mut user = User::new(20123456, 1, "Ada Lovelace".to_string(), Some(2));
        user.pin = Some(HashedSecret::new(b"2468"));
        let staff = UserType {
            id: 2,
            name: "Staff".to_string(),
            level: 1,
            location_id: 1,
        };

        let summary = UserSummary::new(&user, Some(&staff), true);
        let json = serde_json::to_string(&summary).unwrap();

        assert!(summary.has_pin);
        assert_eq!(summary.level, 1);
        assert!(!json.contains("digest"));
        assert!(!json.contains("salt"));
    }

    #[test]
    fn test_login_status_serialization() {
        let response = LoginResponse {
            success: true,
            status: LoginStatus::PinRequired,
            token: None,
            next: "/admin/auth".to_string(),
        };
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(json, r#"{"success":true,"status":"pin_required","next":"/admin/auth"}"#);
    }
}
