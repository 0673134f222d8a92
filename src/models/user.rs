use super::{LocationId, Sid, Timestamp, TypeId};
use crate::security::secret::HashedSecret;
use serde::{Deserialize, Serialize};

/// Users are registered per location, so the sid alone is not unique
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserKey {
    pub sid: Sid,
    pub location_id: LocationId,
}

impl UserKey {
    pub fn new(sid: Sid, location_id: LocationId) -> Self {
        Self { sid, location_id }
    }
}

/// A registered card holder at one location
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub sid: Sid,
    pub location_id: LocationId,
    /// Display name, title-cased at registration
    pub name: String,
    pub type_id: Option<TypeId>,
    /// When the liability waiver was accepted; None means not signed
    pub waiver_signed: Option<Timestamp>,
    #[serde(default)]
    pub photo: String,
    /// Admin PIN, only ever stored hashed
    #[serde(default)]
    pub pin: Option<HashedSecret>,
}

impl User {
    pub fn new(sid: Sid, location_id: LocationId, name: String, type_id: Option<TypeId>) -> Self {
        Self {
            sid,
            location_id,
            name,
            type_id,
            waiver_signed: None,
            photo: String::new(),
            pin: None,
        }
    }

    pub fn key(&self) -> UserKey {
        UserKey::new(self.sid, self.location_id)
    }

    pub fn has_signed_waiver(&self) -> bool {
        self.waiver_signed.is_some()
    }

    pub fn has_pin(&self) -> bool {
        self.pin.is_some()
    }
}

/// Permission level of a user at a location.
/// Level 0 is a regular user; higher levels are staff tiers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserType {
    pub id: TypeId,
    pub name: String,
    pub level: i32,
    pub location_id: LocationId,
}

impl UserType {
    pub fn is_staff(&self) -> bool {
        self.level > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_has_no_waiver_or_pin() {
        let user = User::new(20123456, 1, "Ada Lovelace".to_string(), Some(1));

        assert!(!user.has_signed_waiver());
        assert!(!user.has_pin());
        assert_eq!(user.key(), UserKey::new(20123456, 1));
    }

    #[test]
    fn test_user_serialization_omits_missing_optionals() {
        let json = r#"{"sid":20123456,"location_id":1,"name":"Ada","type_id":null,"waiver_signed":null}"#;
        let user: User = serde_json::from_str(json).unwrap();

        assert_eq!(user.photo, "");
        assert!(user.pin.is_none());
    }

    #[test]
    fn test_staff_level() {
        let regular = UserType { id: 1, name: "User".to_string(), level: 0, location_id: 1 };
        let staff = UserType { id: 2, name: "Staff".to_string(), level: 1, location_id: 1 };

        assert!(!regular.is_staff());
        assert!(staff.is_staff());
    }
}
