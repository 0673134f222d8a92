use super::{AccessId, LocationId, Sid, Timestamp};
use super::user::UserKey;
use serde::{Deserialize, Serialize};

/// One presence interval of a user at a location.
/// The row is open (user present) while `time_out` is None.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Access {
    pub id: AccessId,
    pub sid: Sid,
    pub location_id: LocationId,
    pub time_in: Timestamp,
    pub time_out: Option<Timestamp>,
}

impl Access {
    pub fn open(id: AccessId, key: UserKey, time_in: Timestamp) -> Self {
        Self {
            id,
            sid: key.sid,
            location_id: key.location_id,
            time_in,
            time_out: None,
        }
    }

    pub fn key(&self) -> UserKey {
        UserKey::new(self.sid, self.location_id)
    }

    pub fn is_open(&self) -> bool {
        self.time_out.is_none()
    }

    /// Close the interval. The checkout always lands strictly after the
    /// checkin, even for a tap in the same millisecond or a clock that
    /// stepped backwards.
    pub fn close(&mut self, now: Timestamp) {
        self.time_out = Some(now.max(self.time_in.saturating_add(1)));
    }
}
