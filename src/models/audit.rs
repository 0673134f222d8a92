use super::{CardNumber, LocationId, MachineId, Sid, Timestamp};
use serde::{Deserialize, Serialize};

/// Audit row written for every card tap, whatever the outcome
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardScan {
    pub id: i64,
    pub card_id: CardNumber,
    pub time: Timestamp,
    /// May reference a location that does not exist
    pub location_id: LocationId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Training {
    pub id: i64,
    pub trainee_id: Sid,
    pub trainer_id: Sid,
    pub machine_id: MachineId,
    pub date: Timestamp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminAction {
    ChangePin,
    ClearLab,
    ClearWaiver,
    AddTraining,
    RemoveTraining,
    SetType,
    LinkCard,
}

/// Record of a mutating admin action
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminLogEntry {
    pub id: i64,
    pub admin_id: Sid,
    pub action: AdminAction,
    pub target_id: Option<Sid>,
    /// Action details as a JSON document
    pub data: String,
    pub location_id: LocationId,
    pub time: Timestamp,
}
