use super::{CardNumber, Sid};
use serde::{Deserialize, Serialize};

/// A physical id card. The holder link stays empty until registration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub card: CardNumber,
    pub sid: Option<Sid>,
}

impl Card {
    pub fn unlinked(card: CardNumber) -> Self {
        Self { card, sid: None }
    }

    pub fn is_linked(&self) -> bool {
        self.sid.is_some()
    }
}
