use super::{LocationId, MachineId};
use crate::security::secret::{verify_secret, HashedSecret};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub name: String,
    /// Kiosk pairing secret
    pub secret: Option<HashedSecret>,
}

impl Location {
    pub fn new(id: LocationId, name: String, secret: &str) -> Self {
        Self {
            id,
            name,
            secret: Some(HashedSecret::new(secret.as_bytes())),
        }
    }

    /// Replace the stored secret with a freshly salted one
    pub fn set_secret(&mut self, secret: &str) {
        self.secret = Some(HashedSecret::new(secret.as_bytes()));
    }

    /// Fails closed when no secret is configured
    pub fn verify_secret(&self, attempt: &str) -> bool {
        verify_secret(self.secret.as_ref(), attempt.as_bytes())
    }
}

/// A piece of equipment users get trained on
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
    pub id: MachineId,
    pub name: String,
    pub location_id: LocationId,
}
