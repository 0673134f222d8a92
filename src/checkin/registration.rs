use tracing::{info, warn};

use crate::core::error::{CoreError, ValidationError};
use crate::models::user::User;
use crate::models::{CardNumber, LocationId, Sid};
use crate::stores::record_store::{Enrollment, RecordStore};
use crate::stores::repository::Repository;
use crate::validation::registration::validate_registration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub sid: Sid,
    pub name: String,
    pub card_number: CardNumber,
    pub location_id: LocationId,
}

/// Create the user with the location's regular type and link the card.
///
/// Refuses an id that is already registered at the location and a card that
/// belongs to someone else. Linking a new card to an existing user is an
/// admin action.
pub fn register(store: &RecordStore, registration: &Registration, min_sid: Sid) -> Result<User, CoreError> {
    let name = validate_registration(registration.sid, &registration.name, min_sid)?;
    let location_id = registration.location_id;

    if store.location(location_id).is_none() {
        return Err(CoreError::NotFound(format!("Location {}", location_id)));
    }

    let regular = store
        .default_type(location_id)
        .ok_or_else(|| CoreError::NotFound(format!("Regular user type for location {}", location_id)))?;

    let user = User::new(registration.sid, location_id, name, Some(regular.id));
    match store.enroll(user, registration.card_number)? {
        Enrollment::Created(user) => {
            info!(
                sid = user.sid,
                location_id,
                card = registration.card_number,
                "User registered"
            );
            Ok(user)
        }
        Enrollment::AlreadyRegistered => {
            warn!(sid = registration.sid, location_id, "Registration for an existing user refused");
            Err(ValidationError::AlreadyRegistered { sid: registration.sid }.into())
        }
        Enrollment::CardInUse(owner) => {
            warn!(
                sid = registration.sid,
                owner,
                card = registration.card_number,
                "Registration with a card of another user refused"
            );
            Err(ValidationError::CardInUse {
                card: registration.card_number,
            }
            .into())
        }
    }
}
