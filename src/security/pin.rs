use tracing::{debug, info};

use super::secret::{verify_secret, HashedSecret};
use crate::core::error::CoreError;
use crate::models::user::UserKey;
use crate::models::LocationId;
use crate::stores::repository::Repository;
use crate::validation::registration::validate_pin;

/// Replace a user's PIN with a fresh salt and digest
pub fn set_pin<R: Repository + ?Sized>(repo: &R, key: UserKey, new_pin: &str) -> Result<(), CoreError> {
    validate_pin(new_pin)?;

    let hashed = HashedSecret::new(new_pin.as_bytes());
    let updated = repo.update_user(key, &mut |user| user.pin = Some(hashed.clone()))?;

    match updated {
        Some(_) => {
            info!(sid = key.sid, location_id = key.location_id, "PIN updated");
            Ok(())
        }
        None => Err(CoreError::NotFound(format!("User {}", key.sid))),
    }
}

/// True only if the user exists, has a PIN, and `attempt` matches it
pub fn verify_pin<R: Repository + ?Sized>(repo: &R, key: UserKey, attempt: &str) -> bool {
    let Some(user) = repo.user(key) else {
        debug!(sid = key.sid, location_id = key.location_id, "PIN check for unknown user");
        return false;
    };

    verify_secret(user.pin.as_ref(), attempt.as_bytes())
}

/// True only if the location exists and `attempt` matches its secret
pub fn verify_location_secret<R: Repository + ?Sized>(repo: &R, location_id: LocationId, attempt: &str) -> bool {
    repo.location(location_id)
        .map(|location| location.verify_secret(attempt))
        .unwrap_or(false)
}
