use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::error::CoreError;
use crate::models::access::Access;
use crate::models::card::Card;
use crate::models::user::{User, UserKey};
use crate::models::{CardNumber, LocationId, Sid, Timestamp};
use crate::stores::repository::{PresenceChange, PresenceEffect, Repository};

/// One card tap at a kiosk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scan {
    pub card_number: CardNumber,
    pub location_id: LocationId,
    pub facility: Option<i64>,
}

/// Branch a scan takes, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    LocationNotFound,
    Register,
    CheckOut,
    CheckIn,
    Waiver,
}

impl Decision {
    fn presence_change(self) -> PresenceChange {
        match self {
            Decision::CheckOut => PresenceChange::Close,
            Decision::CheckIn => PresenceChange::Open,
            Decision::LocationNotFound | Decision::Register | Decision::Waiver => PresenceChange::Keep,
        }
    }
}

/// Pick the branch for a scan from everything known about it.
///
/// `user` is the user the card is linked to at the scanned location and
/// `open` is that user's open Access row there.
pub fn decide(location_known: bool, card: Option<&Card>, user: Option<&User>, open: Option<&Access>) -> Decision {
    if !location_known {
        return Decision::LocationNotFound;
    }

    let linked = card.is_some_and(Card::is_linked);
    let Some(user) = user.filter(|_| linked) else {
        return Decision::Register;
    };

    match open {
        Some(_) => Decision::CheckOut,
        None if user.has_signed_waiver() => Decision::CheckIn,
        None => Decision::Waiver,
    }
}

/// What the kiosk should do after a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    NeedsRegistration {
        card_number: CardNumber,
    },
    NeedsWaiver {
        user_id: Sid,
    },
    CheckedIn {
        user_id: Sid,
        location_id: LocationId,
        time: Timestamp,
    },
    CheckedOut {
        user_id: Sid,
        location_id: LocationId,
        time: Timestamp,
    },
    LocationNotFound {
        location_id: LocationId,
    },
}

impl Outcome {
    /// Page the kiosk front end should navigate to
    pub fn next_path(&self) -> String {
        match self {
            Outcome::NeedsRegistration { card_number } => with_query("/register", &[("card_id", *card_number)]),
            Outcome::NeedsWaiver { user_id } => with_query("/waiver", &[("sid", *user_id)]),
            Outcome::CheckedIn { .. } => "/success/checkin".to_string(),
            Outcome::CheckedOut { .. } => "/success/checkout".to_string(),
            Outcome::LocationNotFound { .. } => "/auth".to_string(),
        }
    }
}

fn with_query(path: &str, params: &[(&str, i64)]) -> String {
    match serde_urlencoded::to_string(params) {
        Ok(query) if !query.is_empty() => format!("{}?{}", path, query),
        _ => path.to_string(),
    }
}

/// Resolve a card tap into an outcome and apply its presence change.
///
/// The audit scan is always recorded first. An unknown location records
/// the scan under the unresolved id and changes nothing else.
pub fn resolve_scan<R: Repository + ?Sized>(repo: &R, scan: &Scan, now: Timestamp) -> Result<Outcome, CoreError> {
    repo.record_scan(scan.card_number, scan.location_id, now)?;

    let location_known = repo.location(scan.location_id).is_some();
    let card = repo.card(scan.card_number);
    let user = card
        .as_ref()
        .and_then(|card| card.sid)
        .and_then(|sid| repo.user(UserKey::new(sid, scan.location_id)));

    match (decide(location_known, card.as_ref(), user.as_ref(), None), user) {
        (Decision::LocationNotFound, _) => {
            warn!(
                card = scan.card_number,
                location_id = scan.location_id,
                "Scan at unknown location"
            );
            Ok(Outcome::LocationNotFound {
                location_id: scan.location_id,
            })
        }
        (Decision::Register, _) | (_, None) => {
            if card.is_none() {
                let (_, created) = repo.ensure_card(scan.card_number)?;
                if created {
                    info!(card = scan.card_number, "First scan of unknown card");
                }
            }
            debug!(
                card = scan.card_number,
                location_id = scan.location_id,
                facility = ?scan.facility,
                "Card needs registration"
            );
            Ok(Outcome::NeedsRegistration {
                card_number: scan.card_number,
            })
        }
        (_, Some(user)) => toggle_presence(repo, &user, card.as_ref(), now),
    }
}

/// Check-in/check-out decision for a registered user, made inside the
/// store's presence transaction
fn toggle_presence<R: Repository + ?Sized>(
    repo: &R,
    user: &User,
    card: Option<&Card>,
    now: Timestamp,
) -> Result<Outcome, CoreError> {
    let key = user.key();
    let mut decision = Decision::Waiver;
    let effect = repo.transact_presence(key, now, &mut |open| {
        decision = decide(true, card, Some(user), open);
        decision.presence_change()
    })?;

    let outcome = match effect {
        PresenceEffect::Opened(access) => {
            info!(sid = key.sid, location_id = key.location_id, "User checked in");
            Outcome::CheckedIn {
                user_id: key.sid,
                location_id: key.location_id,
                time: access.time_in,
            }
        }
        PresenceEffect::Closed(access) => {
            info!(sid = key.sid, location_id = key.location_id, "User checked out");
            Outcome::CheckedOut {
                user_id: key.sid,
                location_id: key.location_id,
                time: access.time_out.unwrap_or(now),
            }
        }
        PresenceEffect::Unchanged(_) => {
            debug!(sid = key.sid, location_id = key.location_id, ?decision, "User needs to sign waiver");
            Outcome::NeedsWaiver { user_id: key.sid }
        }
    };

    Ok(outcome)
}

/// Manual checkout from the kiosk button.
///
/// Records a scan with the user's card when they have one. Returns the
/// closed row, or None if the user was not checked in.
pub fn checkout<R: Repository + ?Sized>(repo: &R, key: UserKey, now: Timestamp) -> Result<Option<Access>, CoreError> {
    if repo.location(key.location_id).is_none() {
        return Err(CoreError::NotFound(format!("Location {}", key.location_id)));
    }

    match repo.card_for_user(key.sid) {
        Some(card) => {
            repo.record_scan(card.card, key.location_id, now)?;
        }
        None => debug!(sid = key.sid, "Manual checkout for user without a card"),
    }

    let effect = repo.transact_presence(key, now, &mut |open| match open {
        Some(_) => PresenceChange::Close,
        None => PresenceChange::Keep,
    })?;

    match effect {
        PresenceEffect::Closed(access) => {
            info!(sid = key.sid, location_id = key.location_id, "User checked out manually");
            Ok(Some(access))
        }
        PresenceEffect::Opened(_) | PresenceEffect::Unchanged(_) => Ok(None),
    }
}

/// Record waiver acceptance and check the user in.
///
/// A user who is already present keeps their existing row.
pub fn sign_waiver<R: Repository + ?Sized>(repo: &R, key: UserKey, now: Timestamp) -> Result<Outcome, CoreError> {
    if repo.location(key.location_id).is_none() {
        return Err(CoreError::NotFound(format!("Location {}", key.location_id)));
    }

    repo.update_user(key, &mut |user| user.waiver_signed = Some(now))?
        .ok_or_else(|| CoreError::NotFound(format!("User {}", key.sid)))?;
    info!(sid = key.sid, location_id = key.location_id, "Waiver signed");

    let effect = repo.transact_presence(key, now, &mut |open| match open {
        Some(_) => PresenceChange::Keep,
        None => PresenceChange::Open,
    })?;

    let time = match effect {
        PresenceEffect::Opened(access) | PresenceEffect::Unchanged(Some(access)) => access.time_in,
        PresenceEffect::Closed(_) | PresenceEffect::Unchanged(None) => now,
    };

    Ok(Outcome::CheckedIn {
        user_id: key.sid,
        location_id: key.location_id,
        time,
    })
}

/// Check everyone out of a location at once
pub fn clear_lab<R: Repository + ?Sized>(
    repo: &R,
    location_id: LocationId,
    now: Timestamp,
) -> Result<Vec<Access>, CoreError> {
    if repo.location(location_id).is_none() {
        return Err(CoreError::NotFound(format!("Location {}", location_id)));
    }

    let closed = repo.clear_location(location_id, now)?;
    info!(location_id, closed = closed.len(), "Lab cleared");
    Ok(closed)
}
