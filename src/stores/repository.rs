use anyhow::Result;

use crate::models::access::Access;
use crate::models::audit::CardScan;
use crate::models::card::Card;
use crate::models::location::Location;
use crate::models::user::{User, UserKey, UserType};
use crate::models::{CardNumber, LocationId, Sid, Timestamp, TypeId};

/// What a presence transaction should do with the (user, location) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceChange {
    /// Insert a new open Access row
    Open,
    /// Close the currently open Access row
    Close,
    Keep,
}

/// What a presence transaction actually did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceEffect {
    Opened(Access),
    Closed(Access),
    /// Nothing changed; carries the open row if there is one
    Unchanged(Option<Access>),
}

/// Lookups and mutations the check-in logic needs from persistence.
///
/// `transact_presence` is the only way to open or close an Access row for
/// a single user. Implementations run `decide` and apply its result while
/// holding exclusive access to that (user, location) pair, so at most one
/// open row per pair can ever exist.
pub trait Repository: Send + Sync {
    fn location(&self, id: LocationId) -> Option<Location>;

    fn user_type(&self, id: TypeId) -> Option<UserType>;

    fn card(&self, number: CardNumber) -> Option<Card>;

    /// First card linked to a sid, if any
    fn card_for_user(&self, sid: Sid) -> Option<Card>;

    /// Return the card, creating an unlinked one if it is unknown.
    /// The flag is true when the card was created by this call.
    fn ensure_card(&self, number: CardNumber) -> Result<(Card, bool)>;

    fn user(&self, key: UserKey) -> Option<User>;

    /// Apply `update` to a stored user and persist it.
    /// Returns None when the user does not exist.
    fn update_user(&self, key: UserKey, update: &mut dyn FnMut(&mut User)) -> Result<Option<User>>;

    /// Append an audit row for a card tap
    fn record_scan(&self, card: CardNumber, location_id: LocationId, time: Timestamp) -> Result<CardScan>;

    fn transact_presence(
        &self,
        key: UserKey,
        now: Timestamp,
        decide: &mut dyn FnMut(Option<&Access>) -> PresenceChange,
    ) -> Result<PresenceEffect>;

    /// Close every open row at a location in one atomic step.
    /// Returns the rows that were closed.
    fn clear_location(&self, location_id: LocationId, now: Timestamp) -> Result<Vec<Access>>;
}
