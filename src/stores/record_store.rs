use anyhow::{anyhow, bail, Context, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::repository::{PresenceChange, PresenceEffect, Repository};
use crate::models::access::Access;
use crate::models::audit::{AdminAction, AdminLogEntry, CardScan, Training};
use crate::models::card::Card;
use crate::models::location::{Location, Machine};
use crate::models::user::{User, UserKey, UserType};
use crate::models::{AccessId, CardNumber, LocationId, MachineId, Sid, Timestamp, TypeId};
use crate::wal::wal::{Wal, WalOperation};

/// Result of `RecordStore::enroll`
#[derive(Debug, Clone, PartialEq)]
pub enum Enrollment {
    Created(User),
    /// The (sid, location) already has a user; nothing was changed
    AlreadyRegistered,
    /// The card is linked to this other sid; nothing was changed
    CardInUse(Sid),
}

#[derive(Debug)]
struct IdSequences {
    location: AtomicI64,
    user_type: AtomicI64,
    machine: AtomicI64,
    access: AtomicI64,
    scan: AtomicI64,
    training: AtomicI64,
    admin_log: AtomicI64,
}

impl IdSequences {
    fn new() -> Self {
        Self {
            location: AtomicI64::new(1),
            user_type: AtomicI64::new(1),
            machine: AtomicI64::new(1),
            access: AtomicI64::new(1),
            scan: AtomicI64::new(1),
            training: AtomicI64::new(1),
            admin_log: AtomicI64::new(1),
        }
    }
}

fn next_id(seq: &AtomicI64) -> i64 {
    seq.fetch_add(1, Ordering::SeqCst)
}

/// Keep a sequence ahead of an id seen during replay
fn observe_id(seq: &AtomicI64, id: i64) {
    seq.fetch_max(id + 1, Ordering::SeqCst);
}

/// In-memory record store journaled to the WAL.
///
/// Every mutation is written to the WAL before it becomes visible, while the
/// lock that guards it is still held, so replay order matches apply order.
pub struct RecordStore {
    locations: DashMap<LocationId, Location>,
    types: DashMap<TypeId, UserType>,
    machines: DashMap<MachineId, Machine>,
    users: DashMap<UserKey, User>,
    cards: DashMap<CardNumber, Card>,
    access: DashMap<AccessId, Access>,
    /// Index of open Access rows; one entry per (user, location) at most
    open_access: DashMap<UserKey, AccessId>,
    scans: DashMap<i64, CardScan>,
    trainings: DashMap<i64, Training>,
    admin_log: DashMap<i64, AdminLogEntry>,
    ids: IdSequences,
    /// Presence transactions hold this for reading, location clears for writing
    presence_gate: RwLock<()>,
    wal: Option<Arc<Wal>>,
}

impl RecordStore {
    /// Store without a journal; nothing survives a restart
    pub fn new() -> Self {
        Self {
            locations: DashMap::new(),
            types: DashMap::new(),
            machines: DashMap::new(),
            users: DashMap::new(),
            cards: DashMap::new(),
            access: DashMap::new(),
            open_access: DashMap::new(),
            scans: DashMap::new(),
            trainings: DashMap::new(),
            admin_log: DashMap::new(),
            ids: IdSequences::new(),
            presence_gate: RwLock::new(()),
            wal: None,
        }
    }

    pub fn with_wal(wal: Arc<Wal>) -> Self {
        Self {
            wal: Some(wal),
            ..Self::new()
        }
    }

    fn journal(&self, op: &WalOperation) -> Result<()> {
        if let Some(wal) = &self.wal {
            wal.log_operation(op)?;
        }
        Ok(())
    }

    fn read_gate(&self) -> Result<RwLockReadGuard<'_, ()>> {
        self.presence_gate
            .read()
            .map_err(|_| anyhow!("Presence gate poisoned"))
    }

    fn write_gate(&self) -> Result<RwLockWriteGuard<'_, ()>> {
        self.presence_gate
            .write()
            .map_err(|_| anyhow!("Presence gate poisoned"))
    }

    /// Apply a replayed WAL operation without journaling it again
    pub fn apply(&self, op: WalOperation) {
        match op {
            WalOperation::PutLocation(location) => {
                observe_id(&self.ids.location, location.id.into());
                self.locations.insert(location.id, location);
            }
            WalOperation::PutType(user_type) => {
                observe_id(&self.ids.user_type, user_type.id.into());
                self.types.insert(user_type.id, user_type);
            }
            WalOperation::PutMachine(machine) => {
                observe_id(&self.ids.machine, machine.id.into());
                self.machines.insert(machine.id, machine);
            }
            WalOperation::PutUser(user) => {
                self.users.insert(user.key(), user);
            }
            WalOperation::PutCard(card) => {
                self.cards.insert(card.card, card);
            }
            WalOperation::OpenAccess(access) => {
                observe_id(&self.ids.access, access.id);
                if access.is_open() {
                    self.open_access.insert(access.key(), access.id);
                }
                self.access.insert(access.id, access);
            }
            WalOperation::CloseAccess { id, time_out } => {
                let key = match self.access.get_mut(&id) {
                    Some(mut row) => {
                        row.time_out = Some(time_out);
                        row.value().key()
                    }
                    None => {
                        tracing::warn!(access_id = id, "WAL closes an unknown access row");
                        return;
                    }
                };
                self.open_access.remove_if(&key, |_, open_id| *open_id == id);
            }
            WalOperation::ClearLocation { location_id, time } => {
                self.close_all_at(location_id, time);
            }
            WalOperation::RecordScan(scan) => {
                observe_id(&self.ids.scan, scan.id);
                self.scans.insert(scan.id, scan);
            }
            WalOperation::AddTraining(training) => {
                observe_id(&self.ids.training, training.id);
                self.trainings.insert(training.id, training);
            }
            WalOperation::RemoveTraining { id } => {
                self.trainings.remove(&id);
            }
            WalOperation::AdminLog(entry) => {
                observe_id(&self.ids.admin_log, entry.id);
                self.admin_log.insert(entry.id, entry);
            }
        }
    }

    // Locations, types, machines

    pub fn add_location(&self, name: &str, secret: &str) -> Result<Location> {
        let id = next_id(&self.ids.location) as LocationId;
        let location = Location::new(id, name.to_string(), secret);
        self.journal(&WalOperation::PutLocation(location.clone()))?;
        self.locations.insert(id, location.clone());
        Ok(location)
    }

    pub fn location_by_name(&self, name: &str) -> Option<Location> {
        self.locations
            .iter()
            .find(|entry| entry.value().name == name)
            .map(|entry| entry.value().clone())
    }

    pub fn locations(&self) -> Vec<Location> {
        let mut locations: Vec<Location> = self
            .locations
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        locations.sort_by_key(|location| location.id);
        locations
    }

    /// Replace a location's secret. Returns false for an unknown location.
    pub fn set_location_secret(&self, id: LocationId, secret: &str) -> Result<bool> {
        let Some(mut entry) = self.locations.get_mut(&id) else {
            return Ok(false);
        };
        let mut updated = entry.value().clone();
        updated.set_secret(secret);
        self.journal(&WalOperation::PutLocation(updated.clone()))?;
        *entry.value_mut() = updated;
        Ok(true)
    }

    pub fn add_type(&self, location_id: LocationId, name: &str, level: i32) -> Result<UserType> {
        let user_type = UserType {
            id: next_id(&self.ids.user_type) as TypeId,
            name: name.to_string(),
            level,
            location_id,
        };
        self.journal(&WalOperation::PutType(user_type.clone()))?;
        self.types.insert(user_type.id, user_type.clone());
        Ok(user_type)
    }

    /// Types of a location, lowest level first
    pub fn types_at(&self, location_id: LocationId) -> Vec<UserType> {
        let mut types: Vec<UserType> = self
            .types
            .iter()
            .filter(|entry| entry.value().location_id == location_id)
            .map(|entry| entry.value().clone())
            .collect();
        types.sort_by_key(|t| (t.level, t.id));
        types
    }

    /// The level-0 type new registrations receive
    pub fn default_type(&self, location_id: LocationId) -> Option<UserType> {
        self.types_at(location_id)
            .into_iter()
            .find(|t| t.level == 0)
    }

    /// Permission level of a user; a user without a type is a regular user
    pub fn level_of(&self, user: &User) -> i32 {
        user.type_id
            .and_then(|id| self.user_type(id))
            .map(|t| t.level)
            .unwrap_or(0)
    }

    pub fn add_machine(&self, location_id: LocationId, name: &str) -> Result<Machine> {
        let machine = Machine {
            id: next_id(&self.ids.machine) as MachineId,
            name: name.to_string(),
            location_id,
        };
        self.journal(&WalOperation::PutMachine(machine.clone()))?;
        self.machines.insert(machine.id, machine.clone());
        Ok(machine)
    }

    pub fn machine(&self, id: MachineId) -> Option<Machine> {
        self.machines.get(&id).map(|entry| entry.value().clone())
    }

    pub fn machines_at(&self, location_id: LocationId) -> Vec<Machine> {
        let mut machines: Vec<Machine> = self
            .machines
            .iter()
            .filter(|entry| entry.value().location_id == location_id)
            .map(|entry| entry.value().clone())
            .collect();
        machines.sort_by_key(|m| m.id);
        machines
    }

    // Users and cards

    /// Insert a new user. Returns false if the key is already taken.
    pub fn insert_user(&self, user: User) -> Result<bool> {
        match self.users.entry(user.key()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(entry) => {
                self.journal(&WalOperation::PutUser(user.clone()))?;
                entry.insert(user);
                Ok(true)
            }
        }
    }

    /// Users of a location matching an exact sid and/or a
    /// case-insensitive name prefix, sorted by name
    pub fn find_users(
        &self,
        location_id: LocationId,
        sid: Option<Sid>,
        name_prefix: Option<&str>,
        limit: usize,
    ) -> Vec<User> {
        let prefix = name_prefix.map(str::to_lowercase);
        let mut users: Vec<User> = self
            .users
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|user| user.location_id == location_id)
            .filter(|user| sid.map_or(true, |sid| user.sid == sid))
            .filter(|user| {
                prefix
                    .as_deref()
                    .map_or(true, |prefix| user.name.to_lowercase().starts_with(prefix))
            })
            .collect();
        users.sort_by(|a, b| a.name.cmp(&b.name).then(a.sid.cmp(&b.sid)));
        users.truncate(limit);
        users
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Link a card to a sid, creating the card if it was never scanned.
    /// Returns None, and changes nothing, when the card belongs to another sid.
    pub fn link_card(&self, number: CardNumber, sid: Sid) -> Result<Option<Card>> {
        let card = Card {
            card: number,
            sid: Some(sid),
        };
        match self.cards.entry(number) {
            Entry::Occupied(mut entry) => {
                if entry.get().sid.is_some_and(|owner| owner != sid) {
                    return Ok(None);
                }
                self.journal(&WalOperation::PutCard(card.clone()))?;
                *entry.get_mut() = card.clone();
            }
            Entry::Vacant(entry) => {
                self.journal(&WalOperation::PutCard(card.clone()))?;
                entry.insert(card.clone());
            }
        }
        Ok(Some(card))
    }

    /// Create a user and link their card in one step.
    ///
    /// The card entry stays locked until the user exists, so two concurrent
    /// registrations can never both claim the same card.
    pub fn enroll(&self, user: User, number: CardNumber) -> Result<Enrollment> {
        let card_entry = self.cards.entry(number);
        if let Entry::Occupied(entry) = &card_entry {
            if let Some(owner) = entry.get().sid.filter(|owner| *owner != user.sid) {
                return Ok(Enrollment::CardInUse(owner));
            }
        }

        match self.users.entry(user.key()) {
            Entry::Occupied(_) => return Ok(Enrollment::AlreadyRegistered),
            Entry::Vacant(slot) => {
                self.journal(&WalOperation::PutUser(user.clone()))?;
                slot.insert(user.clone());
            }
        }

        let card = Card {
            card: number,
            sid: Some(user.sid),
        };
        self.journal(&WalOperation::PutCard(card.clone()))?;
        match card_entry {
            Entry::Occupied(mut entry) => {
                entry.insert(card);
            }
            Entry::Vacant(entry) => {
                entry.insert(card);
            }
        }

        Ok(Enrollment::Created(user))
    }

    // Access and scans

    pub fn open_access(&self, key: UserKey) -> Option<Access> {
        let id = *self.open_access.get(&key)?;
        self.access.get(&id).map(|entry| entry.value().clone())
    }

    /// Users currently present at a location with their open row
    pub fn present_at(&self, location_id: LocationId) -> Vec<(User, Access)> {
        let open: Vec<(UserKey, AccessId)> = self
            .open_access
            .iter()
            .filter(|entry| entry.key().location_id == location_id)
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();

        let mut present: Vec<(User, Access)> = open
            .into_iter()
            .filter_map(|(key, id)| {
                let user = self.user(key)?;
                let access = self.access.get(&id)?.value().clone();
                Some((user, access))
            })
            .collect();
        present.sort_by_key(|(_, access)| access.time_in);
        present
    }

    /// Full presence history of one user at one location, oldest first
    pub fn access_history(&self, key: UserKey) -> Vec<Access> {
        let mut rows: Vec<Access> = self
            .access
            .iter()
            .filter(|entry| entry.value().key() == key)
            .map(|entry| entry.value().clone())
            .collect();
        rows.sort_by_key(|row| (row.time_in, row.id));
        rows
    }

    pub fn open_count(&self) -> usize {
        self.open_access.len()
    }

    pub fn scans_for(&self, card: CardNumber) -> Vec<CardScan> {
        let mut scans: Vec<CardScan> = self
            .scans
            .iter()
            .filter(|entry| entry.value().card_id == card)
            .map(|entry| entry.value().clone())
            .collect();
        scans.sort_by_key(|scan| scan.id);
        scans
    }

    pub fn scan_count(&self) -> usize {
        self.scans.len()
    }

    /// Close all open rows of a location. Callers hold the write gate
    /// or are replaying.
    fn close_all_at(&self, location_id: LocationId, now: Timestamp) -> Vec<Access> {
        let open: Vec<(UserKey, AccessId)> = self
            .open_access
            .iter()
            .filter(|entry| entry.key().location_id == location_id)
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();

        let mut closed = Vec::with_capacity(open.len());
        for (key, id) in open {
            self.open_access.remove(&key);
            if let Some(mut row) = self.access.get_mut(&id) {
                row.close(now);
                closed.push(row.clone());
            }
        }
        closed
    }

    // Trainings and admin log

    pub fn add_training(
        &self,
        trainee_id: Sid,
        trainer_id: Sid,
        machine_id: MachineId,
        date: Timestamp,
    ) -> Result<Training> {
        let training = Training {
            id: next_id(&self.ids.training),
            trainee_id,
            trainer_id,
            machine_id,
            date,
        };
        self.journal(&WalOperation::AddTraining(training.clone()))?;
        self.trainings.insert(training.id, training.clone());
        Ok(training)
    }

    pub fn remove_training(&self, id: i64) -> Result<Option<Training>> {
        match self.trainings.entry(id) {
            Entry::Occupied(entry) => {
                self.journal(&WalOperation::RemoveTraining { id })?;
                Ok(Some(entry.remove()))
            }
            Entry::Vacant(_) => Ok(None),
        }
    }

    pub fn training(&self, id: i64) -> Option<Training> {
        self.trainings.get(&id).map(|entry| entry.value().clone())
    }

    pub fn trainings_for(&self, trainee_id: Sid) -> Vec<Training> {
        let mut trainings: Vec<Training> = self
            .trainings
            .iter()
            .filter(|entry| entry.value().trainee_id == trainee_id)
            .map(|entry| entry.value().clone())
            .collect();
        trainings.sort_by_key(|t| t.id);
        trainings
    }

    pub fn log_admin_action(
        &self,
        admin_id: Sid,
        action: AdminAction,
        target_id: Option<Sid>,
        data: serde_json::Value,
        location_id: LocationId,
        time: Timestamp,
    ) -> Result<AdminLogEntry> {
        let entry = AdminLogEntry {
            id: next_id(&self.ids.admin_log),
            admin_id,
            action,
            target_id,
            data: data.to_string(),
            location_id,
            time,
        };
        self.journal(&WalOperation::AdminLog(entry.clone()))?;
        self.admin_log.insert(entry.id, entry.clone());
        Ok(entry)
    }

    /// Admin actions taken at a location, oldest first
    pub fn admin_log_at(&self, location_id: LocationId) -> Vec<AdminLogEntry> {
        let mut entries: Vec<AdminLogEntry> = self
            .admin_log
            .iter()
            .filter(|entry| entry.value().location_id == location_id)
            .map(|entry| entry.value().clone())
            .collect();
        entries.sort_by_key(|entry| entry.id);
        entries
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Repository for RecordStore {
    fn location(&self, id: LocationId) -> Option<Location> {
        self.locations.get(&id).map(|entry| entry.value().clone())
    }

    fn user_type(&self, id: TypeId) -> Option<UserType> {
        self.types.get(&id).map(|entry| entry.value().clone())
    }

    fn card(&self, number: CardNumber) -> Option<Card> {
        self.cards.get(&number).map(|entry| entry.value().clone())
    }

    fn card_for_user(&self, sid: Sid) -> Option<Card> {
        self.cards
            .iter()
            .filter(|entry| entry.value().sid == Some(sid))
            .map(|entry| entry.value().clone())
            .min_by_key(|card| card.card)
    }

    fn ensure_card(&self, number: CardNumber) -> Result<(Card, bool)> {
        match self.cards.entry(number) {
            Entry::Occupied(entry) => Ok((entry.get().clone(), false)),
            Entry::Vacant(entry) => {
                let card = Card::unlinked(number);
                self.journal(&WalOperation::PutCard(card.clone()))?;
                entry.insert(card.clone());
                Ok((card, true))
            }
        }
    }

    fn user(&self, key: UserKey) -> Option<User> {
        self.users.get(&key).map(|entry| entry.value().clone())
    }

    // `update` must not change the user's sid or location
    fn update_user(&self, key: UserKey, update: &mut dyn FnMut(&mut User)) -> Result<Option<User>> {
        let Some(mut entry) = self.users.get_mut(&key) else {
            return Ok(None);
        };
        let mut updated = entry.value().clone();
        update(&mut updated);
        self.journal(&WalOperation::PutUser(updated.clone()))?;
        *entry.value_mut() = updated.clone();
        Ok(Some(updated))
    }

    fn record_scan(&self, card: CardNumber, location_id: LocationId, time: Timestamp) -> Result<CardScan> {
        let scan = CardScan {
            id: next_id(&self.ids.scan),
            card_id: card,
            time,
            location_id,
        };
        self.journal(&WalOperation::RecordScan(scan.clone()))?;
        self.scans.insert(scan.id, scan.clone());
        Ok(scan)
    }

    fn transact_presence(
        &self,
        key: UserKey,
        now: Timestamp,
        decide: &mut dyn FnMut(Option<&Access>) -> PresenceChange,
    ) -> Result<PresenceEffect> {
        let _gate = self.read_gate()?;

        // The entry guard serializes every transaction on this key
        match self.open_access.entry(key) {
            Entry::Occupied(entry) => {
                let id = *entry.get();
                let current = self
                    .access
                    .get(&id)
                    .map(|row| row.value().clone())
                    .with_context(|| format!("Open access row {} is missing", id))?;

                match decide(Some(&current)) {
                    PresenceChange::Close => {
                        let mut closed = current;
                        closed.close(now);
                        let time_out = closed.time_out.unwrap_or(now);
                        self.journal(&WalOperation::CloseAccess { id, time_out })?;
                        self.access.insert(id, closed.clone());
                        entry.remove();
                        Ok(PresenceEffect::Closed(closed))
                    }
                    PresenceChange::Open => bail!(
                        "Refusing to open a second access row for user {} at location {}",
                        key.sid,
                        key.location_id
                    ),
                    PresenceChange::Keep => Ok(PresenceEffect::Unchanged(Some(current))),
                }
            }
            Entry::Vacant(entry) => match decide(None) {
                PresenceChange::Open => {
                    let access = Access::open(next_id(&self.ids.access), key, now);
                    self.journal(&WalOperation::OpenAccess(access.clone()))?;
                    self.access.insert(access.id, access.clone());
                    entry.insert(access.id);
                    Ok(PresenceEffect::Opened(access))
                }
                PresenceChange::Close | PresenceChange::Keep => Ok(PresenceEffect::Unchanged(None)),
            },
        }
    }

    fn clear_location(&self, location_id: LocationId, now: Timestamp) -> Result<Vec<Access>> {
        let _gate = self.write_gate()?;

        let has_open = self
            .open_access
            .iter()
            .any(|entry| entry.key().location_id == location_id);
        if !has_open {
            return Ok(Vec::new());
        }

        self.journal(&WalOperation::ClearLocation {
            location_id,
            time: now,
        })?;
        Ok(self.close_all_at(location_id, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use tempfile::TempDir;

    fn store_with_user(waiver: bool) -> (RecordStore, UserKey) {
        let store = RecordStore::new();
        let location = store.add_location("Idea Shop", "secret").unwrap();
        let regular = store.add_type(location.id, "User", 0).unwrap();
        let mut user = User::new(20123456, location.id, "Ada Lovelace".to_string(), Some(regular.id));
        if waiver {
            user.waiver_signed = Some(1);
        }
        let key = user.key();
        assert!(store.insert_user(user).unwrap());
        (store, key)
    }

    fn toggle(open: Option<&Access>) -> PresenceChange {
        if open.is_some() {
            PresenceChange::Close
        } else {
            PresenceChange::Open
        }
    }

    #[test]
    fn test_transact_presence_opens_then_closes() {
        let (store, key) = store_with_user(true);

        let opened = store.transact_presence(key, 100, &mut toggle).unwrap();
        let access = match opened {
            PresenceEffect::Opened(access) => access,
            other => panic!("Expected Opened, got {:?}", other),
        };
        assert_eq!(store.open_access(key), Some(access.clone()));

        match store.transact_presence(key, 200, &mut toggle).unwrap() {
            PresenceEffect::Closed(closed) => {
                assert_eq!(closed.id, access.id);
                assert_eq!(closed.time_out, Some(200));
            }
            other => panic!("Expected Closed, got {:?}", other),
        }
        assert!(store.open_access(key).is_none());
        assert_eq!(store.access_history(key).len(), 1);
    }

    #[test]
    fn test_transact_presence_refuses_second_open_row() {
        let (store, key) = store_with_user(true);
        store.transact_presence(key, 100, &mut toggle).unwrap();

        let result = store.transact_presence(key, 150, &mut |_| PresenceChange::Open);
        assert!(result.is_err());
        assert_eq!(store.access_history(key).len(), 1);
    }

    #[test]
    fn test_close_without_open_row_is_noop() {
        let (store, key) = store_with_user(true);

        let effect = store.transact_presence(key, 100, &mut |_| PresenceChange::Close).unwrap();
        assert_eq!(effect, PresenceEffect::Unchanged(None));
        assert!(store.access_history(key).is_empty());
    }

    #[test]
    fn test_concurrent_toggles_keep_one_open_row() {
        let (store, key) = store_with_user(true);
        let store = Arc::new(store);
        let opened = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                let opened = Arc::clone(&opened);
                let closed = Arc::clone(&closed);
                thread::spawn(move || {
                    for i in 0..50 {
                        let now = (t * 1000 + i) as Timestamp;
                        match store.transact_presence(key, now, &mut toggle).unwrap() {
                            PresenceEffect::Opened(_) => opened.fetch_add(1, Ordering::SeqCst),
                            PresenceEffect::Closed(_) => closed.fetch_add(1, Ordering::SeqCst),
                            PresenceEffect::Unchanged(_) => 0,
                        };
                        let open_rows = store
                            .access_history(key)
                            .iter()
                            .filter(|row| row.is_open())
                            .count();
                        assert!(open_rows <= 1, "found {} open rows", open_rows);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let opened = opened.load(Ordering::SeqCst);
        let closed = closed.load(Ordering::SeqCst);
        assert_eq!(opened + closed, 400);
        // 400 toggles starting from absent end absent
        assert_eq!(opened, closed);
        assert!(store.open_access(key).is_none());
    }

    #[test]
    fn test_concurrent_first_scans_create_one_card() {
        let store = Arc::new(RecordStore::new());
        let created = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let created = Arc::clone(&created);
                thread::spawn(move || {
                    let (_, was_created) = store.ensure_card(555).unwrap();
                    if was_created {
                        created.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(store.card(555), Some(Card::unlinked(555)));
    }

    #[test]
    fn test_clear_location_only_touches_that_location() {
        let store = RecordStore::new();
        let l1 = store.add_location("Idea Shop", "a").unwrap();
        let l2 = store.add_location("Machine Shop", "b").unwrap();
        let k1 = UserKey::new(20000001, l1.id);
        let k2 = UserKey::new(20000001, l2.id);
        let k3 = UserKey::new(20000002, l1.id);

        for key in [k1, k2, k3] {
            store.transact_presence(key, 10, &mut toggle).unwrap();
        }

        let closed = store.clear_location(l1.id, 50).unwrap();
        assert_eq!(closed.len(), 2);
        assert!(closed.iter().all(|row| row.time_out == Some(50)));
        assert!(store.open_access(k1).is_none());
        assert!(store.open_access(k3).is_none());
        assert!(store.open_access(k2).is_some());

        // Nothing left to clear
        assert!(store.clear_location(l1.id, 60).unwrap().is_empty());
    }

    #[test]
    fn test_find_users_by_prefix_and_sid() {
        let store = RecordStore::new();
        let location = store.add_location("Idea Shop", "a").unwrap();
        for (sid, name) in [(20000001, "Ada Lovelace"), (20000002, "Alan Turing"), (20000003, "Grace Hopper")] {
            store
                .insert_user(User::new(sid, location.id, name.to_string(), None))
                .unwrap();
        }
        store
            .insert_user(User::new(20000004, location.id + 1, "Alonzo Church".to_string(), None))
            .unwrap();

        let found = store.find_users(location.id, None, Some("al"), 20);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Alan Turing");

        let found = store.find_users(location.id, Some(20000003), None, 20);
        assert_eq!(found.len(), 1);

        let found = store.find_users(location.id, None, None, 2);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].name, "Ada Lovelace");
    }

    #[test]
    fn test_insert_user_rejects_duplicate_key() {
        let (store, key) = store_with_user(false);
        let duplicate = User::new(key.sid, key.location_id, "Someone Else".to_string(), None);

        assert!(!store.insert_user(duplicate).unwrap());
        assert_eq!(store.user(key).unwrap().name, "Ada Lovelace");
    }

    #[test]
    fn test_link_card_refuses_card_of_another_sid() {
        let (store, key) = store_with_user(true);

        assert!(store.link_card(555, key.sid).unwrap().is_some());
        assert!(store.link_card(555, key.sid).unwrap().is_some());
        assert!(store.link_card(555, 20999999).unwrap().is_none());
        assert_eq!(store.card(555).unwrap().sid, Some(key.sid));
    }

    #[test]
    fn test_enroll_outcomes() {
        let (store, key) = store_with_user(true);
        let newcomer = User::new(20000002, key.location_id, "Grace Hopper".to_string(), None);

        store.link_card(555, key.sid).unwrap();
        assert_eq!(
            store.enroll(newcomer.clone(), 555).unwrap(),
            Enrollment::CardInUse(key.sid)
        );
        assert!(store.user(newcomer.key()).is_none());

        let existing = User::new(key.sid, key.location_id, "Impostor".to_string(), None);
        assert_eq!(store.enroll(existing, 556).unwrap(), Enrollment::AlreadyRegistered);
        assert!(store.card(556).is_none());

        assert_eq!(
            store.enroll(newcomer.clone(), 556).unwrap(),
            Enrollment::Created(newcomer.clone())
        );
        assert_eq!(store.card(556).unwrap().sid, Some(newcomer.sid));
    }

    #[test]
    fn test_concurrent_enrollments_claim_card_once() {
        let store = Arc::new(RecordStore::new());
        let location = store.add_location("Idea Shop", "secret").unwrap();
        store.ensure_card(777).unwrap();
        let created = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                let created = Arc::clone(&created);
                thread::spawn(move || {
                    let user = User::new(20000100 + i, location.id, format!("User {}", i), None);
                    if let Enrollment::Created(_) = store.enroll(user, 777).unwrap() {
                        created.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(store.user_count(), 1);
        let owner = store.card(777).unwrap().sid.unwrap();
        assert!(store.user(UserKey::new(owner, location.id)).is_some());
    }

    #[test]
    fn test_level_of_defaults_to_regular() {
        let (store, key) = store_with_user(false);
        let staff = store.add_type(key.location_id, "Staff", 2).unwrap();

        let mut user = store.user(key).unwrap();
        assert_eq!(store.level_of(&user), 0);

        user.type_id = Some(staff.id);
        assert_eq!(store.level_of(&user), 2);

        user.type_id = Some(999);
        assert_eq!(store.level_of(&user), 0);
    }

    #[test]
    fn test_replay_restores_state() {
        let temp_dir = TempDir::new().unwrap();
        let wal = Arc::new(Wal::new(temp_dir.path().join("store.wal")).unwrap());
        let store = RecordStore::with_wal(Arc::clone(&wal));

        let location = store.add_location("Idea Shop", "kiosk").unwrap();
        let regular = store.add_type(location.id, "User", 0).unwrap();
        let machine = store.add_machine(location.id, "Laser Cutter").unwrap();
        let mut user = User::new(20123456, location.id, "Ada Lovelace".to_string(), Some(regular.id));
        user.waiver_signed = Some(5);
        let key = user.key();
        store.insert_user(user).unwrap();
        store.link_card(4242, key.sid).unwrap();
        store.record_scan(4242, location.id, 10).unwrap();
        store.transact_presence(key, 10, &mut toggle).unwrap();
        store.transact_presence(key, 20, &mut toggle).unwrap();
        store.transact_presence(key, 30, &mut toggle).unwrap();
        store.add_training(key.sid, 20000009, machine.id, 40).unwrap();
        let removed = store.add_training(key.sid, 20000009, machine.id, 41).unwrap();
        store.remove_training(removed.id).unwrap();
        store
            .log_admin_action(20000009, AdminAction::ClearLab, None, serde_json::json!({}), location.id, 50)
            .unwrap();

        let restored = RecordStore::new();
        for op in wal.replay().unwrap() {
            restored.apply(op);
        }

        assert_eq!(restored.location(location.id), Some(location.clone()));
        assert_eq!(restored.user(key), store.user(key));
        assert_eq!(restored.card(4242), store.card(4242));
        assert_eq!(restored.access_history(key), store.access_history(key));
        assert_eq!(restored.open_access(key).map(|a| a.time_in), Some(30));
        assert_eq!(restored.scans_for(4242).len(), 1);
        assert_eq!(restored.trainings_for(key.sid).len(), 1);
        assert_eq!(restored.admin_log_at(location.id).len(), 1);
        assert_eq!(restored.machines_at(location.id), vec![machine]);

        // Sequences continue after the replayed ids
        let next = restored.add_location("Annex", "x").unwrap();
        assert!(next.id > location.id);
    }

    #[test]
    fn test_replay_of_clear_location() {
        let temp_dir = TempDir::new().unwrap();
        let wal = Arc::new(Wal::new(temp_dir.path().join("store.wal")).unwrap());
        let store = RecordStore::with_wal(Arc::clone(&wal));
        let location = store.add_location("Idea Shop", "kiosk").unwrap();
        let key = UserKey::new(20000001, location.id);

        store.transact_presence(key, 10, &mut toggle).unwrap();
        store.clear_location(location.id, 99).unwrap();

        let restored = RecordStore::new();
        for op in wal.replay().unwrap() {
            restored.apply(op);
        }
        assert!(restored.open_access(key).is_none());
        assert_eq!(restored.access_history(key)[0].time_out, Some(99));
    }
}
