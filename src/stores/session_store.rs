use dashmap::DashMap;
use serde::Serialize;

use crate::models::user::UserKey;
use crate::models::{LocationId, Sid, Timestamp};
use crate::utils::auth::generate_token;
use crate::utils::time::is_expired;

/// What an admin session is allowed to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionScope {
    Full,
    /// Issued to staff without a PIN; may only set one
    PinSetup,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminSession {
    pub sid: Sid,
    pub location_id: LocationId,
    pub scope: SessionScope,
    pub issued_at: Timestamp,
}

impl AdminSession {
    pub fn key(&self) -> UserKey {
        UserKey::new(self.sid, self.location_id)
    }
}

/// In-memory admin sessions keyed by opaque token
pub struct SessionStore {
    sessions: DashMap<String, AdminSession>,
    ttl_ms: i64,
}

impl SessionStore {
    pub fn new(ttl_ms: i64) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl_ms,
        }
    }

    /// Create a session and return its token
    pub fn issue(&self, key: UserKey, scope: SessionScope, now: Timestamp) -> String {
        let token = generate_token();
        self.sessions.insert(
            token.clone(),
            AdminSession {
                sid: key.sid,
                location_id: key.location_id,
                scope,
                issued_at: now,
            },
        );
        token
    }

    /// Look up a live session. Expired sessions are dropped on access.
    pub fn get(&self, token: &str, now: Timestamp) -> Option<AdminSession> {
        let session = self.sessions.get(token)?.value().clone();
        if is_expired(session.issued_at, self.ttl_ms, now) {
            self.sessions.remove(token);
            return None;
        }
        Some(session)
    }

    pub fn revoke(&self, token: &str) -> bool {
        self.sessions.remove(token).is_some()
    }

    /// Drop every expired session, returning how many were removed
    pub fn sweep(&self, now: Timestamp) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| !is_expired(session.issued_at, self.ttl_ms, now));
        before.saturating_sub(self.sessions.len())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_get() {
        let store = SessionStore::new(1_000);
        let key = UserKey::new(20000001, 1);
        let token = store.issue(key, SessionScope::Full, 100);

        assert_eq!(token.len(), 64);
        let session = store.get(&token, 500).unwrap();
        assert_eq!(session.key(), key);
        assert_eq!(session.scope, SessionScope::Full);
        assert!(store.get("not-a-token", 500).is_none());
    }

    #[test]
    fn test_expired_session_is_removed_on_access() {
        let store = SessionStore::new(1_000);
        let token = store.issue(UserKey::new(20000001, 1), SessionScope::Full, 100);

        assert!(store.get(&token, 1_100).is_some());
        assert!(store.get(&token, 1_101).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_revoke() {
        let store = SessionStore::new(1_000);
        let token = store.issue(UserKey::new(20000001, 1), SessionScope::PinSetup, 100);

        assert!(store.revoke(&token));
        assert!(!store.revoke(&token));
        assert!(store.get(&token, 100).is_none());
    }

    #[test]
    fn test_sweep() {
        let store = SessionStore::new(1_000);
        store.issue(UserKey::new(20000001, 1), SessionScope::Full, 0);
        store.issue(UserKey::new(20000002, 1), SessionScope::Full, 500);
        let fresh = store.issue(UserKey::new(20000003, 1), SessionScope::Full, 2_000);

        assert_eq!(store.sweep(2_200), 2);
        assert_eq!(store.len(), 1);
        assert!(store.get(&fresh, 2_200).is_some());
    }
}
