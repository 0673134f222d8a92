// Application state (AppState)

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::api::client::DirectoryClient;
use crate::core::config::Config;
use crate::stores::{
    kiosk_events::KioskEvents, record_store::RecordStore, session_store::SessionStore,
    waiver_store::PendingWaivers,
};
use crate::utils::time::secs_to_millis;
use crate::wal::wal::Wal;

/// Shared application state
///
/// Contains all shared components that are accessed by request handlers.
/// All fields are wrapped in Arc for efficient cloning across threads.
#[derive(Clone)]
pub struct AppState {
    /// Users, cards, presence and audit records
    pub store: Arc<RecordStore>,

    /// Admin sessions keyed by token
    pub sessions: Arc<SessionStore>,

    /// Users allowed to accept the waiver right now
    pub waivers: Arc<PendingWaivers>,

    /// Live events for kiosk screens
    pub events: Arc<KioskEvents>,

    /// Identity lookup for registration; None when disabled
    pub directory: Option<Arc<DirectoryClient>>,

    /// Write-Ahead Log for persistence
    pub wal: Arc<Wal>,

    /// Configuration
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config, wal: Wal) -> Result<Self> {
        let config = Arc::new(config);
        let wal = Arc::new(wal);

        let directory = if config.directory.enabled {
            let client = DirectoryClient::new(&config.directory).context("Failed to create directory client")?;
            Some(Arc::new(client))
        } else {
            None
        };

        Ok(Self {
            store: Arc::new(RecordStore::with_wal(Arc::clone(&wal))),
            sessions: Arc::new(SessionStore::new(secs_to_millis(config.admin.session_ttl_secs))),
            waivers: Arc::new(PendingWaivers::new(secs_to_millis(config.kiosk.waiver_window_secs))),
            events: Arc::new(KioskEvents::new(config.kiosk.event_capacity)),
            directory,
            wal,
            config,
        })
    }
}
