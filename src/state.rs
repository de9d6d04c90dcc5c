//! Shared application state.
//!
//! One `AppState` is built at startup and shared (Arc) between the HTTP
//! handlers, the sync loop, and the debouncer. The store connection is
//! synchronous rusqlite behind a lock; guards are never held across an
//! await point.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, Notify};

use crate::auth::RoleCache;
use crate::config::Config;
use crate::db::CommsDb;
use crate::fanout::{self, CommsEvent, Debouncer, DEBOUNCE_WINDOW};
use crate::sync::SyncLock;

pub struct AppState {
    pub db: Mutex<CommsDb>,
    pub config: RwLock<Config>,
    pub events: broadcast::Sender<CommsEvent>,
    pub debouncer: Debouncer,
    pub sync_lock: SyncLock,
    pub sync_wake: Notify,
    pub role_cache: RoleCache,
    pub start_time: Instant,
}

impl AppState {
    /// Build the shared state plus the debouncer future the caller must
    /// spawn on its runtime.
    pub fn new(db: CommsDb, config: Config) -> (Arc<Self>, impl std::future::Future<Output = ()>) {
        let events = fanout::event_channel();
        let (debouncer, debouncer_task) = Debouncer::new(events.clone(), DEBOUNCE_WINDOW);

        let state = Arc::new(Self {
            db: Mutex::new(db),
            config: RwLock::new(config),
            events,
            debouncer,
            sync_lock: SyncLock::new(),
            sync_wake: Notify::new(),
            role_cache: RoleCache::new(),
            start_time: Instant::now(),
        });
        (state, debouncer_task)
    }
}
