//! Background provider sync loop.
//!
//! Polls every minute; a cycle actually runs only when the persisted
//! last-sync timestamp is older than the configured interval (5 minutes
//! by default). A single-slot lock makes re-entrant triggers (a manual
//! wake landing while a cycle is mid-flight) skip instead of overlap.
//!
//! Both provider fetches (conversations, call transcripts) are
//! best-effort: one failing is logged and does not abort the other or
//! mark the cycle failed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::ingest::{self, NormalizedMessage};
use crate::providers::ProviderError;
use crate::state::AppState;

/// Poll cadence for the loop itself. Most ticks conclude NotDue.
const POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Something that can be synced from: the CRM in production, stubs in
/// tests.
#[async_trait]
pub trait SyncSource: Send + Sync {
    async fn fetch_conversations(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<NormalizedMessage>, ProviderError>;

    async fn fetch_call_transcripts(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<NormalizedMessage>, ProviderError>;
}

// =============================================================================
// Single-slot lock
// =============================================================================

/// Re-entrancy guard for the sync cycle: `try_acquire` either takes the
/// slot or reports that a cycle is already running. Released on guard
/// drop, including on panic unwind.
pub struct SyncLock {
    busy: AtomicBool,
}

impl SyncLock {
    pub fn new() -> Self {
        Self {
            busy: AtomicBool::new(false),
        }
    }

    pub fn try_acquire(&self) -> Option<SyncGuard<'_>> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            Some(SyncGuard { lock: self })
        } else {
            None
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Default for SyncLock {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SyncGuard<'a> {
    lock: &'a SyncLock,
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.lock.busy.store(false, Ordering::Release);
    }
}

// =============================================================================
// Cycle
// =============================================================================

#[derive(Debug)]
pub enum SyncOutcome {
    /// Last cycle is recent enough; nothing to do.
    NotDue,
    /// Another cycle holds the lock.
    Busy,
    /// A cycle ran. Each half carries its own outcome.
    Ran {
        conversations: Result<u32, String>,
        transcripts: Result<u32, String>,
    },
}

/// Run one sync cycle if it is due and no other cycle is in flight.
pub async fn run_sync_cycle(state: &AppState, source: &dyn SyncSource) -> SyncOutcome {
    let interval_minutes = state.config.read().sync.interval_minutes;
    let interval = chrono::Duration::minutes(interval_minutes as i64);

    let last_sync = match state.db.lock().get_last_sync_at() {
        Ok(last) => last,
        Err(e) => {
            log::warn!("Sync loop: failed to read last sync time: {}", e);
            None
        }
    };

    let now = Utc::now();
    if let Some(last) = last_sync {
        if now - last < interval {
            return SyncOutcome::NotDue;
        }
    }

    let Some(_guard) = state.sync_lock.try_acquire() else {
        log::debug!("Sync loop: cycle already in flight, skipping");
        return SyncOutcome::Busy;
    };

    let conversations = sync_half(state, "conversation", source.fetch_conversations(last_sync)).await;
    let transcripts =
        sync_half(state, "call transcript", source.fetch_call_transcripts(last_sync)).await;

    let summary = match (&conversations, &transcripts) {
        (Ok(c), Ok(t)) => format!("ok: {} conversations, {} transcripts", c, t),
        (Err(e), Ok(t)) => format!("conversation sync failed ({}); {} transcripts", e, t),
        (Ok(c), Err(e)) => format!("{} conversations; transcript sync failed ({})", c, e),
        (Err(c), Err(t)) => format!("both failed: {}; {}", c, t),
    };
    if let Err(e) = state.db.lock().set_last_sync(now, &summary) {
        log::warn!("Sync loop: failed to persist sync state: {}", e);
    }
    state.debouncer.notify();

    SyncOutcome::Ran {
        conversations,
        transcripts,
    }
}

/// Apply one provider fetch. Fetch or per-message store failures degrade
/// to a logged error; they never propagate out of the cycle.
async fn sync_half(
    state: &AppState,
    label: &str,
    fetch: impl std::future::Future<Output = Result<Vec<NormalizedMessage>, ProviderError>>,
) -> Result<u32, String> {
    match fetch.await {
        Ok(messages) => {
            let mut stored = 0u32;
            for msg in messages {
                match ingest::record_inbound(state, msg) {
                    Ok(outcome) if outcome.wrote_row() => stored += 1,
                    Ok(_) => {}
                    Err(e) => log::warn!("Sync loop: failed to store {} message: {}", label, e),
                }
            }
            log::info!("Sync loop: {} sync stored {} messages", label, stored);
            Ok(stored)
        }
        Err(e) => {
            log::warn!("Sync loop: {} sync failed: {}", label, e);
            Err(e.to_string())
        }
    }
}

/// The loop: poll every minute, run due cycles, wake early on manual
/// sync signals.
pub async fn run_sync_loop(state: Arc<AppState>, source: Arc<dyn SyncSource>) {
    log::info!("Sync loop: started");
    loop {
        let enabled = state.config.read().sync.enabled;
        if enabled {
            if let SyncOutcome::Ran {
                conversations,
                transcripts,
            } = run_sync_cycle(&state, source.as_ref()).await
            {
                log::info!(
                    "Sync loop: cycle complete (conversations: {:?}, transcripts: {:?})",
                    conversations,
                    transcripts
                );
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(POLL_INTERVAL) => {},
            _ = state.sync_wake.notified() => {
                log::info!("Sync loop: woken by manual sync signal");
            }
        }
    }
}
