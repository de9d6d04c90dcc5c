//! Realtime fan-out: change events and debounced cache invalidation.
//!
//! Every store mutation publishes a `CommsEvent` on a broadcast channel.
//! Subscribers (SSE bridges, in-process listeners) consume them directly;
//! cache invalidation additionally flows through a `Debouncer` so a burst
//! of near-simultaneous events collapses into a single invalidation.
//!
//! The debouncer is an explicit state machine (idle, pending(timer),
//! flush) rather than an ad hoc timer side effect, so it is testable
//! with paused time and independent of any UI layer.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc};

use crate::db::{CommunicationType, Direction};

/// Quiet window for coalescing cache invalidations.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(150);

/// Query caches invalidated when the communications table changes.
pub const CACHE_KEYS: [&str; 4] = [
    "lead-communications",
    "all-communications",
    "conversation-thread",
    "leads",
];

/// Broadcast channel capacity. Slow subscribers that fall further behind
/// than this see `Lagged` and resync from the store.
const EVENT_CHANNEL_SIZE: usize = 256;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CommsEvent {
    CommunicationInserted {
        id: String,
        communication_type: CommunicationType,
        direction: Direction,
    },
    CommunicationUpdated {
        id: String,
    },
    NotificationCreated {
        user_id: String,
    },
    CacheInvalidated {
        keys: Vec<String>,
    },
}

pub fn event_channel() -> broadcast::Sender<CommsEvent> {
    broadcast::channel(EVENT_CHANNEL_SIZE).0
}

/// Handle for poking the debouncer. Cheap to clone; notifications never
/// block.
#[derive(Clone)]
pub struct Debouncer {
    trigger: mpsc::UnboundedSender<()>,
}

impl Debouncer {
    /// Create the debouncer and the future driving it. The caller spawns
    /// the future on its runtime.
    pub fn new(
        events: broadcast::Sender<CommsEvent>,
        window: Duration,
    ) -> (Self, impl std::future::Future<Output = ()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { trigger: tx }, run_debouncer(rx, events, window))
    }

    /// Signal that a cache-relevant change happened. The first signal
    /// arms the timer; signals while armed are absorbed.
    pub fn notify(&self) {
        let _ = self.trigger.send(());
    }
}

/// Idle → wait for the first trigger. Pending → absorb triggers until the
/// window elapses. Flush → one CacheInvalidated event, back to idle.
async fn run_debouncer(
    mut rx: mpsc::UnboundedReceiver<()>,
    events: broadcast::Sender<CommsEvent>,
    window: Duration,
) {
    loop {
        // Idle
        if rx.recv().await.is_none() {
            return;
        }

        // Pending: the timer runs once from the first trigger; later
        // triggers in the window do not extend it, keeping flush latency
        // bounded under a sustained burst.
        let deadline = tokio::time::sleep(window);
        tokio::pin!(deadline);
        let mut closed = false;
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                more = rx.recv() => {
                    if more.is_none() {
                        closed = true;
                        break;
                    }
                }
            }
        }

        // Flush. Send failures just mean nobody is subscribed right now.
        let _ = events.send(CommsEvent::CacheInvalidated {
            keys: CACHE_KEYS.iter().map(|k| k.to_string()).collect(),
        });

        if closed {
            return;
        }
    }
}
