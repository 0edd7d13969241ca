// ── Debounced invalidation ──
//
// Coalesces bursts of change notifications into one delayed action per
// group. Every trigger re-arms the timer; the action runs once the group
// has been quiet for the full delay.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, trace};

/// Handle to one group's debounce timer.
///
/// Dropping the handle (or cancelling the parent token) releases the timer;
/// a pending firing is discarded.
pub struct Debouncer {
    trigger_tx: mpsc::UnboundedSender<()>,
    fired: Arc<AtomicU64>,
    _guard: DropGuard,
}

impl Debouncer {
    /// Spawn the timer task for one group. Must be called within a tokio runtime.
    pub fn spawn(
        delay: Duration,
        cancel: &CancellationToken,
        on_fire: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();
        let cancel = cancel.child_token();
        let fired = Arc::new(AtomicU64::new(0));
        tokio::spawn(debounce_task(
            delay,
            trigger_rx,
            cancel.clone(),
            Arc::clone(&fired),
            on_fire,
        ));
        Self {
            trigger_tx,
            fired,
            _guard: cancel.drop_guard(),
        }
    }

    /// Record a change: cancel the pending timer and re-arm it.
    pub fn trigger(&self) {
        // A closed channel means the group is being torn down.
        let _ = self.trigger_tx.send(());
    }

    /// How many times the action has run.
    pub fn fired(&self) -> u64 {
        self.fired.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for Debouncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debouncer")
            .field("fired", &self.fired())
            .finish_non_exhaustive()
    }
}

async fn debounce_task(
    delay: Duration,
    mut trigger_rx: mpsc::UnboundedReceiver<()>,
    cancel: CancellationToken,
    fired: Arc<AtomicU64>,
    on_fire: impl Fn() + Send + Sync + 'static,
) {
    let mut deadline: Option<Instant> = None;

    loop {
        let armed = deadline;
        let timer = async move {
            match armed {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            trigger = trigger_rx.recv() => {
                if trigger.is_none() {
                    break;
                }
                deadline = Some(Instant::now() + delay);
                trace!(?delay, "debounce re-armed");
            }
            () = timer => {
                deadline = None;
                let count = fired.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(count, "debounce fired");
                on_fire();
            }
        }
    }
    trace!("debounce timer released");
}
