// ── Hour-aligned refresh ──
//
// Refetches at every wall-clock hour boundary. Each firing computes the
// delay to the following boundary afresh, so the schedule re-aligns to the
// clock instead of drifting like a fixed interval.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, FixedOffset, TimeDelta, Timelike};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::debug;

use crate::clock::SharedClock;

/// First `hh:00:00.000` strictly after `now`, in `now`'s offset.
pub fn next_hour_boundary(now: DateTime<FixedOffset>) -> Option<DateTime<FixedOffset>> {
    now.with_nanosecond(0)?
        .with_second(0)?
        .with_minute(0)?
        .checked_add_signed(TimeDelta::hours(1))
}

/// Time left until the next hour boundary (one hour when exactly on one).
pub fn delay_until_next_hour(now: DateTime<FixedOffset>) -> Duration {
    next_hour_boundary(now)
        .and_then(|next| (next - now).to_std().ok())
        .unwrap_or(Duration::from_secs(3600))
}

/// Handle to a running hourly refresh timer.
///
/// Dropping it (or cancelling the parent token) stops the timer.
pub struct HourlyRefresh {
    fired: Arc<AtomicU64>,
    _guard: DropGuard,
}

impl HourlyRefresh {
    /// Spawn the timer. Must be called within a tokio runtime.
    pub fn spawn(
        clock: SharedClock,
        cancel: &CancellationToken,
        refresh: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        let cancel = cancel.child_token();
        let fired = Arc::new(AtomicU64::new(0));
        tokio::spawn(hourly_task(
            clock,
            cancel.clone(),
            Arc::clone(&fired),
            refresh,
        ));
        Self {
            fired,
            _guard: cancel.drop_guard(),
        }
    }

    /// How many boundaries have fired so far.
    pub fn fired(&self) -> u64 {
        self.fired.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for HourlyRefresh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HourlyRefresh")
            .field("fired", &self.fired())
            .finish_non_exhaustive()
    }
}

async fn hourly_task(
    clock: SharedClock,
    cancel: CancellationToken,
    fired: Arc<AtomicU64>,
    refresh: impl Fn() + Send + Sync + 'static,
) {
    // Last boundary fired. A wake-up observed slightly before it on the
    // wall clock must not schedule that same boundary twice.
    let mut last: Option<DateTime<FixedOffset>> = None;

    loop {
        let now = clock.now();
        let from = last.map_or(now, |boundary| boundary.max(now));
        let Some(target) = next_hour_boundary(from) else {
            break;
        };
        let delay = (target - now).to_std().unwrap_or(Duration::ZERO);
        debug!(at = %target, delay_s = delay.as_secs(), "hourly refresh scheduled");

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {
                last = Some(target);
                fired.fetch_add(1, Ordering::Relaxed);
                refresh();
            }
        }
    }
    debug!("hourly refresh stopped");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::clock::TokioClock;

    fn at(raw: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(raw).unwrap()
    }

    #[test]
    fn boundary_is_the_next_local_hour() {
        assert_eq!(
            next_hour_boundary(at("2026-03-01T10:59:30+02:00")),
            Some(at("2026-03-01T11:00:00+02:00"))
        );
        assert_eq!(
            next_hour_boundary(at("2026-03-01T23:15:00-05:00")),
            Some(at("2026-03-02T00:00:00-05:00"))
        );
    }

    #[test]
    fn half_hour_offsets_align_to_local_not_utc_hours() {
        let now = at("2026-03-01T10:10:00+05:30");
        assert_eq!(next_hour_boundary(now), Some(at("2026-03-01T11:00:00+05:30")));
        assert_eq!(delay_until_next_hour(now), Duration::from_secs(50 * 60));
    }

    #[test]
    fn exactly_on_a_boundary_waits_a_full_hour() {
        assert_eq!(
            delay_until_next_hour(at("2026-03-01T10:00:00+00:00")),
            Duration::from_secs(3600)
        );
    }

    #[test]
    fn sub_second_precision_is_kept() {
        assert_eq!(
            delay_until_next_hour(at("2026-03-01T10:59:59.750+00:00")),
            Duration::from_millis(250)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn fires_at_each_boundary_and_reschedules() {
        let clock: SharedClock = Arc::new(TokioClock::starting_at(at("2026-03-01T10:59:30+02:00")));
        let cancel = CancellationToken::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let timer = HourlyRefresh::spawn(clock, &cancel, move || {
            h.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1, "fired at 11:00");

        tokio::time::sleep(Duration::from_secs(3_598)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 2, "fired at 12:00");
        assert_eq!(timer.fired(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_the_timer() {
        let clock: SharedClock = Arc::new(TokioClock::starting_at(at("2026-03-01T10:59:00+00:00")));
        let cancel = CancellationToken::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let _timer = HourlyRefresh::spawn(clock, &cancel, move || {
            h.fetch_add(1, Ordering::SeqCst);
        });

        cancel.cancel();
        tokio::time::sleep(Duration::from_secs(7_200)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_stops_the_timer() {
        let clock: SharedClock = Arc::new(TokioClock::starting_at(at("2026-03-01T10:59:00+00:00")));
        let cancel = CancellationToken::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let timer = HourlyRefresh::spawn(clock, &cancel, move || {
            h.fetch_add(1, Ordering::SeqCst);
        });

        drop(timer);
        tokio::time::sleep(Duration::from_secs(7_200)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
