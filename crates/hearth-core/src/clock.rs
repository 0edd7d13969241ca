// ── Wall-clock source ──
//
// Cache expiry and hour-aligned scheduling both read wall-clock time.
// Reading it through a trait lets tests drive time deterministically.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Local, Utc};

/// Source of the current wall-clock time.
///
/// Returns a `FixedOffset` datetime so hour boundaries are computed in the
/// local offset in effect at the moment of the call.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<FixedOffset>;

    fn now_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// The system clock in the local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// Shared, type-erased clock handle.
pub type SharedClock = Arc<dyn Clock>;

pub(crate) fn system() -> SharedClock {
    Arc::new(SystemClock)
}

/// A clock pinned to a start instant that advances with tokio's clock.
///
/// Under `tokio::time::pause()` this moves only when the runtime's paused
/// time moves, which keeps timer tests and wall-clock reads in agreement.
#[derive(Debug, Clone)]
pub struct TokioClock {
    origin: DateTime<FixedOffset>,
    started: tokio::time::Instant,
}

impl TokioClock {
    pub fn starting_at(origin: DateTime<FixedOffset>) -> Self {
        Self {
            origin,
            started: tokio::time::Instant::now(),
        }
    }

    pub fn starting_at_utc(origin: DateTime<Utc>) -> Self {
        Self::starting_at(origin.fixed_offset())
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<FixedOffset> {
        chrono::Duration::from_std(self.started.elapsed())
            .ok()
            .and_then(|elapsed| self.origin.checked_add_signed(elapsed))
            .unwrap_or(self.origin)
    }
}
