// ── Keyed asynchronous fetches ──
//
// Stale-while-revalidate over the cache store, with last-issued-wins
// commits per key.

mod coordinator;
mod handle;
mod status;

pub use coordinator::{Commit, FetchCoordinator, Fetcher, fetcher};
pub use handle::FetchHandle;
pub use status::{FetchState, FetchStatus};
