// ── Multi-source aggregation ──
//
// Fans one logical request out to several sources concurrently. A failing
// source contributes nothing; the rest still come back, each item tagged
// with the source that produced it.

use std::future::Future;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::model::EntityId;

/// An item together with the id of the source it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sourced<T> {
    pub source_id: EntityId,
    pub item: T,
}

/// Issue `request` for every source concurrently and flatten the results
/// in source order.
///
/// Never fails: a source whose request errors is logged and contributes
/// zero items. An empty `source_ids` issues no request at all. There is
/// no retry.
pub async fn fetch_all<T, F, Fut>(source_ids: &[EntityId], request: F) -> Vec<Sourced<T>>
where
    F: Fn(EntityId) -> Fut,
    Fut: Future<Output = Result<Vec<T>, CoreError>>,
{
    if source_ids.is_empty() {
        return Vec::new();
    }

    let results = join_all(source_ids.iter().map(|id| {
        let pending = request(id.clone());
        async move { (id, pending.await) }
    }))
    .await;

    let mut items = Vec::new();
    let mut failed = 0_usize;
    for (source_id, result) in results {
        match result {
            Ok(batch) => items.extend(batch.into_iter().map(|item| Sourced {
                source_id: source_id.clone(),
                item,
            })),
            Err(e) => {
                failed += 1;
                warn!(source = %source_id, error = %e, "source failed, contributing no items");
            }
        }
    }
    debug!(
        sources = source_ids.len(),
        failed,
        items = items.len(),
        "aggregated fetch complete"
    );
    items
}
