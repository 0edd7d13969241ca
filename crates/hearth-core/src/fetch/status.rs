// ── Fetch status ──

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::Display;

use crate::error::CoreError;

/// What a consumer should render for a keyed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FetchStatus {
    /// No data of any kind yet.
    Loading,
    /// Showing a persisted value that no fetch in this session has confirmed.
    Cached,
    /// Showing a value fetched in this session while a newer fetch runs.
    Refreshing,
    /// Current value is fresh and nothing is outstanding.
    Ready,
}

impl FetchStatus {
    pub fn derive(has_data: bool, is_fresh: bool, in_flight: bool) -> Self {
        match (has_data, is_fresh, in_flight) {
            (false, _, _) => Self::Loading,
            (true, false, _) => Self::Cached,
            (true, true, true) => Self::Refreshing,
            (true, true, false) => Self::Ready,
        }
    }
}

/// Observable state of one fetch key.
#[derive(Debug, Clone, Default)]
pub struct FetchState {
    pub data: Option<Arc<Value>>,
    /// `true` once a fetch issued in this session has committed `data`.
    pub fresh: bool,
    pub in_flight: bool,
    /// Error of the latest issued fetch, cleared by the next success.
    pub error: Option<Arc<CoreError>>,
    /// Latest generation issued for the key.
    pub generation: u64,
    /// Generation whose result `data` holds (0 for cached or absent data).
    pub committed_generation: u64,
}

impl FetchState {
    pub fn status(&self) -> FetchStatus {
        FetchStatus::derive(self.data.is_some(), self.fresh, self.in_flight)
    }
}
