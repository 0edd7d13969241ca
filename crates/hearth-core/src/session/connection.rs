// ── Attached backend ──

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use crate::backend::{Backend, ServiceCall};
use crate::error::CoreError;
use crate::model::Entity;

struct Attached {
    backend: Arc<dyn Backend>,
    since: DateTime<Utc>,
}

/// The session's current backend, swappable while fetches are running.
///
/// Fetchers hold an `Arc<Connection>` rather than the session so that a
/// pending fetch never keeps the session alive.
#[derive(Default)]
pub(crate) struct Connection {
    current: ArcSwapOption<Attached>,
}

impl Connection {
    pub(crate) fn attach(&self, backend: Arc<dyn Backend>) {
        self.current.store(Some(Arc::new(Attached {
            backend,
            since: Utc::now(),
        })));
    }

    pub(crate) fn detach(&self) -> bool {
        self.current.swap(None).is_some()
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.current.load().is_some()
    }

    pub(crate) fn attached_since(&self) -> Option<DateTime<Utc>> {
        self.current.load().as_ref().map(|a| a.since)
    }

    pub(crate) fn entities(&self) -> Option<Vec<Entity>> {
        self.current.load().as_ref().map(|a| a.backend.entities())
    }

    /// Issue `call` on the attached backend.
    pub(crate) async fn call(&self, call: ServiceCall) -> Result<Value, CoreError> {
        // Take the backend out of the guard before awaiting.
        let backend = match self.current.load_full() {
            Some(attached) => Arc::clone(&attached.backend),
            None => return Err(CoreError::ConnectionUnavailable),
        };
        let ServiceCall {
            domain,
            service,
            target,
            ..
        } = call.clone();
        debug!(%domain, %service, %target, "service call");
        backend
            .call(call)
            .await
            .map_err(|source| CoreError::Backend {
                domain,
                service,
                target,
                source,
            })
    }
}
