// ── Backend connection boundary ──
//
// hearth-core does not own the connection to the home-automation server.
// It depends on this shape only: a synchronous entity snapshot, a
// request/response primitive, and a channel of push events.

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BackendError;
use crate::model::{Entity, EntityId};

/// A request against the backend's service registry
/// (e.g. `calendar.get_events` targeted at `calendar.family`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCall {
    pub domain: String,
    pub service: String,
    pub data: Value,
    pub target: EntityId,
}

impl ServiceCall {
    pub fn new(
        domain: impl Into<String>,
        service: impl Into<String>,
        data: Value,
        target: EntityId,
    ) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            data,
            target,
        }
    }
}

/// The connection object a dashboard session is attached to.
pub trait Backend: Send + Sync + 'static {
    /// Current value of every entity the connection knows about.
    fn entities(&self) -> Vec<Entity>;

    /// Issue a service call expecting a response payload.
    fn call(&self, call: ServiceCall) -> BoxFuture<'static, Result<Value, BackendError>>;
}

/// One inbound push notification.
///
/// `new_state: None` means the entity was removed upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushEvent {
    pub entity_id: EntityId,
    pub new_state: Option<Entity>,
}

impl PushEvent {
    pub fn updated(entity: Entity) -> Self {
        Self {
            entity_id: entity.entity_id.clone(),
            new_state: Some(entity),
        }
    }

    pub fn removed(entity_id: impl Into<EntityId>) -> Self {
        Self {
            entity_id: entity_id.into(),
            new_state: None,
        }
    }
}
