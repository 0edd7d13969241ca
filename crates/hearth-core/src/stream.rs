// ── Reactive entity watches ──
//
// Per-entity subscription handle, usable directly or as a `Stream`.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::model::{Entity, EntityId, EntityKind};
use crate::registry::Subscription;

/// One observed change of a watched entity.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityUpdate {
    Updated(Arc<Entity>),
    /// The entity no longer exists upstream.
    Removed,
}

impl EntityUpdate {
    pub fn entity(&self) -> Option<&Arc<Entity>> {
        match self {
            Self::Updated(entity) => Some(entity),
            Self::Removed => None,
        }
    }
}

/// Observation of one entity (`useEntity`).
///
/// Fed by a registry listener, so only changes to this id wake it. The
/// listener is removed when the watch is dropped.
pub struct EntityWatch {
    entity_id: EntityId,
    receiver: watch::Receiver<Option<Arc<Entity>>>,
    _subscription: Subscription,
}

impl EntityWatch {
    pub(crate) fn new(
        entity_id: EntityId,
        receiver: watch::Receiver<Option<Arc<Entity>>>,
        subscription: Subscription,
    ) -> Self {
        Self {
            entity_id,
            receiver,
            _subscription: subscription,
        }
    }

    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    /// Current value, or `None` if the entity is unknown or was removed.
    pub fn current(&self) -> Option<Arc<Entity>> {
        self.receiver.borrow().clone()
    }

    pub fn kind(&self) -> Option<EntityKind> {
        self.receiver.borrow().as_deref().map(Entity::kind)
    }

    /// Wait for the next change of this entity.
    /// Returns `None` once the session has been dropped.
    pub async fn changed(&mut self) -> Option<EntityUpdate> {
        self.receiver.changed().await.ok()?;
        Some(match self.receiver.borrow_and_update().clone() {
            Some(entity) => EntityUpdate::Updated(entity),
            None => EntityUpdate::Removed,
        })
    }

    /// Convert into a `Stream`; the listener lives as long as the stream.
    pub fn into_stream(self) -> EntityWatchStream {
        let Self {
            receiver,
            _subscription: subscription,
            ..
        } = self;
        EntityWatchStream {
            inner: WatchStream::new(receiver),
            _subscription: subscription,
        }
    }
}

/// `Stream` of one entity's values, starting with the current one.
/// `None` items mean the entity was removed.
pub struct EntityWatchStream {
    inner: WatchStream<Option<Arc<Entity>>>,
    _subscription: Subscription,
}

impl Stream for EntityWatchStream {
    type Item = Option<Arc<Entity>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
