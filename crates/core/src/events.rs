//! Change notification between resource stores and the views that render them.
//!
//! Every write publishes a [`ChangeEvent`] on a [`ChangeBus`]. Views subscribe to the
//! resource kinds they display and re-fetch when a matching event arrives. The server uses
//! the same bus for its write log; the client cache uses it to tell mounted views that a
//! cached response is stale.

use api_shared::AuditAction;
use std::collections::HashSet;
use tokio::sync::broadcast;

use crate::constants::CHANGE_BUS_CAPACITY;

/// Resource categories a change can affect. Doubles as the client cache's tag type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    User,
    Patient,
    OutpatientRecord,
    ClinicalProforma,
    Prescription,
    AdlFile,
    ClinicalOption,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ResourceKind,
    pub id: Option<i64>,
    pub action: AuditAction,
}

impl ChangeEvent {
    pub fn new(kind: ResourceKind, id: Option<i64>, action: AuditAction) -> Self {
        Self { kind, id, action }
    }
}

#[derive(Clone, Debug)]
pub struct ChangeBus {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeBus {
    pub fn new() -> Self {
        Self::with_capacity(CHANGE_BUS_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event. Having no subscribers is not an error.
    pub fn publish(&self, event: ChangeEvent) {
        tracing::debug!(?event, "change published");
        let _ = self.tx.send(event);
    }

    /// Subscribes to every resource kind.
    pub fn subscribe(&self) -> ChangeSubscription {
        ChangeSubscription {
            rx: self.tx.subscribe(),
            kinds: None,
        }
    }

    /// Subscribes to the given resource kinds only.
    pub fn subscribe_to(&self, kinds: &[ResourceKind]) -> ChangeSubscription {
        ChangeSubscription {
            rx: self.tx.subscribe(),
            kinds: Some(kinds.iter().copied().collect()),
        }
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ChangeSubscription {
    rx: broadcast::Receiver<ChangeEvent>,
    kinds: Option<HashSet<ResourceKind>>,
}

impl ChangeSubscription {
    pub fn wants(&self, kind: ResourceKind) -> bool {
        self.kinds.as_ref().map_or(true, |k| k.contains(&kind))
    }

    /// Waits for the next matching event.
    ///
    /// Events missed because the subscriber lagged are skipped. Returns `None` once every
    /// bus handle has been dropped.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.wants(event.kind) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "change subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Returns the next matching event if one is already queued.
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if self.wants(event.kind) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}
