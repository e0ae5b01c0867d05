//! Object lifecycle notifications.
//!
//! Every subscriber owns one crossbeam channel. Publishing never blocks: a
//! full bounded queue drops the event for that subscriber, and subscribers
//! that hung up or cancelled are pruned on the next publish. Events from one
//! publishing thread arrive in publish order; there is no ordering across
//! publishing threads.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender, TrySendError};
use thiserror::Error;
use world_schema::{MapObject, ObjectEventMessage, ObjectId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectEvent {
    Added(MapObject),
    Removed(ObjectId),
    Updated(MapObject),
}

impl ObjectEvent {
    pub fn object_id(&self) -> ObjectId {
        match self {
            ObjectEvent::Added(object) | ObjectEvent::Updated(object) => object.id,
            ObjectEvent::Removed(id) => *id,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ObjectEvent::Added(_) => "added",
            ObjectEvent::Removed(_) => "removed",
            ObjectEvent::Updated(_) => "updated",
        }
    }
}

impl From<ObjectEvent> for ObjectEventMessage {
    fn from(event: ObjectEvent) -> Self {
        match event {
            ObjectEvent::Added(object) => ObjectEventMessage::added(object.id),
            ObjectEvent::Removed(id) => ObjectEventMessage::removed(id),
            ObjectEvent::Updated(object) => ObjectEventMessage::updated(object),
        }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("subscription was cancelled")]
    Cancelled,
    #[error("event hub has shut down")]
    Closed,
    #[error("no event arrived before the timeout")]
    Timeout,
}

#[derive(Debug)]
struct CancelState {
    cancelled: AtomicBool,
    // Dropped on cancel so every waiter's `select!` wakes up.
    wake: Mutex<Option<Sender<()>>>,
    waiter: Receiver<()>,
}

/// Shared cancellation flag. Clones observe the same state.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    state: Arc<CancelState>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        let (wake, waiter) = bounded(0);
        Self {
            state: Arc::new(CancelState {
                cancelled: AtomicBool::new(false),
                wake: Mutex::new(Some(wake)),
                waiter,
            }),
        }
    }

    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::Release);
        self.state
            .wake
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }

    fn waiter(&self) -> &Receiver<()> {
        &self.state.waiter
    }
}

struct SubscriberSlot {
    id: u64,
    sender: Sender<ObjectEvent>,
    token: CancellationToken,
}

/// Fan-out point for [`ObjectEvent`]s.
pub struct EventHub {
    capacity: Option<usize>,
    subscribers: Mutex<Vec<SubscriberSlot>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHub")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(None)
    }
}

impl EventHub {
    /// `capacity` bounds each subscriber's queue; `None` means unbounded.
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            capacity,
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        self.subscribe_with(CancellationToken::new())
    }

    /// Subscribe under an existing token, e.g. one tied to a client stream.
    pub fn subscribe_with(&self, token: CancellationToken) -> Subscription {
        let (sender, events) = match self.capacity {
            Some(capacity) => bounded(capacity),
            None => unbounded(),
        };
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut guard = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        guard.push(SubscriberSlot {
            id,
            sender,
            token: token.clone(),
        });
        let active = guard.len();
        drop(guard);
        tracing::debug!(
            target: "world::events",
            subscriber = id,
            active,
            "events.subscribed"
        );
        Subscription { id, events, token }
    }

    /// Offer `event` to every live subscriber without blocking. Returns the
    /// number of subscribers that accepted it.
    pub fn publish(&self, event: ObjectEvent) -> usize {
        let mut delivered = 0;
        let mut guard = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        guard.retain_mut(|slot| {
            if slot.token.is_cancelled() {
                tracing::debug!(
                    target: "world::events",
                    subscriber = slot.id,
                    "events.pruned=cancelled"
                );
                return false;
            }
            match slot.sender.try_send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        target: "world::events",
                        subscriber = slot.id,
                        event = event.label(),
                        object_id = event.object_id().0,
                        "events.dropped=queue_full"
                    );
                    true
                }
                Err(TrySendError::Disconnected(_)) => {
                    tracing::debug!(
                        target: "world::events",
                        subscriber = slot.id,
                        "events.pruned=disconnected"
                    );
                    false
                }
            }
        });
        delivered
    }

    /// Live subscribers as of the last publish.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Receiving end of one subscriber's queue.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    events: Receiver<ObjectEvent>,
    token: CancellationToken,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Block until an event arrives, the token fires, or the hub goes away.
    /// Events still queued when the token fires are discarded.
    pub fn recv(&self) -> Result<ObjectEvent, SubscriptionError> {
        if self.token.is_cancelled() {
            return Err(SubscriptionError::Cancelled);
        }
        let received = select! {
            recv(self.events) -> event => event.map_err(|_| SubscriptionError::Closed),
            recv(self.token.waiter()) -> _ => Err(SubscriptionError::Cancelled),
        };
        self.after_receive(received)
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<ObjectEvent, SubscriptionError> {
        if self.token.is_cancelled() {
            return Err(SubscriptionError::Cancelled);
        }
        let received = select! {
            recv(self.events) -> event => event.map_err(|_| SubscriptionError::Closed),
            recv(self.token.waiter()) -> _ => Err(SubscriptionError::Cancelled),
            default(timeout) => Err(SubscriptionError::Timeout),
        };
        self.after_receive(received)
    }

    /// Next queued event, if any, without blocking.
    pub fn try_recv(&self) -> Option<ObjectEvent> {
        if self.token.is_cancelled() {
            return None;
        }
        self.events.try_recv().ok()
    }

    /// Events queued for this subscriber right now.
    pub fn pending(&self) -> usize {
        self.events.len()
    }

    /// Run `handler` for every event until cancellation or hub shutdown.
    pub fn for_each(self, mut handler: impl FnMut(ObjectEvent)) -> SubscriptionError {
        loop {
            match self.recv() {
                Ok(event) => handler(event),
                Err(reason) => return reason,
            }
        }
    }

    fn after_receive(
        &self,
        received: Result<ObjectEvent, SubscriptionError>,
    ) -> Result<ObjectEvent, SubscriptionError> {
        match received {
            Ok(_) if self.token.is_cancelled() => Err(SubscriptionError::Cancelled),
            other => other,
        }
    }
}
