//! Change notification fan-out.
//!
//! Consumers subscribe and receive a [`ChangeStream`]. Publishing never
//! blocks the registry writer: a subscriber whose buffer is full misses the
//! notification and the feed counts it as dropped. Consumers are expected
//! to pull current state from the registry, so a missed notification only
//! delays a refresh.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PlottrResult, TransportError};

use super::RegistryChange;

/// Unique identifier for a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new random subscription id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Change feed settings.
#[derive(Debug, Clone)]
pub struct ChangeFeedConfig {
    /// Per-subscription buffer capacity.
    pub stream_capacity: usize,
}

impl Default for ChangeFeedConfig {
    fn default() -> Self {
        Self {
            stream_capacity: 1024,
        }
    }
}

type Subscribers = Mutex<HashMap<SubscriptionId, Sender<RegistryChange>>>;

fn lock(subscribers: &Subscribers) -> MutexGuard<'_, HashMap<SubscriptionId, Sender<RegistryChange>>> {
    // A panicking subscriber cannot leave the map half-updated.
    match subscribers.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Registry change publisher.
#[derive(Debug)]
pub struct ChangeFeed {
    cfg: ChangeFeedConfig,
    subscribers: Arc<Subscribers>,
    dropped_events: AtomicU64,
}

impl ChangeFeed {
    /// Creates a feed without subscribers.
    #[must_use]
    pub fn new(cfg: ChangeFeedConfig) -> Self {
        Self {
            cfg,
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            dropped_events: AtomicU64::new(0),
        }
    }

    /// Register a new subscriber.
    pub fn subscribe(&self) -> ChangeStream {
        let subscription_id = SubscriptionId::new();
        let (tx, rx) = bounded::<RegistryChange>(self.cfg.stream_capacity.max(1));
        lock(&self.subscribers).insert(subscription_id, tx);

        ChangeStream {
            subscription_id,
            rx,
            subscribers: Arc::downgrade(&self.subscribers),
            unsubscribed: AtomicBool::new(false),
        }
    }

    /// Deliver a change to every subscriber without blocking.
    pub fn publish(&self, change: &RegistryChange) {
        lock(&self.subscribers).retain(|_, tx| match tx.try_send(change.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped_events.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }

    /// Notifications lost to full subscriber buffers.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(ChangeFeedConfig::default())
    }
}

/// A subscription to registry changes.
///
/// Dropping the stream unsubscribes. The stream disconnects once the feed
/// itself is dropped.
#[derive(Debug)]
pub struct ChangeStream {
    subscription_id: SubscriptionId,
    rx: Receiver<RegistryChange>,
    subscribers: Weak<Subscribers>,
    unsubscribed: AtomicBool,
}

impl ChangeStream {
    /// The subscription id backing this stream.
    #[must_use]
    pub const fn subscription_id(&self) -> SubscriptionId {
        self.subscription_id
    }

    /// Explicit unsubscription. Idempotent.
    pub fn unsubscribe(&self) {
        if self.unsubscribed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(subscribers) = self.subscribers.upgrade() {
            lock(&subscribers).remove(&self.subscription_id);
        }
    }

    /// Receive the next change (blocking).
    pub fn recv(&self) -> PlottrResult<RegistryChange> {
        self.rx.recv().map_err(|_| disconnected())
    }

    /// Receive the next change, or `None` if none arrives within `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> PlottrResult<Option<RegistryChange>> {
        match self.rx.recv_timeout(timeout) {
            Ok(change) => Ok(Some(change)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(disconnected()),
        }
    }

    /// Take a buffered change without waiting.
    #[must_use]
    pub fn try_recv(&self) -> Option<RegistryChange> {
        self.rx.try_recv().ok()
    }
}

fn disconnected() -> crate::error::PlottrError {
    TransportError::Disconnected {
        path: "change_stream".to_string(),
    }
    .into()
}

impl Drop for ChangeStream {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
