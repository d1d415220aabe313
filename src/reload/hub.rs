//! Live-reload broadcast hub.
//!
//! Every connected browser holds a [`Subscription`]: a bounded mailbox
//! registered in the hub. Broadcasts come from the build actor (reload,
//! build errors) and the heartbeat timer; subscriptions come and go from
//! the WebSocket acceptor and pump threads.
//!
//! Two locks, always taken in this order:
//!
//! - `emit`: held for a whole broadcast (and while a new subscriber is
//!   seeded), so every mailbox sees events in the same order. It also guards
//!   the unresolved build errors replayed to new subscribers.
//! - `subscribers`: the registry itself, held only to insert, remove or
//!   snapshot senders. Enqueueing happens after it is released.
//!
//! A full mailbox drops the new event for that subscriber only; reload and
//! ping are idempotent and superseded by the next one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::message::ReloadEvent;
use crate::core::Target;
use crate::debug;

/// Events buffered per subscriber before new ones are dropped.
pub const MAILBOX_DEPTH: usize = 10;

/// Interval between `ping` broadcasts.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

pub type SubscriberId = u64;

/// Fan-out point for reload, build-error and heartbeat events.
#[derive(Clone)]
pub struct LiveReloadHub {
    inner: Arc<Inner>,
}

struct Inner {
    subscribers: Mutex<FxHashMap<SubscriberId, Sender<ReloadEvent>>>,
    emit: Mutex<PendingErrors>,
    next_id: AtomicU64,
    depth: usize,
}

/// Latest unresolved build error per target.
#[derive(Default)]
struct PendingErrors {
    ui: Option<ReloadEvent>,
    game: Option<ReloadEvent>,
    untagged: Option<ReloadEvent>,
}

impl PendingErrors {
    fn slot(&mut self, target: Option<Target>) -> &mut Option<ReloadEvent> {
        match target {
            Some(Target::Ui) => &mut self.ui,
            Some(Target::Game) => &mut self.game,
            None => &mut self.untagged,
        }
    }

    /// A successful build of `target` resolves its error and any untagged one.
    fn resolve(&mut self, target: Target) {
        *self.slot(Some(target)) = None;
        self.untagged = None;
    }

    fn iter(&self) -> impl Iterator<Item = &ReloadEvent> {
        [&self.ui, &self.game, &self.untagged]
            .into_iter()
            .filter_map(Option::as_ref)
    }
}

impl Default for LiveReloadHub {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveReloadHub {
    pub fn new() -> Self {
        Self::with_mailbox_depth(MAILBOX_DEPTH)
    }

    pub fn with_mailbox_depth(depth: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                subscribers: Mutex::new(FxHashMap::default()),
                emit: Mutex::new(PendingErrors::default()),
                next_id: AtomicU64::new(1),
                depth: depth.max(1),
            }),
        }
    }

    /// Register a new subscriber.
    ///
    /// Unresolved build errors are queued first, so a browser that connects
    /// while a module is broken shows the failure right away.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = crossbeam::channel::bounded(self.inner.depth);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        let pending = self.inner.emit.lock();
        for event in pending.iter() {
            let _ = tx.try_send(event.clone());
        }
        let total = {
            let mut subscribers = self.inner.subscribers.lock();
            subscribers.insert(id, tx);
            subscribers.len()
        };
        drop(pending);

        debug!("reload"; "subscriber {} joined (total: {})", id, total);
        Subscription {
            id,
            mailbox: rx,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Remove a subscriber. Nothing is delivered to it afterwards.
    pub fn unsubscribe(&self, subscription: Subscription) {
        drop(subscription);
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    /// Tell clients `target` was rebuilt.
    pub fn reload(&self, target: Target) -> usize {
        self.broadcast(ReloadEvent::Reload { target }, |pending| {
            pending.resolve(target);
        })
    }

    /// Tell clients a build failed, with its captured output.
    pub fn build_error(&self, target: Option<Target>, stdout: &str, stderr: &str) -> usize {
        let event = ReloadEvent::build_error(target, stdout, stderr);
        let remembered = event.clone();
        self.broadcast(event, move |pending| {
            *pending.slot(target) = Some(remembered);
        })
    }

    pub fn heartbeat(&self) -> usize {
        self.broadcast(ReloadEvent::Ping, |_| {})
    }

    /// Broadcast `ping` every `period` until `shutdown` fires.
    pub fn spawn_heartbeat(&self, period: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let hub = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        hub.heartbeat();
                    }
                }
            }
        })
    }

    /// Deliver `event` to every current subscriber; returns how many got it.
    fn broadcast(&self, event: ReloadEvent, update: impl FnOnce(&mut PendingErrors)) -> usize {
        let mut pending = self.inner.emit.lock();
        update(&mut pending);

        let snapshot: Vec<(SubscriberId, Sender<ReloadEvent>)> = self
            .inner
            .subscribers
            .lock()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut delivered = 0;
        for (id, tx) in snapshot {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    debug!("reload"; "subscriber {} is behind, dropped {}", id, event.to_json());
                }
                // Unsubscribed after the snapshot was taken.
                Err(TrySendError::Disconnected(_)) => {}
            }
        }
        drop(pending);
        delivered
    }
}

/// A subscriber's end of the hub. Dropping it unsubscribes.
pub struct Subscription {
    id: SubscriberId,
    mailbox: Receiver<ReloadEvent>,
    hub: Weak<Inner>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Block until the next event; `None` once the hub is gone.
    pub fn recv(&self) -> Option<ReloadEvent> {
        self.mailbox.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<ReloadEvent, RecvTimeoutError> {
        self.mailbox.recv_timeout(timeout)
    }

    pub fn try_recv(&self) -> Option<ReloadEvent> {
        match self.mailbox.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Everything currently queued.
    pub fn drain(&self) -> Vec<ReloadEvent> {
        self.mailbox.try_iter().collect()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.hub.upgrade() {
            let remaining = {
                let mut subscribers = inner.subscribers.lock();
                subscribers.remove(&self.id);
                subscribers.len()
            };
            debug!("reload"; "subscriber {} left (total: {})", self.id, remaining);
        }
    }
}
