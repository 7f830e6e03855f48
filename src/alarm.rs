//! Periodic alarm service (C3): named one-shot and periodic timers with
//! cancellation, delivered on a single handler task.
//!
//! Timers are identified by a caller-chosen token (the advertiser id for
//! address rotation, a `(peer, timer index)` pair for PM mode timers, …).
//! `schedule` silently replaces any existing scheduling of the same token,
//! which is what lets callers "restart" a timer without bookkeeping of their
//! own. Firing is delivered by posting the token on an unbounded channel
//! rather than by invoking a callback directly, so the owning manager can
//! process it alongside HCI completions on its own task — the
//! message-passing shape the rest of the crate uses for every other
//! controller-originated event.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::trace;

use crate::SyncMutex;

/// How a scheduled alarm repeats.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Kind {
    /// Fires once, then forgets the token.
    OneShot,
    /// Fires every `Duration`, indefinitely, until cancelled.
    Periodic(Duration),
}

/// A monotonically increasing scheduling generation. Each `schedule`/`cancel`
/// of a token bumps its generation; a fired-but-queued alarm checks its
/// captured generation against the live one and is a no-op if they differ —
/// what makes `cancel` safe against an alarm that has already fired but not
/// yet been delivered.
type Generation = u64;

#[derive(Debug)]
struct Slot {
    generation: Generation,
}

type Table<T> = Arc<SyncMutex<HashMap<T, Slot>>>;

/// Delivers fired tokens of type `T` on an unbounded channel. Cloning an
/// `AlarmService` shares the same timer table; every clone can schedule and
/// cancel the same tokens, and either can be dropped without affecting
/// in-flight timers.
#[derive(Debug)]
pub struct AlarmService<T> {
    slots: Table<T>,
    tx: mpsc::UnboundedSender<T>,
}

impl<T> Clone for AlarmService<T> {
    fn clone(&self) -> Self {
        Self {
            slots: Arc::clone(&self.slots),
            tx: self.tx.clone(),
        }
    }
}

impl<T: Clone + Eq + Hash + Send + Sync + std::fmt::Debug + 'static> AlarmService<T> {
    /// Creates a new alarm service. Fired tokens are delivered on the
    /// returned receiver; the caller drains it on its main handler task.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                slots: Arc::new(SyncMutex::new(HashMap::new())),
                tx,
            },
            rx,
        )
    }

    /// Cancels any existing scheduling of `token` and enrolls a new one.
    pub fn schedule(&self, token: T, delay: Duration, kind: Kind) {
        let generation = {
            let mut slots = self.slots.lock();
            let generation = slots.get(&token).map_or(0, |s| s.generation) + 1;
            slots.insert(token.clone(), Slot { generation });
            generation
        };
        Self::spawn_wait(Arc::clone(&self.slots), self.tx.clone(), token, delay, kind, generation);
    }

    /// Idempotent: cancelling a token that isn't scheduled is a no-op.
    pub fn cancel(&self, token: &T) {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get_mut(token) {
            slot.generation += 1;
        }
        slots.remove(token);
    }

    /// Returns whether `token` currently has a live scheduling.
    #[must_use]
    pub fn is_scheduled(&self, token: &T) -> bool {
        self.slots.lock().contains_key(token)
    }

    fn spawn_wait(
        slots: Table<T>,
        tx: mpsc::UnboundedSender<T>,
        token: T,
        delay: Duration,
        kind: Kind,
        generation: Generation,
    ) {
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let still_live = {
                let mut guard = slots.lock();
                match guard.get(&token) {
                    Some(slot) if slot.generation == generation => {
                        if let Kind::OneShot = kind {
                            guard.remove(&token);
                        }
                        true
                    }
                    _ => {
                        trace!(?token, "alarm fired after cancellation, dropping");
                        false
                    }
                }
            };
            if !still_live || tx.send(token.clone()).is_err() {
                return;
            }
            if let Kind::Periodic(period) = kind {
                Self::spawn_wait(slots, tx, token, period, kind, generation);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn one_shot_fires_once() {
        let (svc, mut rx) = AlarmService::new();
        svc.schedule(1_u32, Duration::from_millis(10), Kind::OneShot);
        tokio::time::advance(Duration::from_millis(11)).await;
        assert_eq!(rx.recv().await, Some(1));
        assert!(!svc.is_scheduled(&1));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_before_fire_suppresses_delivery() {
        let (svc, mut rx) = AlarmService::new();
        svc.schedule(7_u32, Duration::from_millis(10), Kind::OneShot);
        svc.cancel(&7);
        tokio::time::advance(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn reschedule_replaces_pending_timer() {
        let (svc, mut rx) = AlarmService::new();
        svc.schedule(3_u32, Duration::from_millis(5), Kind::OneShot);
        svc.schedule(3_u32, Duration::from_millis(50), Kind::OneShot);
        tokio::time::advance(Duration::from_millis(10)).await;
        assert!(rx.try_recv().is_err(), "first scheduling must not fire");
        tokio::time::advance(Duration::from_millis(50)).await;
        assert_eq!(rx.recv().await, Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_refires() {
        let (svc, mut rx) = AlarmService::new();
        svc.schedule(9_u32, Duration::from_millis(10), Kind::Periodic(Duration::from_millis(10)));
        for _ in 0..3 {
            tokio::time::advance(Duration::from_millis(10)).await;
            assert_eq!(rx.recv().await, Some(9));
        }
        svc.cancel(&9);
    }
}
