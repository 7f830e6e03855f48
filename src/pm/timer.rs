//! PM timer bank (C8): per-connection escalation timers, built on top of the
//! generic [`crate::alarm::AlarmService`].
//!
//! Each tracked connection gets up to three independent timer slots — one
//! per depth it can escalate towards (`Sniff`, `Park`, `Suspend`) — rather
//! than one timer per connection. A peer mid-escalation through the SNIFF
//! table can have its SNIFF slot rescheduled on every fresh idle window
//! without disturbing a PARK or SUSPEND slot armed by a different part of
//! the manager. `active_count` tracks how many of those slots are armed at
//! once, across every tracked connection, so a caller can bound how many
//! timers the bank is carrying without walking every peer.

use std::collections::HashMap;

use tokio::sync::mpsc;

use crate::le::ConnHandle;
use crate::SyncMutex;

/// Which escalation depth a timer slot is reserved for.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TimerSlot {
    Sniff,
    Park,
    Suspend,
}

const SLOTS: [TimerSlot; 3] = [TimerSlot::Sniff, TimerSlot::Park, TimerSlot::Suspend];

fn slot_index(slot: TimerSlot) -> usize {
    match slot {
        TimerSlot::Sniff => 0,
        TimerSlot::Park => 1,
        TimerSlot::Suspend => 2,
    }
}

/// What to do when a connection's timer slot fires.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PmAction {
    /// Escalate to the given SNIFF table index.
    EnterSniff(usize),
    /// Escalate to PARK.
    EnterPark,
    /// Escalate to the deepest tolerated mode (modelled as the last SNIFF
    /// table row, since classic link policy has no separate SUSPEND command).
    EnterSuspend,
}

#[derive(Default)]
struct PeerSlots {
    in_use: [bool; 3],
    action: [Option<PmAction>; 3],
}

/// Token identifying one connection's one timer slot on the underlying
/// [`crate::alarm::AlarmService`].
type Token = (ConnHandle, TimerSlot);

/// Per-connection, per-depth timer pool.
pub struct TimerBank {
    alarms: crate::alarm::AlarmService<Token>,
    peers: SyncMutex<HashMap<ConnHandle, PeerSlots>>,
    /// Total count of currently armed slots, across every connection.
    active_count: SyncMutex<usize>,
}

impl TimerBank {
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Token>) {
        let (alarms, rx) = crate::alarm::AlarmService::new();
        (
            Self {
                alarms,
                peers: SyncMutex::new(HashMap::new()),
                active_count: SyncMutex::new(0),
            },
            rx,
        )
    }

    /// Arms `slot` for `conn` to deliver `action` after `delay`, replacing
    /// whatever was previously armed in that slot.
    pub fn schedule(&self, conn: ConnHandle, slot: TimerSlot, action: PmAction, delay: std::time::Duration) {
        let idx = slot_index(slot);
        let mut peers = self.peers.lock();
        let peer = peers.entry(conn).or_default();
        if !peer.in_use[idx] {
            peer.in_use[idx] = true;
            *self.active_count.lock() += 1;
        }
        peer.action[idx] = Some(action);
        drop(peers);
        self.alarms.schedule((conn, slot), delay, crate::alarm::Kind::OneShot);
    }

    /// Disarms `slot` for `conn`, if armed.
    pub fn cancel(&self, conn: ConnHandle, slot: TimerSlot) {
        let idx = slot_index(slot);
        let mut peers = self.peers.lock();
        if let Some(peer) = peers.get_mut(&conn) {
            if peer.in_use[idx] {
                peer.in_use[idx] = false;
                peer.action[idx] = None;
                *self.active_count.lock() -= 1;
            }
        }
        drop(peers);
        self.alarms.cancel(&(conn, slot));
    }

    /// Disarms every slot for `conn`, e.g. on disconnect.
    pub fn cancel_all(&self, conn: &ConnHandle) {
        for slot in SLOTS {
            self.cancel(*conn, slot);
        }
        self.peers.lock().remove(conn);
    }

    /// Consumes and returns the action pending in `slot` for `conn`, if the
    /// alarm service token just delivered on the receiver names one still
    /// live. Returns `None` if the slot was cancelled or rescheduled between
    /// the timer firing and this call.
    pub fn take_fired(&self, conn: ConnHandle, slot: TimerSlot) -> Option<PmAction> {
        if self.alarms.is_scheduled(&(conn, slot)) {
            // A newer schedule() replaced this firing before we got to it.
            return None;
        }
        let idx = slot_index(slot);
        let mut peers = self.peers.lock();
        let peer = peers.get_mut(&conn)?;
        if !peer.in_use[idx] {
            return None;
        }
        peer.in_use[idx] = false;
        let action = peer.action[idx].take();
        if action.is_some() {
            *self.active_count.lock() -= 1;
        }
        action
    }

    /// Whether `conn` has `slot` currently armed.
    #[must_use]
    pub fn is_armed(&self, conn: ConnHandle, slot: TimerSlot) -> bool {
        self.peers.lock().get(&conn).is_some_and(|p| p.in_use[slot_index(slot)])
    }

    /// Total number of currently armed slots, across every connection.
    #[must_use]
    pub fn active_count(&self) -> usize {
        *self.active_count.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn fired_action_is_delivered_once() {
        let (bank, mut rx) = TimerBank::new();
        let conn = ConnHandle::new(5).unwrap();
        bank.schedule(conn, TimerSlot::Sniff, PmAction::EnterSniff(0), Duration::from_millis(10));
        tokio::time::advance(Duration::from_millis(11)).await;
        assert_eq!(rx.recv().await, Some((conn, TimerSlot::Sniff)));
        assert_eq!(bank.take_fired(conn, TimerSlot::Sniff), Some(PmAction::EnterSniff(0)));
        assert_eq!(bank.take_fired(conn, TimerSlot::Sniff), None, "action is consumed, not repeated");
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_suppresses_a_pending_action() {
        let (bank, mut rx) = TimerBank::new();
        let conn = ConnHandle::new(6).unwrap();
        bank.schedule(conn, TimerSlot::Park, PmAction::EnterPark, Duration::from_millis(10));
        bank.cancel(conn, TimerSlot::Park);
        tokio::time::advance(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn reschedule_before_fire_replaces_the_action() {
        let (bank, mut rx) = TimerBank::new();
        let conn = ConnHandle::new(7).unwrap();
        bank.schedule(conn, TimerSlot::Sniff, PmAction::EnterSniff(0), Duration::from_millis(5));
        bank.schedule(conn, TimerSlot::Sniff, PmAction::EnterSniff(1), Duration::from_millis(10));
        tokio::time::advance(Duration::from_millis(11)).await;
        assert_eq!(rx.recv().await, Some((conn, TimerSlot::Sniff)));
        assert_eq!(bank.take_fired(conn, TimerSlot::Sniff), Some(PmAction::EnterSniff(1)));
    }

    #[test]
    fn independent_slots_do_not_disturb_each_other() {
        let (bank, _rx) = TimerBank::new();
        let conn = ConnHandle::new(8).unwrap();
        bank.schedule(conn, TimerSlot::Sniff, PmAction::EnterSniff(0), Duration::from_secs(5));
        bank.schedule(conn, TimerSlot::Park, PmAction::EnterPark, Duration::from_secs(10));
        assert!(bank.is_armed(conn, TimerSlot::Sniff));
        assert!(bank.is_armed(conn, TimerSlot::Park));
        assert!(!bank.is_armed(conn, TimerSlot::Suspend));
        bank.cancel(conn, TimerSlot::Sniff);
        assert!(!bank.is_armed(conn, TimerSlot::Sniff));
        assert!(bank.is_armed(conn, TimerSlot::Park), "cancelling one slot must not touch another");
    }

    #[test]
    fn active_count_tracks_armed_slots_across_peers() {
        let (bank, _rx) = TimerBank::new();
        let a = ConnHandle::new(1).unwrap();
        let b = ConnHandle::new(2).unwrap();
        assert_eq!(bank.active_count(), 0);
        bank.schedule(a, TimerSlot::Sniff, PmAction::EnterSniff(0), Duration::from_secs(5));
        bank.schedule(b, TimerSlot::Park, PmAction::EnterPark, Duration::from_secs(5));
        assert_eq!(bank.active_count(), 2);
        bank.cancel_all(&a);
        assert_eq!(bank.active_count(), 1);
        bank.cancel_all(&b);
        assert_eq!(bank.active_count(), 0);
    }
}
