//! Power manager (C9): per-connection classic link-policy state machine.
//! Arbitrates the PM spec table (`pm::policy`) over every service active on
//! a connection, escalates an idle connection through the SNIFF table
//! towards PARK/SUSPEND, negotiates sniff subrating, and reacts to
//! controller-driven mode changes (the controller, not just this host, can
//! exit SNIFF/PARK on its own — e.g. on incoming traffic).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::config::Config;
use crate::hci::cmd::power::{self, ParkParams, SniffParams, SniffSubrateParams};
use crate::hci::consts::PmMode;
use crate::hci::dispatcher::{CommandSink, Dispatcher};
use crate::hci::{Opcode, Status};
use crate::le::ConnHandle;
use crate::pm::policy::{self, AppId, ConnStatus, SpecAction};
use crate::pm::services::{ServiceId, ServicesTable};
use crate::pm::table::{self, PARK_IDX};
use crate::pm::timer::{PmAction, TimerBank, TimerSlot};
use crate::pm::{Error, Result};
use crate::SyncMutex;

/// Callback surface invoked as mode transitions complete or the controller
/// reports one unprompted.
pub trait Callbacks: Send {
    fn on_mode_changed(&mut self, _conn: ConnHandle, _mode: PmMode, _interval: u16) {}
    fn on_mode_change_failed(&mut self, _conn: ConnHandle, _status: Status) {}
}

#[derive(Debug)]
struct Peer {
    mode: PmMode,
    /// Current SNIFF table index, meaningful only while `mode == Sniff`.
    sniff_idx: usize,
    interval: u16,
    /// Action the manager most recently asked the controller for, kept so
    /// `apply_mode_change` knows what to blame on failure.
    pending_action: Option<SpecAction>,
    /// Set by `apply_mode_change` when the controller rejects a mode
    /// change; `recompute` skips re-proposing this exact depth until the
    /// connection's next `Open` status clears it.
    failed_action: Option<SpecAction>,
    /// True while a SCO link is up on this connection (set by the host,
    /// e.g. on HFP audio connect); suppresses sniff-subrating negotiation.
    sco_active: bool,
    /// Per-connection sniff-subrating preference (e.g. HID asking for the
    /// lowest possible latency); when false, negotiation is skipped.
    ssr_allowed: bool,
    /// Set while an A2DP stream has forced a tight subrate via
    /// `force_tight_subrate`, so the next idle transition knows to revert it.
    tight_subrate_forced: bool,
}

impl Default for Peer {
    fn default() -> Self {
        Self {
            mode: PmMode::Active,
            sniff_idx: 0,
            interval: 0,
            pending_action: None,
            failed_action: None,
            sco_active: false,
            ssr_allowed: true,
            tight_subrate_forced: false,
        }
    }
}

/// Drives classic link-policy power mode for every tracked connection.
pub struct PowerManager<S> {
    dispatcher: Dispatcher<S>,
    services: ServicesTable,
    timers: TimerBank,
    peers: HashMap<ConnHandle, Peer>,
    config: Arc<Config>,
    callbacks: Arc<SyncMutex<Box<dyn Callbacks>>>,
}

impl<S: CommandSink> PowerManager<S> {
    #[must_use]
    pub fn new(
        sink: S,
        config: Arc<Config>,
        callbacks: Box<dyn Callbacks>,
    ) -> (Self, tokio::sync::mpsc::UnboundedReceiver<(ConnHandle, TimerSlot)>) {
        let (timers, rx) = TimerBank::new();
        (
            Self {
                dispatcher: Dispatcher::new(sink),
                services: ServicesTable::new(),
                timers,
                peers: HashMap::new(),
                config,
                callbacks: Arc::new(SyncMutex::new(callbacks)),
            },
            rx,
        )
    }

    /// Starts tracking a new connection, at `Active` with no services.
    pub fn add_connection(&mut self, conn: ConnHandle) {
        self.peers.insert(conn, Peer::default());
    }

    /// Stops tracking `conn`, cancelling its timers and forgetting its
    /// service registrations.
    pub fn remove_connection(&mut self, conn: ConnHandle) {
        self.peers.remove(&conn);
        self.services.clear(conn);
        self.timers.cancel_all(&conn);
    }

    /// Sets whether a SCO link is currently up on `conn`. While true,
    /// sniff-subrating negotiation is suppressed — renegotiating subrate
    /// parameters mid-call risks audible audio glitches.
    pub fn set_sco_active(&mut self, conn: ConnHandle, active: bool) {
        if let Some(peer) = self.peers.get_mut(&conn) {
            peer.sco_active = active;
        }
    }

    /// Sets `conn`'s sniff-subrating preference. A profile that needs the
    /// tightest possible latency (e.g. HID) calls this with `false` to opt
    /// its connection out of subrating entirely.
    pub fn set_ssr_preference(&mut self, conn: ConnHandle, allow: bool) {
        if let Some(peer) = self.peers.get_mut(&conn) {
            peer.ssr_allowed = allow;
        }
    }

    /// Reports a service's connection status on `conn`, re-arbitrating the
    /// connection's power mode across every service still active on it.
    /// `Open` also clears any mode this connection previously failed to
    /// enter, giving the spec table another chance to propose it.
    pub fn conn_status_change(
        &mut self,
        conn: ConnHandle,
        service: ServiceId,
        app_id: AppId,
        state: ConnStatus,
    ) -> Result<()> {
        if !self.peers.contains_key(&conn) {
            return Err(Error::UnknownConnection);
        }
        self.services.update(conn, service, app_id, state)?;
        if matches!(state, ConnStatus::Open) {
            if let Some(peer) = self.peers.get_mut(&conn) {
                peer.failed_action = None;
            }
        }
        self.recompute(conn);
        self.handle_a2dp_busy_idle(conn, app_id, state);
        self.services.clear_new_requests(conn);
        Ok(())
    }

    /// A2DP going `Busy` (streaming) forces subrating tight for the
    /// duration of the stream; going back `Idle`/`Close` reverts it. Other
    /// profiles never touch this flag.
    fn handle_a2dp_busy_idle(&mut self, conn: ConnHandle, app_id: AppId, state: ConnStatus) {
        if app_id != AppId::A2dp {
            return;
        }
        match state {
            ConnStatus::Busy => self.force_tight_subrate(conn),
            ConnStatus::Idle | ConnStatus::Close | ConnStatus::NoPref => self.revert_tight_subrate(conn),
            ConnStatus::Open => {}
        }
    }

    /// Arbitrates every active service's PM spec entry for `conn` and drives
    /// the connection toward the winning action: the combined allow-mask is
    /// the intersection of every active service's tolerated modes (a depth
    /// only applies if every service accepts it), and the winning action is
    /// the shallowest one any single active service is currently asking
    /// for — ensuring a service that wants to stay awake always outranks
    /// one that wants to sleep deeper. A connection with no active services
    /// (or none expressing an opinion) is left to the idle-escalation
    /// ladder in `escalate`.
    fn recompute(&mut self, conn: ConnHandle) {
        let mut allowed = policy::ModeMask::all();
        let mut winning: Option<SpecAction> = None;
        let mut timeout_ms = 0u32;
        let mut any = false;
        for entry in self.services.entries(conn) {
            any = true;
            let spec = policy::spec_for(entry.app_id, &self.config.pm_spec_overrides);
            allowed &= spec.allowed;
            if let Some(e) = spec.entry_for(entry.state) {
                if e.action != SpecAction::NoAction && winning.is_none_or(|w| e.action < w) {
                    winning = Some(e.action);
                    timeout_ms = e.timeout_ms;
                }
            }
        }
        if !any {
            return;
        }
        let Some(mut action) = winning else { return };
        let failed = self.peers.get(&conn).and_then(|p| p.failed_action);
        while action != SpecAction::Active
            && (!allowed.contains(action.mode_mask()) || Some(action) == failed)
        {
            action = action.shallower();
        }
        self.drive_toward(conn, action, timeout_ms);
    }

    /// Arms or executes `action` for `conn`. `Active` always executes
    /// immediately (never worth delaying); anything deeper is armed on the
    /// matching timer slot for `timeout_ms` so a momentarily idle service
    /// doesn't thrash the radio.
    fn drive_toward(&mut self, conn: ConnHandle, action: SpecAction, timeout_ms: u32) {
        match action {
            SpecAction::Active | SpecAction::NoAction => {
                self.timers.cancel(conn, TimerSlot::Sniff);
                self.timers.cancel(conn, TimerSlot::Park);
                self.timers.cancel(conn, TimerSlot::Suspend);
                self.execute_action(conn, SpecAction::Active);
            }
            SpecAction::Park => {
                self.timers.schedule(conn, TimerSlot::Park, PmAction::EnterPark, Duration::from_millis(u64::from(timeout_ms)));
            }
            SpecAction::Sniff => {
                self.timers.schedule(conn, TimerSlot::Sniff, PmAction::EnterSniff(0), Duration::from_millis(u64::from(timeout_ms)));
            }
            SpecAction::Suspend => {
                self.timers.schedule(conn, TimerSlot::Suspend, PmAction::EnterSuspend, Duration::from_millis(u64::from(timeout_ms)));
            }
        }
    }

    /// Called by the owner's event loop when the timer bank delivers a
    /// fired `(connection, slot)` token.
    pub fn poll_timer(&mut self, conn: ConnHandle, slot: TimerSlot) {
        let Some(fired) = self.timers.take_fired(conn, slot) else { return };
        if !self.services.is_idle(conn) {
            // a service went active again between the timer arming and firing
            return;
        }
        match fired {
            PmAction::EnterSniff(idx) => self.execute_action_sniff(conn, idx),
            PmAction::EnterPark => self.execute_action(conn, SpecAction::Park),
            PmAction::EnterSuspend => self.execute_action(conn, SpecAction::Suspend),
        }
    }

    /// Escalates `conn` one step deeper: the next SNIFF table index, or
    /// PARK once the table is exhausted. Called by the host's own idle
    /// policy loop in addition to `recompute`'s spec-driven timers.
    pub fn escalate(&mut self, conn: ConnHandle) {
        let Some(&Peer { mode, sniff_idx, .. }) = self.peers.get(&conn) else { return };
        if !self.services.is_idle(conn) {
            return;
        }
        match mode {
            PmMode::Active => self.execute_action_sniff(conn, 0),
            PmMode::Sniff if sniff_idx + 1 < PARK_IDX => self.execute_action_sniff(conn, sniff_idx + 1),
            _ => self.execute_action(conn, SpecAction::Park),
        }
    }

    fn execute_action(&mut self, conn: ConnHandle, action: SpecAction) {
        match action {
            SpecAction::Active => self.set_wire_mode(conn, PmMode::Active, 0),
            SpecAction::Park => self.set_wire_mode(conn, PmMode::Park, 0),
            SpecAction::Sniff => self.execute_action_sniff(conn, 0),
            // SUSPEND has no wire mode of its own; realized as the deepest
            // configured SNIFF row.
            SpecAction::Suspend => self.execute_action_sniff(conn, PARK_IDX - 1),
            SpecAction::NoAction => {}
        }
    }

    fn execute_action_sniff(&mut self, conn: ConnHandle, idx: usize) {
        self.set_wire_mode(conn, PmMode::Sniff, idx);
    }

    /// Drives `conn` toward `mode` (`idx` selects the SNIFF table row when
    /// `mode == Sniff`), exiting whichever exclusive baseband mode it's
    /// currently in first.
    fn set_wire_mode(&mut self, conn: ConnHandle, mode: PmMode, idx: usize) {
        let Some(current) = self.peers.get(&conn).map(|p| p.mode) else { return };
        if current == mode && mode != PmMode::Sniff {
            return;
        }
        if current == PmMode::Park && mode != PmMode::Active {
            self.enqueue_exit_park(conn);
        } else if current == PmMode::Sniff && mode != PmMode::Active {
            self.enqueue_exit_sniff(conn);
        }
        match mode {
            PmMode::Active => {
                if current == PmMode::Sniff {
                    self.enqueue_exit_sniff(conn);
                } else if current == PmMode::Park {
                    self.enqueue_exit_park(conn);
                }
                self.set_pending(conn, SpecAction::Active);
            }
            PmMode::Sniff => {
                self.enqueue_for_mode(conn, PmMode::Sniff, idx);
                self.set_pending(conn, SpecAction::Sniff);
            }
            PmMode::Park => {
                self.enqueue_for_mode(conn, PmMode::Park, 0);
                self.set_pending(conn, SpecAction::Park);
            }
            PmMode::Hold => {}
        }
    }

    fn set_pending(&mut self, conn: ConnHandle, action: SpecAction) {
        if let Some(peer) = self.peers.get_mut(&conn) {
            peer.pending_action = Some(action);
        }
    }

    fn enqueue_exit_sniff(&mut self, conn: ConnHandle) {
        let cmd = power::exit_sniff_mode(conn);
        self.dispatcher.enqueue(cmd, Box::new(|_, _| {}));
    }

    fn enqueue_exit_park(&mut self, conn: ConnHandle) {
        let cmd = power::exit_park_state(conn);
        self.dispatcher.enqueue(cmd, Box::new(|_, _| {}));
    }

    fn enqueue_for_mode(&mut self, conn: ConnHandle, mode: PmMode, sniff_idx: usize) {
        let cmd = match mode {
            PmMode::Sniff => {
                let e = table::entry(sniff_idx, &self.config.sniff_overrides);
                power::sniff_mode(conn, SniffParams {
                    max_interval: e.max_interval,
                    min_interval: e.min_interval,
                    attempt: e.attempts,
                    timeout: e.timeout,
                })
            }
            PmMode::Park => {
                let e = table::entry(PARK_IDX, &self.config.sniff_overrides);
                power::park_state(conn, ParkParams { max_interval: e.max_interval, min_interval: e.min_interval })
            }
            PmMode::Active | PmMode::Hold => return,
        };
        let opcode = cmd.opcode;
        self.dispatcher.enqueue(
            cmd,
            Box::new(move |status, _body| {
                if !status.is_ok() {
                    warn!(?opcode, ?status, "power mode command failed");
                }
            }),
        );
    }

    /// Negotiates sniff subrating for `conn`'s current interval, doubling
    /// the host's tolerated latency and leaving the remote/local
    /// supervision timeout at the table's configured timeout. A no-op while
    /// a SCO link is up, while the connection has opted out via
    /// `set_ssr_preference`, or before the deepest reachable SNIFF level is
    /// active.
    pub fn negotiate_sniff_subrating(&mut self, conn: ConnHandle) {
        let Some(peer) = self.peers.get(&conn) else { return };
        if peer.mode != PmMode::Sniff || peer.sco_active || !peer.ssr_allowed {
            return;
        }
        self.send_subrate(conn, peer.interval.saturating_mul(2), peer.interval);
    }

    /// Forces the tightest tolerable subrate (no added latency) while an
    /// A2DP stream is actively busy, so audio throughput isn't starved by a
    /// previously negotiated deep subrate.
    fn force_tight_subrate(&mut self, conn: ConnHandle) {
        let Some(peer) = self.peers.get_mut(&conn) else { return };
        if peer.mode != PmMode::Sniff || peer.sco_active {
            return;
        }
        peer.tight_subrate_forced = true;
        let interval = peer.interval;
        self.send_subrate(conn, 0, interval);
    }

    /// Reverts a previously forced tight subrate once the A2DP stream goes
    /// idle again, restoring the normal doubled-latency negotiation.
    fn revert_tight_subrate(&mut self, conn: ConnHandle) {
        let Some(peer) = self.peers.get_mut(&conn) else { return };
        if !peer.tight_subrate_forced {
            return;
        }
        peer.tight_subrate_forced = false;
        self.negotiate_sniff_subrating(conn);
    }

    fn send_subrate(&mut self, conn: ConnHandle, max_latency: u16, timeout: u16) {
        let params = SniffSubrateParams {
            max_latency,
            min_remote_timeout: timeout,
            min_local_timeout: timeout,
        };
        let cmd = power::sniff_subrating(conn, params);
        self.dispatcher.enqueue(cmd, Box::new(|_, _| {}));
    }

    /// Feeds a raw HCI event buffer to the manager.
    pub fn handle_raw_event(&mut self, raw: &[u8]) {
        use crate::hci::buf::Unpacker;
        if raw.len() < 2 {
            return;
        }
        match raw[0] {
            0x0E => {
                let mut u = Unpacker::new(&raw[2..]);
                let _num_pkts = u.u8();
                let opcode = Opcode::from(u.u16());
                self.dispatcher.on_command_complete(opcode, u.rest());
            }
            0x0F => {
                let mut u = Unpacker::new(&raw[2..]);
                let status = Status::from(u.u8());
                let _num_pkts = u.u8();
                let opcode = Opcode::from(u.u16());
                self.dispatcher.on_command_status(opcode, status);
            }
            _ => self.handle_event_payload(raw),
        }
    }

    fn handle_event_payload(&mut self, raw: &[u8]) {
        let Ok(mut evt) = crate::hci::Event::try_from(raw) else {
            warn!("dropping malformed power-manager event");
            return;
        };
        if let Some(mc) = crate::hci::event::ModeChange::from_event(&mut evt) {
            self.apply_mode_change(mc.conn, mc.status, mc.mode, mc.interval);
        }
    }

    fn apply_mode_change(&mut self, conn: ConnHandle, status: Status, mode: PmMode, interval: u16) {
        if !status.is_ok() {
            let failed = self.peers.get(&conn).and_then(|p| p.pending_action);
            if let Some(peer) = self.peers.get_mut(&conn) {
                peer.failed_action = failed;
                peer.pending_action = None;
            }
            self.callbacks.lock().on_mode_change_failed(conn, status);
            self.recompute(conn);
            return;
        }
        let sniff_idx = if mode == PmMode::Sniff {
            table_index_for_interval(interval, &self.config.sniff_overrides)
        } else {
            0
        };
        if let Some(peer) = self.peers.get_mut(&conn) {
            peer.mode = mode;
            peer.interval = interval;
            peer.sniff_idx = sniff_idx;
            peer.pending_action = None;
        }
        self.callbacks.lock().on_mode_changed(conn, mode, interval);
    }
}

/// Best-effort reverse lookup of which table index produced `interval`,
/// used to keep `Peer::sniff_idx` in sync after a controller-initiated
/// mode change report (e.g. the peer itself requested a shallower sniff
/// interval than we last set).
fn table_index_for_interval(interval: u16, overrides: &[Option<crate::config::SniffOverride>; table::SNIFF_TABLE_LEN]) -> usize {
    (0..PARK_IDX)
        .find(|&i| table::entry(i, overrides).max_interval == interval)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc as StdArc, Mutex as StdMutex};

    #[derive(Default, Clone)]
    struct RecordingSink(StdArc<StdMutex<Vec<crate::hci::cmd::Command>>>);

    impl CommandSink for RecordingSink {
        fn send(&mut self, cmd: &crate::hci::cmd::Command) {
            self.0.lock().unwrap().push(cmd.clone());
        }
    }

    struct NoCallbacks;
    impl Callbacks for NoCallbacks {}

    fn conn(v: u16) -> ConnHandle {
        ConnHandle::new(v).unwrap()
    }

    #[test]
    fn hid_idle_arms_a_sniff_timer_not_an_immediate_command() {
        let sink = RecordingSink::default();
        let (mut pm, _rx) = PowerManager::new(sink.clone(), Arc::new(Config::default()), Box::new(NoCallbacks));
        let c = conn(1);
        pm.add_connection(c);
        pm.conn_status_change(c, ServiceId(1), AppId::Hid, ConnStatus::Idle).unwrap();
        assert!(sink.0.lock().unwrap().is_empty(), "HID idle schedules a timer, it doesn't act immediately");
        assert!(pm.timers.is_armed(c, TimerSlot::Sniff));
    }

    #[test]
    fn hfp_busy_among_hid_idle_keeps_the_link_active() {
        let sink = RecordingSink::default();
        let (mut pm, _rx) = PowerManager::new(sink.clone(), Arc::new(Config::default()), Box::new(NoCallbacks));
        let c = conn(2);
        pm.add_connection(c);
        pm.conn_status_change(c, ServiceId(1), AppId::Hid, ConnStatus::Idle).unwrap();
        pm.conn_status_change(c, ServiceId(2), AppId::Hfp, ConnStatus::Busy).unwrap();
        assert!(!pm.timers.is_armed(c, TimerSlot::Sniff), "a busy service must cancel a pending sleep timer");
    }

    #[test]
    fn a2dp_idle_arms_a_park_timer() {
        let sink = RecordingSink::default();
        let (mut pm, _rx) = PowerManager::new(sink, Arc::new(Config::default()), Box::new(NoCallbacks));
        let c = conn(3);
        pm.add_connection(c);
        pm.conn_status_change(c, ServiceId(1), AppId::A2dp, ConnStatus::Idle).unwrap();
        assert!(pm.timers.is_armed(c, TimerSlot::Park));
    }

    #[test]
    fn mode_change_failure_records_the_failed_action_and_re_arbitrates() {
        let sink = RecordingSink::default();
        let (mut pm, _rx) = PowerManager::new(sink, Arc::new(Config::default()), Box::new(NoCallbacks));
        let c = conn(4);
        pm.add_connection(c);
        pm.peers.get_mut(&c).unwrap().pending_action = Some(SpecAction::Sniff);
        pm.apply_mode_change(c, Status::from(0x03), PmMode::Active, 0);
        assert_eq!(pm.peers[&c].failed_action, Some(SpecAction::Sniff));
    }

    #[test]
    fn conn_open_clears_a_previously_failed_action() {
        let sink = RecordingSink::default();
        let (mut pm, _rx) = PowerManager::new(sink, Arc::new(Config::default()), Box::new(NoCallbacks));
        let c = conn(5);
        pm.add_connection(c);
        pm.peers.get_mut(&c).unwrap().failed_action = Some(SpecAction::Sniff);
        pm.conn_status_change(c, ServiceId(1), AppId::Hid, ConnStatus::Open).unwrap();
        assert_eq!(pm.peers[&c].failed_action, None);
    }

    #[test]
    fn sco_active_suppresses_sniff_subrating() {
        let sink = RecordingSink::default();
        let (mut pm, _rx) = PowerManager::new(sink.clone(), Arc::new(Config::default()), Box::new(NoCallbacks));
        let c = conn(6);
        pm.add_connection(c);
        pm.peers.get_mut(&c).unwrap().mode = PmMode::Sniff;
        pm.set_sco_active(c, true);
        pm.negotiate_sniff_subrating(c);
        assert!(sink.0.lock().unwrap().is_empty(), "must not renegotiate subrate during an active SCO link");
    }

    #[test]
    fn a2dp_busy_forces_a_tight_subrate_then_idle_reverts_it() {
        let sink = RecordingSink::default();
        let (mut pm, _rx) = PowerManager::new(sink.clone(), Arc::new(Config::default()), Box::new(NoCallbacks));
        let c = conn(7);
        pm.add_connection(c);
        pm.peers.get_mut(&c).unwrap().mode = PmMode::Sniff;
        pm.conn_status_change(c, ServiceId(1), AppId::A2dp, ConnStatus::Busy).unwrap();
        {
            let sent = sink.0.lock().unwrap();
            assert_eq!(sent.last().unwrap().opcode, Opcode::SniffSubrating);
        }
        pm.conn_status_change(c, ServiceId(1), AppId::A2dp, ConnStatus::Idle).unwrap();
        let sent = sink.0.lock().unwrap();
        assert_eq!(sent.iter().filter(|c| c.opcode == Opcode::SniffSubrating).count(), 2, "idle must revert the forced subrate");
    }

    #[test]
    fn mode_change_event_updates_tracked_state() {
        let sink = RecordingSink::default();
        let (mut pm, _rx) = PowerManager::new(sink, Arc::new(Config::default()), Box::new(NoCallbacks));
        let c = conn(8);
        pm.add_connection(c);
        let mut params = crate::hci::buf::Packer::new();
        params.u8(0u8).u16(8u16).u8(2u8).u16(800u16);
        let mut w = crate::hci::buf::Packer::new();
        w.u8(crate::hci::EventCode::ModeChange as u8)
            .u8(u8::try_from(params.len()).unwrap())
            .put(params.into_vec());
        pm.handle_raw_event(&w.into_vec());
        assert_eq!(pm.peers[&c].mode, PmMode::Sniff);
        assert_eq!(pm.peers[&c].interval, 800);
    }
}
