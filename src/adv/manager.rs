//! Advertising manager (C6): the state machine that drives an advertiser
//! through address negotiation, parameter/data configuration, and the
//! enable/disable and rotation sequences, over the HCI dispatcher.
//!
//! Command completions are delivered as `on_complete` closures by
//! [`Dispatcher`], which cannot borrow the manager that owns it. Simple
//! forwarding callbacks (`on_params_updated`, `on_data_set`, …) are reached
//! by capturing a cheap `Arc<SyncMutex<_>>` clone of the callback object
//! directly in the closure. Enabling/disabling a set additionally needs to
//! update the registry's `started` flag and the rotation alarm, which does
//! need `&mut self`; that one path is deferred through an outcome channel
//! drained by [`AdvertisingManager::handle_raw_event`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::warn;

use crate::adv::address::{AddressManager, AddressPolicy, EffectiveAddressType, RequestedAddressType};
use crate::adv::codec::{self, GapElement};
use crate::adv::registry::{Advertiser, AdvertiserId, Registry};
use crate::adv::{AdvertisingApi, Error, Result};
use crate::alarm::{AlarmService, Kind};
use crate::hci::cmd::le::{self, AdvEnableParams, AdvParams, PeriodicParams};
use crate::hci::consts::{AdvAddrType, AdvProp};
use crate::hci::dispatcher::{CommandSink, Dispatcher, OnComplete};
use crate::hci::{Opcode, Status};
use crate::le::{Addr, AdvHandle, RawAddr};
use crate::SyncMutex;

/// Callback surface invoked as advertising operations complete. All methods
/// have no-op defaults; implement only the ones a caller cares about.
pub trait Callbacks: Send {
    fn on_enabled(&mut self, _id: AdvertiserId, _enabled: bool, _status: Status) {}
    fn on_params_updated(&mut self, _id: AdvertiserId, _status: Status) {}
    fn on_data_set(&mut self, _id: AdvertiserId, _status: Status) {}
    fn on_own_address_read(&mut self, _id: AdvertiserId, _addr: Addr) {}
    fn on_scan_request(&mut self, _id: AdvertiserId, _scanner: RawAddr) {}
    fn on_terminated(&mut self, _id: AdvertiserId, _status: Status) {}
    fn on_periodic_params_updated(&mut self, _id: AdvertiserId, _status: Status) {}
    fn on_periodic_data_set(&mut self, _id: AdvertiserId, _status: Status) {}
    fn on_periodic_enabled(&mut self, _id: AdvertiserId, _enabled: bool, _status: Status) {}
}

/// Delivered once an enable/disable command completes, since finishing it
/// needs registry and rotation-alarm access that an `OnComplete` closure
/// captured by the dispatcher can't reach.
struct EnableOutcome {
    id: AdvertiserId,
    requested_enable: bool,
    status: Status,
}

/// Default interval between resolvable private address rotations.
const DEFAULT_RPA_ROTATION: Duration = Duration::from_secs(15 * 60);

/// Drives one or more advertising sets over a [`CommandSink`].
pub struct AdvertisingManager<S> {
    api: AdvertisingApi,
    registry: Registry,
    addr_mgr: AddressManager,
    dispatcher: Dispatcher<S>,
    rotation: AlarmService<u8>,
    rotation_rx: mpsc::UnboundedReceiver<u8>,
    suspended: Vec<AdvertiserId>,
    enable_tx: mpsc::UnboundedSender<EnableOutcome>,
    enable_rx: mpsc::UnboundedReceiver<EnableOutcome>,
    callbacks: Arc<SyncMutex<Box<dyn Callbacks>>>,
}

impl<S: CommandSink> AdvertisingManager<S> {
    pub fn new(
        api: AdvertisingApi,
        num_instances: u8,
        identity: RawAddr,
        sink: S,
        callbacks: Box<dyn Callbacks>,
    ) -> Self {
        let (rotation, rotation_rx) = AlarmService::new();
        let (enable_tx, enable_rx) = mpsc::unbounded_channel();
        Self {
            api,
            registry: Registry::new(api, num_instances),
            addr_mgr: AddressManager::new(identity),
            dispatcher: Dispatcher::new(sink),
            rotation,
            rotation_rx,
            suspended: Vec::new(),
            enable_tx,
            enable_rx,
            callbacks: Arc::new(SyncMutex::new(callbacks)),
        }
    }

    pub fn register_advertiser(&mut self) -> Result<AdvertiserId> {
        self.registry.allocate()
    }

    /// Removes `id`, cancelling any running rotation and forgetting its
    /// state. Does not itself disable the set on the controller; callers
    /// should `enable(id, false, ..)` first if it may still be advertising.
    pub fn remove_advertiser(&mut self, id: AdvertiserId) -> Result<()> {
        self.rotation.cancel(&id.get());
        self.registry.reset(id)?;
        Ok(())
    }

    pub fn get_own_address(&mut self, id: AdvertiserId) -> Result<Option<Addr>> {
        Ok(self.registry.get(id)?.current_address)
    }

    fn handle(&self, id: AdvertiserId) -> AdvHandle {
        id.handle().unwrap_or_else(|| AdvHandle::new(0).expect("0 is a valid handle"))
    }

    /// Narrows `requested` against `policy`, mints a fresh random address
    /// if one is now needed, and sends
    /// `HCI_LE_Set_Extended_Advertising_Parameters`.
    pub fn set_parameters(
        &mut self,
        id: AdvertiserId,
        requested: RequestedAddressType,
        policy: AddressPolicy,
        mut params: AdvParams,
        discoverable: bool,
    ) -> Result<()> {
        let connectable = params.props.contains(AdvProp::CONNECTABLE);
        let eff = crate::adv::address::narrow(requested, policy, connectable, true);
        params.addr_type = wire_addr_type(eff);

        let handle = self.handle(id);
        if eff.is_random() {
            let addr = self.addr_mgr.new_address(eff, self.api);
            self.registry.get_mut(id)?.current_address = Some(addr);
            let cmd = match self.api {
                AdvertisingApi::Legacy => le::le_set_random_address(addr.addr),
                _ => le::le_set_advertising_set_random_address(handle, addr.addr),
            };
            self.dispatcher.enqueue(cmd, Self::noop_complete());
        }

        let adv = self.registry.get_mut(id)?;
        adv.requested_addr_type = Some(requested);
        adv.effective_addr_type = Some(eff);
        adv.params = params;
        adv.discoverable = discoverable;

        let cmd = le::le_set_extended_advertising_parameters(handle, &adv.params);
        let callbacks = Arc::clone(&self.callbacks);
        self.dispatcher.enqueue(
            cmd,
            Box::new(move |status, _body| callbacks.lock().on_params_updated(id, status)),
        );
        Ok(())
    }

    /// Serializes, optionally seals, fragments, and sends `adv_data` /
    /// `scan_response_data` (plain plus, if non-empty, an encrypted
    /// wrapper element built from the `*_enc` variants).
    pub fn set_data(
        &mut self,
        id: AdvertiserId,
        adv_data: Vec<GapElement>,
        adv_data_enc: Vec<GapElement>,
        scan_response_data: Vec<GapElement>,
        scan_response_data_enc: Vec<GapElement>,
    ) -> Result<()> {
        let legacy = self.api == AdvertisingApi::Legacy;
        {
            let adv = self.registry.get_mut(id)?;
            adv.adv_data = adv_data;
            adv.adv_data_enc = adv_data_enc;
            adv.scan_response_data = scan_response_data;
            adv.scan_response_data_enc = scan_response_data_enc;
        }
        let adv = self.registry.get(id)?;
        let data = self.build_payload(adv, false, legacy)?;
        let scannable = adv.params.props.contains(AdvProp::SCANNABLE);
        let scan_response = scannable.then(|| self.build_payload(adv, true, legacy)).transpose()?;
        let handle = self.handle(id);

        let callbacks = Arc::clone(&self.callbacks);
        let on_last: OnComplete =
            Box::new(move |status, _body| callbacks.lock().on_data_set(id, status));
        match scan_response {
            Some(scan_response) => {
                self.send_fragmented(handle, &data, false, Self::noop_complete());
                self.send_fragmented(handle, &scan_response, true, on_last);
            }
            None => self.send_fragmented(handle, &data, false, on_last),
        }
        Ok(())
    }

    fn build_payload(&self, adv: &Advertiser, scan_response: bool, legacy: bool) -> Result<Vec<u8>> {
        let (plain, enc): (&[GapElement], &[GapElement]) = if scan_response {
            (&adv.scan_response_data, &adv.scan_response_data_enc)
        } else {
            (&adv.adv_data, &adv.adv_data_enc)
        };
        let connectable = adv.params.props.contains(AdvProp::CONNECTABLE);
        let mut elements = plain.to_vec();
        if !enc.is_empty() {
            let km = adv.enc_key_material.as_ref().ok_or(Error::MissingKeyMaterial)?;
            let plaintext = codec::serialize(enc, 0, 0, false, connectable, adv.discoverable)?;
            elements
                .push(codec::seal_encrypted(km, &plaintext).map_err(|_| Error::MissingKeyMaterial)?);
        }
        codec::serialize(
            &elements,
            adv.duration_ticks,
            adv.tx_power.get(),
            legacy,
            connectable,
            adv.discoverable,
        )
    }

    /// Builds the periodic advertising payload the same way
    /// [`build_payload`](Self::build_payload) builds the primary one, minus
    /// the `FLAGS`/`connectable` auto-insert logic: a periodic train is
    /// never itself connectable or scannable.
    fn build_periodic_payload(&self, adv: &Advertiser) -> Result<Vec<u8>> {
        let mut elements = adv.periodic_data.clone();
        if !adv.periodic_data_enc.is_empty() {
            let km = adv.enc_key_material.as_ref().ok_or(Error::MissingKeyMaterial)?;
            let plaintext = codec::serialize(&adv.periodic_data_enc, 0, 0, false, false, false)?;
            elements
                .push(codec::seal_encrypted(km, &plaintext).map_err(|_| Error::MissingKeyMaterial)?);
        }
        codec::serialize(&elements, 0, adv.tx_power.get(), false, false, false)
    }

    /// Sends every fragment of `data`, attaching `on_last` to the final
    /// fragment's completion only (earlier fragments complete silently).
    fn send_fragmented(&mut self, handle: AdvHandle, data: &[u8], scan_response: bool, on_last: OnComplete) {
        let mut fragments = codec::fragment(data);
        let last = fragments.pop();
        for (op, chunk) in fragments {
            let cmd = if scan_response {
                le::le_set_extended_scan_response_data(handle, op, false, &chunk)
            } else {
                le::le_set_extended_advertising_data(handle, op, false, &chunk)
            };
            self.dispatcher.enqueue(cmd, Self::noop_complete());
        }
        if let Some((op, chunk)) = last {
            let cmd = if scan_response {
                le::le_set_extended_scan_response_data(handle, op, false, &chunk)
            } else {
                le::le_set_extended_advertising_data(handle, op, false, &chunk)
            };
            self.dispatcher.enqueue(cmd, on_last);
        }
    }

    /// Sends `HCI_LE_Set_Periodic_Advertising_Parameters` and marks `id` as
    /// carrying a periodic advertising train.
    pub fn set_periodic_parameters(&mut self, id: AdvertiserId, params: PeriodicParams) -> Result<()> {
        let adv = self.registry.get_mut(id)?;
        adv.is_periodic = true;
        adv.periodic_params = params;
        let handle = self.handle(id);
        let cmd = le::le_set_periodic_advertising_parameters(handle, &params);
        let callbacks = Arc::clone(&self.callbacks);
        self.dispatcher.enqueue(
            cmd,
            Box::new(move |status, _body| callbacks.lock().on_periodic_params_updated(id, status)),
        );
        Ok(())
    }

    /// Serializes, optionally seals, fragments, and sends `id`'s periodic
    /// advertising data.
    pub fn set_periodic_data(
        &mut self,
        id: AdvertiserId,
        periodic_data: Vec<GapElement>,
        periodic_data_enc: Vec<GapElement>,
    ) -> Result<()> {
        {
            let adv = self.registry.get_mut(id)?;
            adv.periodic_data = periodic_data;
            adv.periodic_data_enc = periodic_data_enc;
        }
        let adv = self.registry.get(id)?;
        let data = self.build_periodic_payload(adv)?;
        let handle = self.handle(id);
        let callbacks = Arc::clone(&self.callbacks);
        let on_last: OnComplete =
            Box::new(move |status, _body| callbacks.lock().on_periodic_data_set(id, status));
        self.send_fragmented_periodic(handle, &data, on_last);
        Ok(())
    }

    fn send_fragmented_periodic(&mut self, handle: AdvHandle, data: &[u8], on_last: OnComplete) {
        let mut fragments = codec::fragment(data);
        let last = fragments.pop();
        for (op, chunk) in fragments {
            let cmd = le::le_set_periodic_advertising_data(handle, op, &chunk);
            self.dispatcher.enqueue(cmd, Self::noop_complete());
        }
        if let Some((op, chunk)) = last {
            let cmd = le::le_set_periodic_advertising_data(handle, op, &chunk);
            self.dispatcher.enqueue(cmd, on_last);
        }
    }

    /// Sends `HCI_LE_Set_Periodic_Advertising_Enable`. Part of the start
    /// flow's step 7 when `id` carries periodic data; also callable
    /// directly by a host that wants to stop the periodic train without
    /// tearing down the underlying extended advertising set.
    pub fn enable_periodic(&mut self, id: AdvertiserId, enable: bool, include_adi: bool) -> Result<()> {
        self.registry.get_mut(id)?.include_adi = include_adi;
        let handle = self.handle(id);
        let cmd = le::le_set_periodic_advertising_enable(handle, enable, include_adi);
        let callbacks = Arc::clone(&self.callbacks);
        self.dispatcher.enqueue(
            cmd,
            Box::new(move |status, _body| callbacks.lock().on_periodic_enabled(id, enable, status)),
        );
        Ok(())
    }

    /// Runs the enable (start) or disable (stop) sequence for `id`.
    pub fn enable(
        &mut self,
        id: AdvertiserId,
        enable: bool,
        duration_ticks: u32,
        max_extended_events: u8,
    ) -> Result<()> {
        {
            let adv = self.registry.get_mut(id)?;
            adv.duration_ticks = duration_ticks;
            adv.max_extended_events = max_extended_events;
        }
        self.send_enable(id, enable, duration_ticks, max_extended_events);
        Ok(())
    }

    fn send_enable(&mut self, id: AdvertiserId, enable: bool, duration_ticks: u32, max_extended_events: u8) {
        let handle = self.handle(id);
        let cfg = [AdvEnableParams {
            handle,
            duration: Duration::from_millis(u64::from(duration_ticks) * 10),
            max_events: max_extended_events,
        }];
        let cmd = le::le_set_extended_advertising_enable(enable, &cfg);
        let tx = self.enable_tx.clone();
        self.dispatcher.enqueue(
            cmd,
            Box::new(move |status, _body| {
                let _ = tx.send(EnableOutcome { id, requested_enable: enable, status });
            }),
        );
    }

    /// Suspends every currently started set without losing its enabled
    /// state, so [`resume`](Self::resume) can bring them back.
    pub fn pause(&mut self) {
        let ids: Vec<_> = self.registry.enabled_ids().collect();
        for id in ids {
            if !self.suspended.contains(&id) {
                self.suspended.push(id);
            }
            self.send_enable(id, false, 0, 0);
        }
    }

    /// Re-enables every set suspended by [`pause`](Self::pause).
    pub fn resume(&mut self) {
        for id in std::mem::take(&mut self.suspended) {
            if let Ok(adv) = self.registry.get(id) {
                let (dur, max) = (adv.duration_ticks, adv.max_extended_events);
                self.send_enable(id, true, dur, max);
            }
        }
    }

    /// Rotates the address of every enabled random-address set
    /// immediately.
    pub fn irk_changed(&mut self) {
        self.addr_mgr.irk_changed();
        for id in self.rotatable_ids() {
            self.rotate(id);
        }
    }

    fn rotatable_ids(&self) -> Vec<AdvertiserId> {
        self.registry
            .enabled_ids()
            .filter(|&id| {
                self.registry
                    .get(id)
                    .is_ok_and(|a| a.effective_addr_type.is_some_and(EffectiveAddressType::is_random))
            })
            .collect()
    }

    /// Address rotation sequence: disable, mint and set a fresh random
    /// address, and re-enable with the same duration/event-count budget.
    fn rotate(&mut self, id: AdvertiserId) {
        let Ok(adv) = self.registry.get(id) else { return };
        let Some(eff) = adv.effective_addr_type else { return };
        let (dur, max) = (adv.duration_ticks, adv.max_extended_events);
        let handle = self.handle(id);

        self.send_enable(id, false, 0, 0);
        let addr = self.addr_mgr.new_address(eff, self.api);
        if let Ok(adv) = self.registry.get_mut(id) {
            adv.current_address = Some(addr);
        }
        let cmd = match self.api {
            AdvertisingApi::Legacy => le::le_set_random_address(addr.addr),
            _ => le::le_set_advertising_set_random_address(handle, addr.addr),
        };
        self.dispatcher.enqueue(cmd, Self::noop_complete());
        self.reseal_encrypted_payloads(id, handle);
        self.send_enable(id, true, dur, max);
    }

    /// After a rotation mints a new address, any encrypted payload must be
    /// re-sealed (the randomizer changes per seal) and re-sent — advertising
    /// data, scan response, and periodic data, whichever carry `*_enc`
    /// content.
    fn reseal_encrypted_payloads(&mut self, id: AdvertiserId, handle: AdvHandle) {
        let Ok(adv) = self.registry.get(id) else { return };
        let legacy = self.api == AdvertisingApi::Legacy;
        let scannable = adv.params.props.contains(AdvProp::SCANNABLE);
        let has_main_enc = !adv.adv_data_enc.is_empty() || !adv.scan_response_data_enc.is_empty();
        let has_periodic_enc = adv.is_periodic && !adv.periodic_data_enc.is_empty();

        if has_main_enc {
            if let Ok(data) = self.build_payload_checked(id, false, legacy) {
                self.send_fragmented(handle, &data, false, Self::noop_complete());
            }
            if scannable {
                if let Ok(scan_response) = self.build_payload_checked(id, true, legacy) {
                    self.send_fragmented(handle, &scan_response, true, Self::noop_complete());
                }
            }
        }
        if has_periodic_enc {
            if let Ok(data) = self.build_periodic_payload_checked(id) {
                self.send_fragmented_periodic(handle, &data, Self::noop_complete());
            }
        }
    }

    fn build_payload_checked(&self, id: AdvertiserId, scan_response: bool, legacy: bool) -> Result<Vec<u8>> {
        let adv = self.registry.get(id)?;
        self.build_payload(adv, scan_response, legacy)
    }

    fn build_periodic_payload_checked(&self, id: AdvertiserId) -> Result<Vec<u8>> {
        let adv = self.registry.get(id)?;
        self.build_periodic_payload(adv)
    }

    /// Called by the owner's event loop whenever a rotation alarm fires.
    pub fn poll_rotations(&mut self) {
        while let Ok(raw) = self.rotation_rx.try_recv() {
            if let Some(handle) = AdvHandle::new(raw) {
                if let Ok(id) = self.id_of_handle(handle) {
                    self.rotate(id);
                }
            }
        }
    }

    fn noop_complete() -> OnComplete {
        Box::new(|_, _| {})
    }

    fn drain_enable_outcomes(&mut self) {
        while let Ok(outcome) = self.enable_rx.try_recv() {
            let Ok(adv) = self.registry.get_mut(outcome.id) else { continue };
            if outcome.status.is_ok() {
                adv.started = outcome.requested_enable;
            }
            let now_started = adv.started;
            let is_random = adv.effective_addr_type.is_some_and(EffectiveAddressType::is_random);
            if now_started && is_random {
                self.rotation.schedule(
                    outcome.id.get(),
                    DEFAULT_RPA_ROTATION,
                    Kind::Periodic(DEFAULT_RPA_ROTATION),
                );
            } else if !now_started {
                self.rotation.cancel(&outcome.id.get());
            }
            self.callbacks.lock().on_enabled(outcome.id, now_started, outcome.status);
        }
    }

    /// Feeds a raw HCI event buffer to the manager: `HCI_Command_Complete`
    /// and `HCI_Command_Status` route to the dispatcher; `LE_Advertising_
    /// Set_Terminated` and `LE_Scan_Request_Received` route to the
    /// matching callback. Also drains any enable/disable outcomes that
    /// completed as a result.
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
            _ => self.handle_non_command_event(raw),
        }
        self.drain_enable_outcomes();
    }

    fn handle_non_command_event(&mut self, raw: &[u8]) {
        let Ok(mut evt) = crate::hci::Event::try_from(raw) else {
            warn!("dropping malformed advertising-related event");
            return;
        };
        if let Some(t) = crate::hci::event::AdvertisingSetTerminated::from_event(&mut evt) {
            if let Ok(id) = self.id_of_handle(t.handle) {
                if let Ok(adv) = self.registry.get_mut(id) {
                    adv.started = false;
                }
                self.rotation.cancel(&id.get());
                self.callbacks.lock().on_terminated(id, t.status);
            }
            return;
        }
        if let Some(r) = crate::hci::event::ScanRequestReceived::from_event(&mut evt) {
            if let Ok(id) = self.id_of_handle(r.handle) {
                self.callbacks.lock().on_scan_request(id, r.scanner_addr);
            }
        }
    }

    fn id_of_handle(&self, handle: crate::le::AdvHandle) -> Result<AdvertiserId> {
        self.registry
            .ids()
            .find(|id| id.handle() == Some(handle))
            .ok_or(Error::UnknownAdvertiser)
    }
}

fn wire_addr_type(eff: EffectiveAddressType) -> AdvAddrType {
    match eff {
        EffectiveAddressType::Public => AdvAddrType::Public,
        EffectiveAddressType::Rpa | EffectiveAddressType::Nrpa => AdvAddrType::Random,
    }
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

    #[test]
    fn register_allocates_and_remove_frees() {
        let sink = RecordingSink::default();
        let mut mgr = AdvertisingManager::new(
            AdvertisingApi::Extended,
            4,
            RawAddr::new([1, 2, 3, 4, 5, 6]),
            sink,
            Box::new(NoCallbacks),
        );
        let id = mgr.register_advertiser().unwrap();
        assert_eq!(id.get(), 0);
        mgr.remove_advertiser(id).unwrap();
        let id2 = mgr.register_advertiser().unwrap();
        assert_eq!(id2.get(), 0);
    }

    #[test]
    fn set_parameters_sends_public_address_without_random_address_command() {
        let sink = RecordingSink::default();
        let mut mgr = AdvertisingManager::new(
            AdvertisingApi::Extended,
            4,
            RawAddr::new([1, 2, 3, 4, 5, 6]),
            sink.clone(),
            Box::new(NoCallbacks),
        );
        let id = mgr.register_advertiser().unwrap();
        mgr.set_parameters(
            id,
            RequestedAddressType::Public,
            AddressPolicy::PublicOrStatic,
            AdvParams::default(),
            true,
        )
        .unwrap();
        let sent = sink.0.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].opcode, Opcode::LeSetExtendedAdvertisingParameters);
    }

    #[test]
    fn set_parameters_with_rpa_sends_random_address_first() {
        let sink = RecordingSink::default();
        let mut mgr = AdvertisingManager::new(
            AdvertisingApi::Extended,
            4,
            RawAddr::new([1, 2, 3, 4, 5, 6]),
            sink.clone(),
            Box::new(NoCallbacks),
        );
        let id = mgr.register_advertiser().unwrap();
        mgr.set_parameters(
            id,
            RequestedAddressType::ResolvableRandom,
            AddressPolicy::Rpa,
            AdvParams::default(),
            true,
        )
        .unwrap();
        let sent = sink.0.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].opcode, Opcode::LeSetAdvertisingSetRandomAddress);
        assert_eq!(sent[1].opcode, Opcode::LeSetExtendedAdvertisingParameters);
    }

    #[test]
    fn enable_completion_marks_started_and_schedules_rotation() {
        let sink = RecordingSink::default();
        let mut mgr = AdvertisingManager::new(
            AdvertisingApi::Extended,
            4,
            RawAddr::new([1, 2, 3, 4, 5, 6]),
            sink,
            Box::new(NoCallbacks),
        );
        let id = mgr.register_advertiser().unwrap();
        mgr.set_parameters(
            id,
            RequestedAddressType::ResolvableRandom,
            AddressPolicy::Rpa,
            AdvParams::default(),
            true,
        )
        .unwrap();
        // Drain the two queued set_parameters commands via synthetic completions.
        mgr.dispatcher.on_command_complete(Opcode::LeSetAdvertisingSetRandomAddress, &[0x00]);
        mgr.dispatcher
            .on_command_complete(Opcode::LeSetExtendedAdvertisingParameters, &[0x00, 0x00]);
        mgr.enable(id, true, 0, 0).unwrap();
        mgr.dispatcher
            .on_command_complete(Opcode::LeSetExtendedAdvertisingEnable, &[0x00]);
        mgr.drain_enable_outcomes();
        assert!(mgr.registry.get(id).unwrap().started);
        assert!(mgr.rotation.is_scheduled(&id.get()));
    }

    #[test]
    fn non_connectable_non_discoverable_set_gets_no_flags_element() {
        let sink = RecordingSink::default();
        let mut mgr = AdvertisingManager::new(
            AdvertisingApi::Extended,
            4,
            RawAddr::new([1, 2, 3, 4, 5, 6]),
            sink,
            Box::new(NoCallbacks),
        );
        let id = mgr.register_advertiser().unwrap();
        mgr.set_parameters(
            id,
            RequestedAddressType::Public,
            AddressPolicy::PublicOrStatic,
            AdvParams::default(),
            false,
        )
        .unwrap();
        let adv = mgr.registry.get(id).unwrap().clone();
        let payload = mgr.build_payload(&adv, false, false).unwrap();
        assert!(payload.is_empty(), "a non-connectable, non-discoverable broadcaster gets no auto FLAGS");
    }

    #[test]
    fn periodic_parameters_then_data_then_enable_are_sent_in_order() {
        let sink = RecordingSink::default();
        let mut mgr = AdvertisingManager::new(
            AdvertisingApi::Extended,
            4,
            RawAddr::new([1, 2, 3, 4, 5, 6]),
            sink.clone(),
            Box::new(NoCallbacks),
        );
        let id = mgr.register_advertiser().unwrap();
        mgr.set_periodic_parameters(id, PeriodicParams::default()).unwrap();
        mgr.set_periodic_data(id, vec![GapElement::new(0xFF, vec![1, 2, 3])], Vec::new())
            .unwrap();
        mgr.enable_periodic(id, true, false).unwrap();
        let sent = sink.0.lock().unwrap();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0].opcode, Opcode::LeSetPeriodicAdvertisingParameters);
        assert_eq!(sent[1].opcode, Opcode::LeSetPeriodicAdvertisingData);
        assert_eq!(sent[2].opcode, Opcode::LeSetPeriodicAdvertisingEnable);
        assert!(mgr.registry.get(id).unwrap().is_periodic);
    }
}
