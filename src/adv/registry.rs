//! Advertiser registry (C5): allocates and tracks the per-set records the
//! advertising manager drives, independent of the HCI command family in use.

use std::collections::BTreeMap;

use btcore_crypto::KeyMaterial;

use crate::adv::address::EffectiveAddressType;
use crate::adv::codec::GapElement;
use crate::adv::{AdvertisingApi, Error, Result};
use crate::hci::cmd::le::AdvParams;
use crate::le::{Addr, AdvHandle, TxPower};

/// Opaque advertiser identity, stable for the lifetime of a registration.
/// Under [`AdvertisingApi::Legacy`] there is exactly one, id `0`.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct AdvertiserId(u8);

impl AdvertiserId {
    #[inline]
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// The wire advertising handle for this id. Under
    /// [`AdvertisingApi::Legacy`] the only valid id is `0`, which also
    /// happens to be the handle this crate sends on its behalf when
    /// encoding Legacy sets with the Extended command family.
    #[must_use]
    pub const fn handle(self) -> Option<AdvHandle> {
        AdvHandle::new(self.0)
    }
}

/// A registered advertising set's full state, per the data model: whether
/// it has been started, its negotiated address, payloads (plain and, when
/// encrypted advertising is configured, sealed), and the caller identity
/// that owns it.
#[derive(Clone, Debug, Default)]
pub struct Advertiser {
    pub in_use: bool,
    pub started: bool,
    pub requested_addr_type: Option<crate::adv::address::RequestedAddressType>,
    pub effective_addr_type: Option<EffectiveAddressType>,
    pub current_address: Option<Addr>,
    pub params: AdvParams,
    /// Whether the set should advertise as discoverable; drives the
    /// codec's auto-inserted `FLAGS` element alongside `params.props`'s
    /// `CONNECTABLE` bit. Not itself part of the HCI parameter wire
    /// format, which has no discoverable bit of its own.
    pub discoverable: bool,
    pub tx_power: TxPower,
    pub calibrated_tx_power: TxPower,
    pub duration_ticks: u32,
    pub max_extended_events: u8,
    pub adv_data: Vec<GapElement>,
    pub scan_response_data: Vec<GapElement>,
    pub adv_data_enc: Vec<GapElement>,
    pub scan_response_data_enc: Vec<GapElement>,
    pub enc_key_material: Option<KeyMaterial>,
    /// Whether this set also carries a periodic advertising train.
    pub is_periodic: bool,
    pub periodic_params: crate::hci::cmd::le::PeriodicParams,
    pub periodic_data: Vec<GapElement>,
    pub periodic_data_enc: Vec<GapElement>,
    /// Whether `ADI` (advertising data info) should be included in the
    /// periodic enable command, when the controller supports it.
    pub include_adi: bool,
    /// Client-visible registration and caller identifiers, opaque to this
    /// crate; carried through so callback dispatch can route back to the
    /// right caller.
    pub reg_id: i32,
    pub client_id: u8,
}

impl Advertiser {
    /// Whether this set's advertising data is configured to use the
    /// encrypted advertising feature (any `*_enc` field is non-empty).
    #[must_use]
    pub fn wants_encryption(&self) -> bool {
        !self.adv_data_enc.is_empty() || !self.scan_response_data_enc.is_empty()
    }
}

/// Allocates and releases [`AdvertiserId`]s and owns the [`Advertiser`]
/// records they name.
#[derive(Debug)]
pub struct Registry {
    api: AdvertisingApi,
    num_instances: u8,
    sets: BTreeMap<u8, Advertiser>,
}

impl Registry {
    #[must_use]
    pub fn new(api: AdvertisingApi, num_instances: u8) -> Self {
        Self {
            api,
            num_instances,
            sets: BTreeMap::new(),
        }
    }

    /// Allocates the smallest unused id in `[api.first_id(), first_id +
    /// num_instances)`. Errors with [`Error::TooManyAdvertisers`] if every
    /// id in range is in use.
    pub fn allocate(&mut self) -> Result<AdvertiserId> {
        let first = self.api.first_id();
        for raw in first..first.saturating_add(self.num_instances) {
            if !self.sets.contains_key(&raw) {
                self.sets.insert(raw, Advertiser {
                    in_use: true,
                    ..Advertiser::default()
                });
                return Ok(AdvertiserId(raw));
            }
        }
        Err(Error::TooManyAdvertisers)
    }

    /// Destroys `id`'s record. The caller is responsible for cancelling any
    /// running rotation alarm and unregistering from the address manager
    /// before (or after) calling this — `Registry` only owns advertiser
    /// state, not the alarm service.
    pub fn reset(&mut self, id: AdvertiserId) -> Result<Advertiser> {
        self.sets.remove(&id.0).ok_or(Error::UnknownAdvertiser)
    }

    pub fn get(&self, id: AdvertiserId) -> Result<&Advertiser> {
        self.sets.get(&id.0).ok_or(Error::UnknownAdvertiser)
    }

    pub fn get_mut(&mut self, id: AdvertiserId) -> Result<&mut Advertiser> {
        self.sets.get_mut(&id.0).ok_or(Error::UnknownAdvertiser)
    }

    /// Iterates every currently allocated id, in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = AdvertiserId> + '_ {
        self.sets.keys().copied().map(AdvertiserId)
    }

    /// Iterates the ids of sets that are both allocated and started.
    pub fn enabled_ids(&self) -> impl Iterator<Item = AdvertiserId> + '_ {
        self.sets
            .iter()
            .filter(|(_, a)| a.started)
            .map(|(&raw, _)| AdvertiserId(raw))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_picks_smallest_free_id() {
        let mut reg = Registry::new(AdvertisingApi::Extended, 3);
        let a = reg.allocate().unwrap();
        let b = reg.allocate().unwrap();
        assert_eq!(a.get(), 0);
        assert_eq!(b.get(), 1);
        reg.reset(a).unwrap();
        let c = reg.allocate().unwrap();
        assert_eq!(c.get(), 0, "freed id must be reused before a new one");
        let _ = b;
        let _ = c;
    }

    #[test]
    fn android_vendor_ids_start_at_one() {
        let mut reg = Registry::new(AdvertisingApi::AndroidVendor, 4);
        let a = reg.allocate().unwrap();
        assert_eq!(a.get(), 1);
    }

    #[test]
    fn allocate_fails_once_range_is_exhausted() {
        let mut reg = Registry::new(AdvertisingApi::Extended, 1);
        reg.allocate().unwrap();
        assert_eq!(reg.allocate(), Err(Error::TooManyAdvertisers));
    }

    #[test]
    fn reset_of_unknown_id_is_an_error() {
        let mut reg = Registry::new(AdvertisingApi::Extended, 1);
        assert_eq!(reg.reset(AdvertiserId(5)), Err(Error::UnknownAdvertiser));
    }
}
