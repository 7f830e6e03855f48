//! Address policy module (C2): narrows a set's requested address type
//! against the host's configured policy, and mints the actual random
//! address bytes when one is needed.

use rand::RngCore;

use crate::adv::AdvertisingApi;
use crate::le::{Addr, RawAddr};

/// Host-wide address policy, analogous to a `bluetooth.core.le.address_policy`
/// system setting.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AddressPolicy {
    /// Always use the identity (public or static) address.
    PublicOrStatic,
    /// Prefer resolvable private addresses.
    Rpa,
    /// Prefer non-resolvable private addresses.
    Nrpa,
}

/// An advertiser's requested address type, before policy narrowing.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RequestedAddressType {
    Public,
    ResolvableRandom,
    NonResolvableRandom,
}

/// An advertiser's address type after policy narrowing — what actually gets
/// set on the controller.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EffectiveAddressType {
    Public,
    Rpa,
    Nrpa,
}

impl EffectiveAddressType {
    /// Whether this address type requires periodic host-driven rotation.
    #[must_use]
    pub const fn is_random(self) -> bool {
        !matches!(self, Self::Public)
    }
}

/// Narrows `requested` against `policy` per the precedence table: the
/// result is never less private than `policy` demands, and never more
/// private than `requested` asked for.
///
/// | Req \\ Policy   | Public/Static | Rpa  | Nrpa |
/// |-----------------|---------------|------|------|
/// | Public          | Public        | Public | Public |
/// | ResolvableRandom | Public       | Rpa  | Nrpa |
/// | NonResolvableRandom | Public    | Nrpa | Nrpa |
///
/// When `connectable` is `false`, `Public/Static` additionally downgrades a
/// `ResolvableRandom` request to `Nrpa` rather than `Public`, so
/// non-connectable traffic never reveals the identity address (the
/// `nrpa_non_connectable_adv` host option).
#[must_use]
pub fn narrow(
    requested: RequestedAddressType,
    policy: AddressPolicy,
    connectable: bool,
    nrpa_non_connectable_adv: bool,
) -> EffectiveAddressType {
    use AddressPolicy::{Nrpa, PublicOrStatic, Rpa};
    use RequestedAddressType::{NonResolvableRandom, Public, ResolvableRandom};
    match (requested, policy) {
        (Public, _) => EffectiveAddressType::Public,
        (_, PublicOrStatic) if !connectable && nrpa_non_connectable_adv => {
            EffectiveAddressType::Nrpa
        }
        (_, PublicOrStatic) => EffectiveAddressType::Public,
        (ResolvableRandom, Rpa) => EffectiveAddressType::Rpa,
        (ResolvableRandom | NonResolvableRandom, Nrpa) => EffectiveAddressType::Nrpa,
        (NonResolvableRandom, Rpa) => EffectiveAddressType::Nrpa,
    }
}

/// Mints random addresses and tracks the one shared legacy-API address.
/// Extended/vendor sets each carry their own per-set address; under
/// [`AdvertisingApi::Legacy`], the command set has no per-set random-address
/// slot, so every RPA set shares a single host-wide value.
#[derive(Debug, Default)]
pub struct AddressManager {
    identity: RawAddr,
    legacy_shared_rpa: Option<RawAddr>,
}

impl AddressManager {
    #[must_use]
    pub fn new(identity: RawAddr) -> Self {
        Self {
            identity,
            legacy_shared_rpa: None,
        }
    }

    /// Returns the host's public/static identity address.
    #[must_use]
    pub const fn identity(&self) -> RawAddr {
        self.identity
    }

    /// Mints the address to use for `eff`, respecting the legacy
    /// shared-RPA rule. Called once at set start and again on every
    /// rotation.
    pub fn new_address(&mut self, eff: EffectiveAddressType, api: AdvertisingApi) -> Addr {
        match eff {
            EffectiveAddressType::Public => Addr::public(self.identity),
            EffectiveAddressType::Rpa if api == AdvertisingApi::Legacy => {
                let a = *self.legacy_shared_rpa.get_or_insert_with(random_resolvable);
                Addr::random(a)
            }
            EffectiveAddressType::Rpa => Addr::random(random_resolvable()),
            EffectiveAddressType::Nrpa => Addr::random(random_non_resolvable()),
        }
    }

    /// `irk_changed()`: invalidates the shared legacy RPA so the next
    /// `new_address` call for a legacy set mints a fresh one. Per-set
    /// extended/vendor addresses are rotated by the manager calling
    /// `new_address` directly for each enabled set.
    pub fn irk_changed(&mut self) {
        self.legacy_shared_rpa = None;
    }
}

/// Generates a resolvable private address: top two bits `01`, remaining 46
/// bits random. Real resolution against a peer's IRK is a controller-side
/// concern (the resolving list); this host only mints the bit pattern.
#[must_use]
pub fn random_resolvable() -> RawAddr {
    random_with_top_bits(0b01)
}

/// Generates a non-resolvable private address: top two bits `00`, remaining
/// 46 bits random.
#[must_use]
pub fn random_non_resolvable() -> RawAddr {
    random_with_top_bits(0b00)
}

fn random_with_top_bits(top: u8) -> RawAddr {
    let mut b = [0u8; 6];
    rand::thread_rng().fill_bytes(&mut b);
    b[0] = (b[0] & 0x3F) | (top << 6);
    RawAddr::new(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::le::RandomSubtype;

    #[test]
    fn public_request_always_wins() {
        for policy in [AddressPolicy::PublicOrStatic, AddressPolicy::Rpa, AddressPolicy::Nrpa] {
            assert_eq!(
                narrow(RequestedAddressType::Public, policy, true, false),
                EffectiveAddressType::Public
            );
        }
    }

    #[test]
    fn rpa_request_narrows_per_table() {
        assert_eq!(
            narrow(RequestedAddressType::ResolvableRandom, AddressPolicy::PublicOrStatic, true, false),
            EffectiveAddressType::Public
        );
        assert_eq!(
            narrow(RequestedAddressType::ResolvableRandom, AddressPolicy::Rpa, true, false),
            EffectiveAddressType::Rpa
        );
        assert_eq!(
            narrow(RequestedAddressType::ResolvableRandom, AddressPolicy::Nrpa, true, false),
            EffectiveAddressType::Nrpa
        );
    }

    #[test]
    fn nrpa_non_connectable_adv_downgrades_public_policy() {
        assert_eq!(
            narrow(
                RequestedAddressType::ResolvableRandom,
                AddressPolicy::PublicOrStatic,
                false,
                true
            ),
            EffectiveAddressType::Nrpa
        );
        // Without the flag, non-connectable still falls back to Public.
        assert_eq!(
            narrow(
                RequestedAddressType::ResolvableRandom,
                AddressPolicy::PublicOrStatic,
                false,
                false
            ),
            EffectiveAddressType::Public
        );
    }

    #[test]
    fn minted_rpa_has_resolvable_subtype_bits() {
        let addr = random_resolvable();
        assert_eq!(addr.random_subtype(), RandomSubtype::Resolvable);
        let addr = random_non_resolvable();
        assert_eq!(addr.random_subtype(), RandomSubtype::NonResolvable);
    }

    #[test]
    fn legacy_sets_share_one_rpa() {
        let mut mgr = AddressManager::new(RawAddr::new([1, 2, 3, 4, 5, 6]));
        let a = mgr.new_address(EffectiveAddressType::Rpa, AdvertisingApi::Legacy);
        let b = mgr.new_address(EffectiveAddressType::Rpa, AdvertisingApi::Legacy);
        assert_eq!(a, b);
        mgr.irk_changed();
        let c = mgr.new_address(EffectiveAddressType::Rpa, AdvertisingApi::Legacy);
        assert_ne!(a, c, "irk change must mint a fresh shared address");
    }
}
