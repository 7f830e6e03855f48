//! LE Advertising Manager: advertising set lifecycle (registry, codec,
//! address policy) and the manager state machine that drives them over HCI.

pub mod address;
pub mod codec;
pub mod manager;
pub mod registry;

pub use address::{AddressManager, AddressPolicy, EffectiveAddressType, RequestedAddressType};
pub use codec::GapElement;
pub use manager::AdvertisingManager;
pub use registry::{Advertiser, AdvertiserId, Registry};

/// Which HCI command family this host uses to drive advertising, selected
/// once at module start based on controller capability.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AdvertisingApi {
    /// Pre-5.0 legacy advertising commands: one implicit set, `0..1`.
    Legacy,
    /// Vendor `LE_Multi_Advt` family: `1..=num_instances`, 1-based.
    AndroidVendor,
    /// LE Advertising Extensions: `0..num_instances`.
    Extended,
}

impl AdvertisingApi {
    /// First valid [`AdvertiserId`] for this API variant.
    #[must_use]
    pub const fn first_id(self) -> u8 {
        match self {
            Self::AndroidVendor => 1,
            Self::Legacy | Self::Extended => 0,
        }
    }
}

/// Errors surfaced to advertising manager callers.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    /// C5 allocation failed: every id in range is in use.
    #[error("too many advertisers")]
    TooManyAdvertisers,
    /// Serialized payload exceeds the controller or legacy-PDU limit.
    #[error("advertising data too large")]
    DataTooLarge,
    /// A single GAP element's value exceeds 253 bytes.
    #[error("advertising data element too large")]
    ElementTooLarge,
    /// The id does not name a currently allocated advertiser.
    #[error("unknown advertiser id")]
    UnknownAdvertiser,
    /// Encrypted data is configured but no key material is available.
    #[error("missing encryption key material")]
    MissingKeyMaterial,
    /// The controller rejected a step of the operation.
    #[error("controller rejected command: {0}")]
    Controller(#[from] crate::hci::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
