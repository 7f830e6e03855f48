#![allow(clippy::use_self)]

use std::fmt::Debug;

use bitflags::bitflags;

use OpcodeGroup::*;

/// Size of the common HCI event header: event code + parameter length, both
/// one byte. The LE meta-event's one-byte subevent code is consumed
/// separately, since it isn't part of the fixed header for non-LE events.
pub(super) const EVT_HDR: usize = 2;

/// HCI command opcodes ([Vol 4] Part E, Section 7).
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    Ord,
    PartialEq,
    PartialOrd,
    num_enum::FromPrimitive,
    num_enum::IntoPrimitive,
    strum::Display,
)]
#[non_exhaustive]
#[repr(u16)]
pub enum Opcode {
    /// Opcode 0x0000 is used to update `Num_HCI_Command_Packets`
    /// ([Vol 4] Part E, Section 7.7.14).
    #[default]
    None = 0x0000,

    // HCI Control and Baseband commands ([Vol 4] Part E, Section 7.3)
    SetEventMask = HciControl.ocf(0x0001),
    Reset = HciControl.ocf(0x0003),
    SetControllerToHostFlowControl = HciControl.ocf(0x0031),
    HostBufferSize = HciControl.ocf(0x0033),
    SetEventMaskPage2 = HciControl.ocf(0x0063),
    WriteLeHostSupport = HciControl.ocf(0x006D),

    // Informational parameters commands ([Vol 4] Part E, Section 7.4)
    ReadLocalVersionInformation = InfoParams.ocf(0x0001),
    ReadLocalSupportedCommands = InfoParams.ocf(0x0002),
    ReadBufferSize = InfoParams.ocf(0x0005),
    ReadBdAddr = InfoParams.ocf(0x0009),

    // LE Controller commands ([Vol 4] Part E, Section 7.8)
    LeSetEventMask = Le.ocf(0x0001),
    LeReadBufferSize = Le.ocf(0x0002),
    LeReadBufferSizeV2 = Le.ocf(0x0060),
    LeSetRandomAddress = Le.ocf(0x0005),
    LeSetAdvertisingParameters = Le.ocf(0x0006),
    LeSetAdvertisingData = Le.ocf(0x0008),
    LeSetScanResponseData = Le.ocf(0x0009),
    LeSetAdvertisingEnable = Le.ocf(0x000A),
    LeRand = Le.ocf(0x0018),
    LeLongTermKeyRequestReply = Le.ocf(0x001A),
    LeLongTermKeyRequestNegativeReply = Le.ocf(0x001B),
    LeSetAdvertisingSetRandomAddress = Le.ocf(0x0035),
    LeSetExtendedAdvertisingParameters = Le.ocf(0x0036),
    LeSetExtendedAdvertisingData = Le.ocf(0x0037),
    LeSetExtendedScanResponseData = Le.ocf(0x0038),
    LeSetExtendedAdvertisingEnable = Le.ocf(0x0039),
    LeReadMaximumAdvertisingDataLength = Le.ocf(0x003A),
    LeReadNumberOfSupportedAdvertisingSets = Le.ocf(0x003B),
    LeRemoveAdvertisingSet = Le.ocf(0x003C),
    LeClearAdvertisingSets = Le.ocf(0x003D),
    LeSetPeriodicAdvertisingParameters = Le.ocf(0x003E),
    LeSetPeriodicAdvertisingData = Le.ocf(0x003F),
    LeSetPeriodicAdvertisingEnable = Le.ocf(0x0040),

    // Link policy commands ([Vol 4] Part E, Section 7.2).
    SniffMode = LinkPolicy.ocf(0x0003),
    ExitSniffMode = LinkPolicy.ocf(0x0004),
    ParkState = LinkPolicy.ocf(0x0005),
    ExitParkState = LinkPolicy.ocf(0x0006),
    SniffSubrating = LinkPolicy.ocf(0x0011),

    // Vendor-specific multi-advertising command family, used in place of
    // the standard LE Extended Advertising commands on controllers that
    // predate LE Advertising Extensions but expose multiple advertising
    // instances through a single vendor opcode with a sub-opcode byte.
    LeMultiAdvt = Vendor.ocf(0x0154),
}

impl Opcode {
    /// Returns whether the opcode is `None`.
    #[inline(always)]
    #[must_use]
    pub const fn is_none(self) -> bool {
        matches!(self, Self::None)
    }

    /// Returns whether the opcode is other than `None`.
    #[inline(always)]
    #[must_use]
    pub const fn is_some(self) -> bool {
        !self.is_none()
    }
}

// Opcode group field definitions.
#[derive(Clone, Copy)]
#[repr(u16)]
enum OpcodeGroup {
    _LinkControl = 0x01,
    LinkPolicy = 0x02,
    HciControl = 0x03,
    InfoParams = 0x04,
    _StatusParams = 0x05,
    _Testing = 0x06,
    Le = 0x08,
    Vendor = 0x3F, // [Vol 4] Part E, Section 5.4.1
}

impl OpcodeGroup {
    /// Combines OGF with OCF to create a full opcode.
    #[inline]
    const fn ocf(self, ocf: u16) -> u16 {
        (self as u16) << 10 | ocf
    }
}

/// HCI event codes this crate decodes ([Vol 4] Part E, Section 7.7). A
/// deliberately small subset of the full catalog: only the classic events
/// the Power Manager consumes, plus the two command-completion events every
/// command path routes through.
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::TryFromPrimitive, strum::Display)]
#[non_exhaustive]
#[repr(u8)]
pub enum EventCode {
    CommandComplete = 0x0E,
    CommandStatus = 0x0F,
    HardwareError = 0x10,
    ModeChange = 0x14,
    SniffSubrating = 0x2E,
    LeMetaEvent = 0x3E,
    Vendor = 0xFF, // [Vol 4] Part E, Section 5.4.4; also carries BLE_STCHANGE
}

impl EventCode {
    /// Returns whether the event code is either `CommandComplete` or
    /// `CommandStatus`.
    #[inline(always)]
    #[must_use]
    pub const fn is_cmd(self) -> bool {
        matches!(self, Self::CommandComplete | Self::CommandStatus)
    }

    /// Returns the format of the associated event parameters.
    #[must_use]
    pub(super) const fn param_fmt(self) -> EventFmt {
        match self {
            Self::CommandComplete | Self::CommandStatus => EventFmt::STATUS,
            Self::HardwareError | Self::LeMetaEvent | Self::Vendor => EventFmt::empty(),
            Self::ModeChange | Self::SniffSubrating => {
                EventFmt::STATUS.union(EventFmt::CONN_HANDLE)
            }
        }
    }

    /// Sets or clears the associated event mask bit
    /// ([Vol 4] Part E, Section 7.3.1).
    pub(super) fn set(self, m: &mut super::EventMask, enable: bool) {
        let (pg, bit): (&mut u64, u8) = match self {
            Self::HardwareError => (&mut m.p1, 15),
            Self::ModeChange => (&mut m.p1, 19),
            Self::SniffSubrating => (&mut m.p1, 45),
            Self::LeMetaEvent => (&mut m.p1, 61),
            // Unmaskable events.
            Self::CommandComplete | Self::CommandStatus | Self::Vendor => return,
        };
        *pg = *pg & !(1 << bit) | u64::from(enable) << bit;
    }
}

bitflags! {
    /// Event parameter format.
    #[repr(transparent)]
    #[must_use]
    pub(super) struct EventFmt: u8 {
        /// Event contains a status parameter.
        const STATUS = 1 << 0;
        /// Event contains a connection handle.
        const CONN_HANDLE = 1 << 1;
        /// Event contains an advertising handle.
        const ADV_HANDLE = 1 << 3;
        /// Handle type mask.
        const HANDLE = Self::CONN_HANDLE.bits | Self::ADV_HANDLE.bits;
    }
}

/// HCI status codes ([Vol 1] Part F, Section 1.3).
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, num_enum::FromPrimitive, strum::Display, thiserror::Error,
)]
#[non_exhaustive]
#[repr(u8)]
pub enum Status {
    Success = 0x00,
    UnknownCommand = 0x01,
    UnknownConnectionIdentifier = 0x02,
    HardwareFailure = 0x03,
    PageTimeout = 0x04,
    AuthenticationFailure = 0x05,
    PinOrKeyMissing = 0x06,
    MemoryCapacityExceeded = 0x07,
    ConnectionTimeout = 0x08,
    ConnectionLimitExceeded = 0x09,
    SynchronousConnectionLimitToADeviceExceeded = 0x0A,
    ConnectionAlreadyExists = 0x0B,
    CommandDisallowed = 0x0C,
    ConnectionRejectedDueToLimitedResources = 0x0D,
    ConnectionRejectedDueToSecurityReasons = 0x0E,
    ConnectionRejectedDueToUnacceptableBdAddr = 0x0F,
    ConnectionAcceptTimeoutExceeded = 0x10,
    UnsupportedFeatureOrParameterValue = 0x11,
    InvalidCommandParameters = 0x12,
    RemoteUserTerminatedConnection = 0x13,
    RemoteDeviceTerminatedConnectionDueToLowResources = 0x14,
    RemoteDeviceTerminatedConnectionDueToPowerOff = 0x15,
    ConnectionTerminatedByLocalHost = 0x16,
    RepeatedAttempts = 0x17,
    PairingNotAllowed = 0x18,
    UnknownLmpPdu = 0x19,
    UnsupportedRemoteFeature = 0x1A,
    ScoOffsetRejected = 0x1B,
    ScoIntervalRejected = 0x1C,
    ScoAirModeRejected = 0x1D,
    InvalidLmpLlParameters = 0x1E,
    #[num_enum(default)] // [Vol 4] Part E, Section 1.2
    UnspecifiedError = 0x1F,
    UnsupportedLmpLlParameterValue = 0x20,
    RoleChangeNotAllowed = 0x21,
    LmpLlResponseTimeout = 0x22,
    LmpLlErrorTransactionCollision = 0x23,
    LmpPduNotAllowed = 0x24,
    EncryptionModeNotAcceptable = 0x25,
    LinkKeyCannotBeChanged = 0x26,
    RequestedQosNotSupported = 0x27,
    InstantPassed = 0x28,
    PairingWithUnitKeyNotSupported = 0x29,
    DifferentTransactionCollision = 0x2A,
    QosUnacceptableParameter = 0x2C,
    QosRejected = 0x2D,
    ChannelClassificationNotSupported = 0x2E,
    InsufficientSecurity = 0x2F,
    ParameterOutOfMandatoryRange = 0x30,
    RoleSwitchPending = 0x32,
    ReservedSlotViolation = 0x34,
    RoleSwitchFailed = 0x35,
    ExtendedInquiryResponseTooLarge = 0x36,
    SecureSimplePairingNotSupportedByHost = 0x37,
    HostBusyPairing = 0x38,
    ConnectionRejectedDueToNoSuitableChannelFound = 0x39,
    ControllerBusy = 0x3A,
    UnacceptableConnectionParameters = 0x3B,
    AdvertisingTimeout = 0x3C,
    ConnectionTerminatedDueToMicFailure = 0x3D,
    ConnectionFailedToBeEstablished = 0x3E,
    CoarseClockAdjustmentRejected = 0x40,
    Type0SubmapNotDefined = 0x41,
    UnknownAdvertisingIdentifier = 0x42,
    LimitReached = 0x43,
    OperationCancelledByHost = 0x44,
    PacketTooLong = 0x45,
}

impl Status {
    /// Returns whether status is `Success`.
    #[inline(always)]
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Status::Success)
    }
}

bitflags! {
    /// Basic properties of an advertising event
    /// ([Vol 4] Part E, Section 7.8.53).
    #[derive(Default)]
    #[repr(transparent)]
    pub struct AdvProp: u16 {
        const CONNECTABLE = 1 << 0;
        const SCANNABLE = 1 << 1;
        const DIRECTED = 1 << 2;
        const HIGH_DUTY_CYCLE = 1 << 3;
        const LEGACY = 1 << 4;
        const ANONYMOUS = 1 << 5;
        const INCLUDE_TX_POWER = 1 << 6;
    }
}

bitflags! {
    /// Channels used for transmitting advertising packets
    /// ([Vol 4] Part E, Section 7.8.53).
    #[repr(transparent)]
    pub struct AdvChanMap: u8 {
        const CH37 = 1 << 0;
        const CH38 = 1 << 1;
        const CH39 = 1 << 2;
    }
}

impl Default for AdvChanMap {
    #[inline]
    fn default() -> Self {
        Self::all()
    }
}

/// Type of address being used in an advertising packet
/// ([Vol 4] Part E, Section 7.8.53).
#[allow(clippy::exhaustive_enums)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, num_enum::IntoPrimitive)]
#[repr(u8)]
pub enum AdvAddrType {
    /// Public Device Address.
    #[default]
    Public = 0x00,
    /// Random Device Address
    Random = 0x01,
    /// Controller generates the Resolvable Private Address based on the local
    /// IRK from the resolving list. If the resolving list contains no matching
    /// entry, use the public address.
    PrivateOrPublic = 0x02,
    /// Controller generates the Resolvable Private Address based on the local
    /// IRK from the resolving list. If the resolving list contains no matching
    /// entry, use the random address from
    /// `le_set_advertising_set_random_address`.
    PrivateOrRandom = 0x03,
}

/// Type of filtering to perform for scan and connection requests
/// ([Vol 4] Part E, Section 7.8.53).
#[allow(clippy::exhaustive_enums)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, num_enum::IntoPrimitive)]
#[repr(u8)]
pub enum AdvFilterPolicy {
    /// Process scan and connection requests from all devices (i.e., the Filter
    /// Accept List is not in use).
    #[default]
    None = 0x00,
    /// Process connection requests from all devices and scan requests only from
    /// devices that are in the Filter Accept List.
    FilterScan = 0x01,
    /// Process scan requests from all devices and connection requests only from
    /// devices that are in the Filter Accept List.
    FilterConnect = 0x02,
    /// Process scan and connection requests only from devices in the Filter
    /// Accept List.
    FilterAll = 0x03,
}

/// Physical layer for advertising. LE Coded assumes S=8
/// ([Vol 4] Part E, Section 7.8.53).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, num_enum::IntoPrimitive)]
#[non_exhaustive]
#[repr(u8)]
pub enum AdvPhy {
    #[default]
    Le1M = 0x01,
    Le2M = 0x02,
    LeCoded = 0x03,
}

/// Defines the interpretation of advertising data
/// ([Vol 4] Part E, Section 7.8.54).
#[allow(clippy::exhaustive_enums)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::IntoPrimitive)]
#[repr(u8)]
pub enum AdvDataOp {
    /// Intermediate fragment of fragmented extended advertising data.
    Cont = 0x00,
    /// First fragment of fragmented extended advertising data.
    First = 0x01,
    /// Last fragment of fragmented extended advertising data.
    Last = 0x02,
    /// Complete extended advertising data.
    Complete = 0x03,
    /// Unchanged data (just update the Advertising DID).
    Unchanged = 0x04,
}

/// LE subevent codes this crate decodes ([Vol 4] Part E, Section 7.7.65).
/// A deliberately small subset of the full LE meta-event catalog — only the
/// subevents the advertising manager consumes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::TryFromPrimitive, strum::Display)]
#[non_exhaustive]
#[repr(u8)]
pub enum SubeventCode {
    ConnectionComplete = 0x01,
    EnhancedConnectionComplete = 0x0A,
    ScanTimeout = 0x11,
    AdvertisingSetTerminated = 0x12,
    ScanRequestReceived = 0x13,
}

impl SubeventCode {
    /// Returns the format of the associated event parameters.
    pub(super) const fn param_fmt(self) -> EventFmt {
        match self {
            Self::ConnectionComplete | Self::EnhancedConnectionComplete => {
                EventFmt::STATUS.union(EventFmt::CONN_HANDLE)
            }
            Self::ScanTimeout => EventFmt::empty(),
            Self::AdvertisingSetTerminated => EventFmt::STATUS.union(EventFmt::ADV_HANDLE),
            Self::ScanRequestReceived => EventFmt::ADV_HANDLE,
        }
    }

    /// Returns the LE event mask bit for this subevent
    /// ([Vol 4] Part E, Section 7.8.1).
    #[must_use]
    pub const fn mask(self) -> u64 {
        let bit = match self {
            Self::ConnectionComplete => 0,
            Self::EnhancedConnectionComplete => 9,
            Self::ScanTimeout => 16,
            Self::AdvertisingSetTerminated => 17,
            Self::ScanRequestReceived => 18,
        };
        1 << bit
    }
}

/// Sub-opcode byte of the vendor-specific `LE_Multi_Advt` command family,
/// placed first in the command parameters to select the operation.
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::IntoPrimitive, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum MultiAdvtSubcmd {
    SetParam = 0x00,
    SetData = 0x01,
    SetScanResp = 0x02,
    SetRandomAddr = 0x03,
    SetEnable = 0x04,
}

/// Reason carried by the vendor `BLE_STCHANGE` event, the pre-extended-
/// advertising analog of `HCI_LE_Advertising_Set_Terminated`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum StChangeReason {
    AdvertisingTimeout = 0x00,
    ConnectionReceived = 0x01,
}

/// Classic power modes, ordered so that a larger discriminant is a
/// strictly deeper low-power state — the ordering the Power Manager's
/// strictness comparisons rely on ([Vol 2] Part C, Section 4).
#[derive(
    Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd, num_enum::IntoPrimitive, num_enum::TryFromPrimitive,
)]
#[repr(u8)]
pub enum PmMode {
    Active = 0,
    Hold = 1,
    Sniff = 2,
    Park = 3,
}
