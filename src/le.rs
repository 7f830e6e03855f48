//! LE address and handle types shared by the HCI, advertising, and power
//! management layers.

use std::fmt;

/// Raw 48-bit Bluetooth device address in big-endian (human-readable) byte
/// order, independent of whether it is public or random.
#[derive(Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct RawAddr([u8; 6]);

impl RawAddr {
    /// Wraps six address bytes, most-significant byte first.
    #[inline]
    #[must_use]
    pub const fn new(v: [u8; 6]) -> Self {
        Self(v)
    }

    /// Returns the address bytes.
    #[inline]
    #[must_use]
    pub const fn bytes(&self) -> [u8; 6] {
        self.0
    }

    /// Returns whether the two top bits of the address mark it resolvable
    /// private (`0b01`), non-resolvable private (`0b00`), or static
    /// (`0b11`). Only meaningful when the address type is `Random`.
    #[must_use]
    pub const fn random_subtype(&self) -> RandomSubtype {
        match self.0[0] >> 6 {
            0b00 => RandomSubtype::NonResolvable,
            0b01 => RandomSubtype::Resolvable,
            _ => RandomSubtype::Static,
        }
    }
}

impl fmt::Debug for RawAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl fmt::Display for RawAddr {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Which of the three random address subtypes a [`RawAddr`] with
/// `AddrType::Random` holds.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RandomSubtype {
    Resolvable,
    NonResolvable,
    Static,
}

/// `Own_Address_Type`/`Peer_Address_Type` tag, as carried on the wire.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum AddrType {
    #[default]
    Public,
    Random,
}

/// An address together with its type tag.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct Addr {
    pub addr: RawAddr,
    pub addr_type: AddrType,
}

impl Addr {
    #[inline]
    #[must_use]
    pub const fn public(addr: RawAddr) -> Self {
        Self {
            addr,
            addr_type: AddrType::Public,
        }
    }

    #[inline]
    #[must_use]
    pub const fn random(addr: RawAddr) -> Self {
        Self {
            addr,
            addr_type: AddrType::Random,
        }
    }
}

/// Advertising set handle (`Advertising_Handle`), `0..=0xEF`.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct AdvHandle(u8);

impl AdvHandle {
    pub const MAX: u8 = 0xEF;

    /// Returns `None` if `v` is outside the valid advertising handle range.
    #[inline]
    #[must_use]
    pub const fn new(v: u8) -> Option<Self> {
        if v <= Self::MAX {
            Some(Self(v))
        } else {
            None
        }
    }

    #[inline]
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl From<AdvHandle> for u8 {
    #[inline]
    fn from(h: AdvHandle) -> Self {
        h.0
    }
}

impl fmt::Display for AdvHandle {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Advertising tx power in dBm, clipped to `[-127, 20]`; `0x7F` on the wire
/// means "host has no preference".
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[repr(transparent)]
pub struct TxPower(i8);

impl TxPower {
    /// Wire value meaning "no preference".
    pub const NONE: i8 = 0x7F;

    #[inline]
    #[must_use]
    pub const fn dbm(v: i8) -> Self {
        Self(if v < -127 { -127 } else { v })
    }

    #[inline]
    #[must_use]
    pub const fn get(self) -> i8 {
        self.0
    }
}

impl From<TxPower> for i8 {
    #[inline]
    fn from(t: TxPower) -> Self {
        t.0
    }
}

/// Connection handle (`Connection_Handle`), a 12-bit value on the wire.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[repr(transparent)]
pub struct ConnHandle(u16);

impl ConnHandle {
    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Option<Self> {
        if v >> 12 == 0 {
            Some(Self(v))
        } else {
            None
        }
    }

    #[inline]
    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }
}

impl From<ConnHandle> for u16 {
    #[inline]
    fn from(h: ConnHandle) -> Self {
        h.0
    }
}
