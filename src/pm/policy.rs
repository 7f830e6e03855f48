//! PM spec table: per-profile allow-mask and state→action policy that
//! [`PowerManager::conn_status_change`](crate::pm::manager::PowerManager::conn_status_change)
//! arbitrates over when several services share a connection. Keyed by
//! [`AppId`], the identity of the profile that registered a given
//! [`crate::pm::services::ServiceId`].

use bitflags::bitflags;

use crate::hci::consts::PmMode;

/// Identifies which profile a [`crate::pm::services::ServiceId`] belongs
/// to, for PM-spec lookup purposes only — this crate does not otherwise
/// know or care what a profile does.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum AppId {
    Hfp,
    A2dp,
    Hid,
    Other(u8),
}

/// A service's connection status, as reported by `conn_status_change`.
/// `Open`/`Idle`/`Busy` select which row of a [`PmSpec`] applies; `Close`
/// and `NoPref` remove the service's table entry instead of consulting one.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnStatus {
    Open,
    Idle,
    Busy,
    Close,
    NoPref,
}

bitflags! {
    /// Which power modes a profile ever tolerates, OR-accumulated across
    /// every service active on a peer.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct ModeMask: u8 {
        const ACTIVE  = 1 << 0;
        const SNIFF   = 1 << 1;
        const PARK    = 1 << 2;
        const SUSPEND = 1 << 3;
    }
}

/// An arbitrated power-mode proposal. Numeric order is the strictness
/// comparison used to arbitrate between services (`PARK < SNIFF < SUSPEND`,
/// a higher value wins); `Active`/`NoAction` sit below every sleep mode so a
/// service that wants to stay awake never outranks one that wants to sleep
/// deeper.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u8)]
pub enum SpecAction {
    NoAction = 0,
    Active = 1,
    Park = 2,
    Sniff = 3,
    Suspend = 4,
}

impl SpecAction {
    #[must_use]
    pub const fn mode_mask(self) -> ModeMask {
        match self {
            Self::NoAction => ModeMask::empty(),
            Self::Active => ModeMask::ACTIVE,
            Self::Park => ModeMask::PARK,
            Self::Sniff => ModeMask::SNIFF,
            Self::Suspend => ModeMask::SUSPEND,
        }
    }

    /// The wire mode this action drives toward, where one exists.
    /// `Suspend` and `NoAction` have no direct HCI command of their own —
    /// `Suspend` is realized as the deepest configured SNIFF table row.
    #[must_use]
    pub const fn wire_mode(self) -> Option<PmMode> {
        match self {
            Self::Active => Some(PmMode::Active),
            Self::Park => Some(PmMode::Park),
            Self::Sniff | Self::Suspend => Some(PmMode::Sniff),
            Self::NoAction => None,
        }
    }

    /// The next less strict action, used to back off one step when the
    /// combined allow-mask or a previously failed mode rules this one out.
    /// `Active` is its own floor.
    #[must_use]
    pub const fn shallower(self) -> Self {
        match self {
            Self::Suspend => Self::Sniff,
            Self::Sniff => Self::Park,
            Self::Park | Self::Active | Self::NoAction => Self::Active,
        }
    }
}

/// One `(action, timeout)` pair: what a profile wants while in a given
/// [`ConnStatus`], and how long to wait before acting on it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PmSpecEntry {
    pub action: SpecAction,
    pub timeout_ms: u32,
}

/// A profile's full PM policy: the modes it ever tolerates, and what it
/// wants in each reachable [`ConnStatus`].
#[derive(Clone, Copy, Debug)]
pub struct PmSpec {
    pub allowed: ModeMask,
    pub on_open: PmSpecEntry,
    pub on_idle: PmSpecEntry,
    pub on_busy: PmSpecEntry,
}

impl PmSpec {
    #[must_use]
    pub const fn entry_for(&self, state: ConnStatus) -> Option<PmSpecEntry> {
        match state {
            ConnStatus::Open => Some(self.on_open),
            ConnStatus::Idle => Some(self.on_idle),
            ConnStatus::Busy => Some(self.on_busy),
            ConnStatus::Close | ConnStatus::NoPref => None,
        }
    }
}

/// HFP: stays active while a call is in progress (`Busy` = SCO open);
/// otherwise tolerates deep sniff once idle.
const HFP_SPEC: PmSpec = PmSpec {
    allowed: ModeMask::ACTIVE.union(ModeMask::SNIFF),
    on_open: PmSpecEntry { action: SpecAction::Active, timeout_ms: 0 },
    on_idle: PmSpecEntry { action: SpecAction::Sniff, timeout_ms: 7_000 },
    on_busy: PmSpecEntry { action: SpecAction::Active, timeout_ms: 0 },
};

/// A2DP: tolerates PARK between streams but wants ACTIVE the moment the
/// stream is busy (streaming audio).
const A2DP_SPEC: PmSpec = PmSpec {
    allowed: ModeMask::ACTIVE.union(ModeMask::SNIFF).union(ModeMask::PARK),
    on_open: PmSpecEntry { action: SpecAction::Sniff, timeout_ms: 3_000 },
    on_idle: PmSpecEntry { action: SpecAction::Park, timeout_ms: 10_000 },
    on_busy: PmSpecEntry { action: SpecAction::Active, timeout_ms: 0 },
};

/// HID: wants the shortest possible latency, so it never proposes
/// anything deeper than SNIFF and does so quickly once idle.
const HID_SPEC: PmSpec = PmSpec {
    allowed: ModeMask::ACTIVE.union(ModeMask::SNIFF),
    on_open: PmSpecEntry { action: SpecAction::Active, timeout_ms: 0 },
    on_idle: PmSpecEntry { action: SpecAction::Sniff, timeout_ms: 1_000 },
    on_busy: PmSpecEntry { action: SpecAction::Active, timeout_ms: 0 },
};

/// Any unrecognized profile: conservative default that only ever asks to
/// stay active, so an unknown service can block sleep but never force it.
const DEFAULT_SPEC: PmSpec = PmSpec {
    allowed: ModeMask::ACTIVE,
    on_open: PmSpecEntry { action: SpecAction::Active, timeout_ms: 0 },
    on_idle: PmSpecEntry { action: SpecAction::NoAction, timeout_ms: 0 },
    on_busy: PmSpecEntry { action: SpecAction::Active, timeout_ms: 0 },
};

/// Looks up the PM policy for `app_id`, preferring a host-supplied override
/// (`Config::pm_spec_overrides`) over the built-in table — the
/// profile-specific allow-mask/timeout values are a host policy this core
/// only arbitrates, not authors.
#[must_use]
pub fn spec_for(app_id: AppId, overrides: &[(AppId, PmSpec)]) -> PmSpec {
    if let Some((_, spec)) = overrides.iter().find(|(id, _)| *id == app_id) {
        return *spec;
    }
    match app_id {
        AppId::Hfp => HFP_SPEC,
        AppId::A2dp => A2DP_SPEC,
        AppId::Hid => HID_SPEC,
        AppId::Other(_) => DEFAULT_SPEC,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strictness_order_matches_park_sniff_suspend() {
        assert!(SpecAction::Park < SpecAction::Sniff);
        assert!(SpecAction::Sniff < SpecAction::Suspend);
        assert!(SpecAction::Active < SpecAction::Park);
    }

    #[test]
    fn override_replaces_the_built_in_spec() {
        let custom = PmSpec {
            allowed: ModeMask::ACTIVE,
            on_open: PmSpecEntry { action: SpecAction::Active, timeout_ms: 0 },
            on_idle: PmSpecEntry { action: SpecAction::Active, timeout_ms: 0 },
            on_busy: PmSpecEntry { action: SpecAction::Active, timeout_ms: 0 },
        };
        let spec = spec_for(AppId::Hfp, &[(AppId::Hfp, custom)]);
        assert_eq!(spec.on_idle.action, SpecAction::Active);
    }

    #[test]
    fn unknown_profile_falls_back_to_the_conservative_default() {
        let spec = spec_for(AppId::Other(99), &[]);
        assert_eq!(spec.on_idle.action, SpecAction::NoAction);
    }
}
