//! Classic power manager: per-connection link-policy state machine (C9),
//! the active-service table that gates it (C7), and the idle-escalation
//! timer bank that drives it (C8).

pub mod manager;
pub mod policy;
pub mod services;
pub mod table;
pub mod timer;

pub use manager::{Callbacks, PowerManager};
pub use policy::{AppId, ConnStatus, ModeMask, PmSpec, PmSpecEntry, SpecAction};
pub use services::{ServiceEntry, ServiceId, ServicesTable};
pub use table::{SniffEntry, DEFAULT_SNIFF_TABLE, PARK_IDX, SNIFF_TABLE_LEN};
pub use timer::{PmAction, TimerBank, TimerSlot};

/// Errors surfaced to power manager callers.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    /// The connection handle is not currently tracked by the power manager.
    #[error("connection is not tracked by the power manager")]
    UnknownConnection,
    /// A connection already has the maximum number of tracked services.
    #[error("too many services tracked on this connection")]
    TooManyServices,
}

pub type Result<T> = std::result::Result<T, Error>;
