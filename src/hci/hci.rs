//! Host Controller Interface layer: wire constants (`consts`), little-endian
//! packing (`buf`), outbound command encoding (`cmd`), inbound event
//! decoding (`event`), and the single-command-in-flight dispatcher (C1,
//! `dispatcher`) that ties them together.
//!
//! The HCI transport itself — how bytes actually reach and leave the
//! controller — is out of scope here; [`dispatcher::CommandSink`] is the
//! seam a transport plugs into.

pub mod buf;
pub mod cmd;
pub mod consts;
pub mod dispatcher;
#[path = "event/event.rs"]
pub mod event;

pub use consts::{
    AdvAddrType, AdvChanMap, AdvDataOp, AdvFilterPolicy, AdvPhy, AdvProp, EventCode,
    MultiAdvtSubcmd, Opcode, PmMode, StChangeReason, Status, SubeventCode,
};
pub use event::{Event, EventType};

/// Errors from encoding, dispatching, or decoding HCI traffic.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The controller completed a command with a failure status.
    #[error("{opcode:?} failed: {status}")]
    CommandFailed { opcode: Opcode, status: Status },
    /// An event's bytes don't parse as a well-formed HCI event.
    #[error("malformed event: {0}")]
    Malformed(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
