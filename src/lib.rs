//! Host-side core of the LE Advertising Manager and the classic Power
//! Manager: the two state machines that own advertising set lifecycle and
//! per-peer low-power mode arbitration.
//!
//! Both subsystems are single-threaded state machines layered on top of an
//! asynchronous HCI command/event protocol; see [`hci`] for the dispatcher
//! they share, [`adv`] for the advertising side, and [`pm`] for the classic
//! power side.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

#[path = "adv/adv.rs"]
pub mod adv;
pub mod alarm;
pub mod config;
#[path = "hci/hci.rs"]
pub mod hci;
pub mod le;
#[path = "pm/pm.rs"]
pub mod pm;

type SyncMutex<T> = parking_lot::Mutex<T>;
