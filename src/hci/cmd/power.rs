//! Link Policy commands ([Vol 4] Part E, Section 7.2) used by the classic
//! power manager to move a connection between ACTIVE, SNIFF, and PARK, and
//! to negotiate sniff subrating.

use crate::hci::buf::{Packer, Unpacker};
use crate::hci::cmd::Command;
use crate::hci::Opcode;
use crate::le::ConnHandle;

/// `HCI_Sniff_Mode` parameters ([Vol 4] Part E, Section 7.2.2).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SniffParams {
    pub max_interval: u16,
    pub min_interval: u16,
    pub attempt: u16,
    pub timeout: u16,
}

/// `HCI_Sniff_Mode`.
#[must_use]
pub fn sniff_mode(conn: ConnHandle, p: SniffParams) -> Command {
    let mut w = Packer::new();
    w.u16(conn.get())
        .u16(p.max_interval)
        .u16(p.min_interval)
        .u16(p.attempt)
        .u16(p.timeout);
    Command::new(Opcode::SniffMode, w.into_vec())
}

/// `HCI_Exit_Sniff_Mode`.
#[must_use]
pub fn exit_sniff_mode(conn: ConnHandle) -> Command {
    let mut w = Packer::new();
    w.u16(conn.get());
    Command::new(Opcode::ExitSniffMode, w.into_vec())
}

/// `HCI_Park_State` parameters ([Vol 4] Part E, Section 7.2.5).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ParkParams {
    pub max_interval: u16,
    pub min_interval: u16,
}

/// `HCI_Park_State`.
#[must_use]
pub fn park_state(conn: ConnHandle, p: ParkParams) -> Command {
    let mut w = Packer::new();
    w.u16(conn.get()).u16(p.max_interval).u16(p.min_interval);
    Command::new(Opcode::ParkState, w.into_vec())
}

/// `HCI_Exit_Park_State`.
#[must_use]
pub fn exit_park_state(conn: ConnHandle) -> Command {
    let mut w = Packer::new();
    w.u16(conn.get());
    Command::new(Opcode::ExitParkState, w.into_vec())
}

/// `HCI_Sniff_Subrating` parameters ([Vol 4] Part E, Section 7.2.19).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SniffSubrateParams {
    pub max_latency: u16,
    pub min_remote_timeout: u16,
    pub min_local_timeout: u16,
}

/// `HCI_Sniff_Subrating`.
#[must_use]
pub fn sniff_subrating(conn: ConnHandle, p: SniffSubrateParams) -> Command {
    let mut w = Packer::new();
    w.u16(conn.get())
        .u16(p.max_latency)
        .u16(p.min_remote_timeout)
        .u16(p.min_local_timeout);
    Command::new(Opcode::SniffSubrating, w.into_vec())
}

/// Return parameter shared by all four mode commands: the connection handle
/// echoed back, present so the caller can assert its own correlation even
/// though the dispatcher has already matched the opcode.
#[must_use]
pub fn mode_change_result(params: &[u8]) -> Option<ConnHandle> {
    ConnHandle::new(Unpacker::new(params).u16())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniff_mode_encodes_connection_handle_first() {
        let conn = ConnHandle::new(0x42).unwrap();
        let cmd = sniff_mode(
            conn,
            SniffParams {
                max_interval: 800,
                min_interval: 400,
                attempt: 4,
                timeout: 1,
            },
        );
        assert_eq!(cmd.opcode, Opcode::SniffMode);
        assert_eq!(u16::from_le_bytes([cmd.params[0], cmd.params[1]]), 0x42);
    }
}
