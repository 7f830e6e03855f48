//! Decoders for the plain (non-LE) HCI events the power manager reacts to.

use crate::hci::consts::StChangeReason;
use crate::hci::{Event, EventCode, EventType, Status};
use crate::le::{ConnHandle, RawAddr};

/// `HCI_Mode_Change` ([Vol 4] Part E, Section 7.7.20): the controller has
/// (asynchronously, or in response to a `HCI_Exit_*_Mode`/`HCI_*_Mode`
/// command) switched a connection's link policy mode.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ModeChange {
    pub status: Status,
    pub conn: ConnHandle,
    pub mode: crate::hci::consts::PmMode,
    pub interval: u16,
}

impl ModeChange {
    #[must_use]
    pub fn from_event(e: &mut Event) -> Option<Self> {
        debug_assert_eq!(e.typ(), EventType::Hci(EventCode::ModeChange));
        let status = e.status();
        let conn = e.conn_handle()?;
        let u = e.unpack();
        let mode = crate::hci::consts::PmMode::try_from(u.u8()).ok()?;
        let interval = u.u16();
        Some(Self {
            status,
            conn,
            mode,
            interval,
        })
    }
}

/// `HCI_Sniff_Subrating` event ([Vol 4] Part E, Section 7.7.37): reports the
/// negotiated subrate after a successful `HCI_Sniff_Subrating` command.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SniffSubrating {
    pub status: Status,
    pub conn: ConnHandle,
    pub max_tx_latency: u16,
    pub max_rx_latency: u16,
    pub min_remote_timeout: u16,
    pub min_local_timeout: u16,
}

impl SniffSubrating {
    #[must_use]
    pub fn from_event(e: &mut Event) -> Option<Self> {
        debug_assert_eq!(e.typ(), EventType::Hci(EventCode::SniffSubrating));
        let status = e.status();
        let conn = e.conn_handle()?;
        let u = e.unpack();
        Some(Self {
            status,
            conn,
            max_tx_latency: u.u16(),
            max_rx_latency: u.u16(),
            min_remote_timeout: u.u16(),
            min_local_timeout: u.u16(),
        })
    }
}

/// Vendor `BLE_STCHANGE` event: the pre-extended-advertising controller's
/// analog of `HCI_LE_Advertising_Set_Terminated`, keyed by address rather
/// than an advertising handle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StChange {
    pub addr: RawAddr,
    pub reason: StChangeReason,
}

impl StChange {
    #[must_use]
    pub fn from_event(e: &mut Event) -> Option<Self> {
        debug_assert_eq!(e.typ(), EventType::Hci(EventCode::Vendor));
        let u = e.unpack();
        let addr = u.addr();
        let reason = StChangeReason::try_from(u.u8()).ok()?;
        Some(Self { addr, reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hci::buf::Packer;

    fn wrap(code: EventCode, params: &[u8]) -> Vec<u8> {
        let mut w = Packer::new();
        w.u8(code as u8)
            .u8(u8::try_from(params.len()).unwrap())
            .put(params);
        w.into_vec()
    }

    #[test]
    fn decodes_mode_change() {
        let mut params = Packer::new();
        params.u8(0u8).u16(5u16).u8(2u8).u16(800u16);
        let raw = wrap(EventCode::ModeChange, &params.into_vec());
        let mut evt = Event::try_from(&raw[..]).unwrap();
        let mc = ModeChange::from_event(&mut evt).unwrap();
        assert_eq!(mc.conn.get(), 5);
        assert_eq!(mc.mode, crate::hci::consts::PmMode::Sniff);
        assert_eq!(mc.interval, 800);
    }
}
