//! Decoders for the LE meta-event subevents the advertising manager reacts
//! to ([Vol 4] Part E, Section 7.7.65).

use crate::hci::{Event, EventType, Status, SubeventCode};
use crate::le::AdvHandle;

/// `HCI_LE_Advertising_Set_Terminated` ([Vol 4] Part E, Section 7.7.65.18):
/// an extended advertising set stopped, either because its duration/event
/// count limit was reached or because it accepted a connection.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AdvertisingSetTerminated {
    pub status: Status,
    pub handle: AdvHandle,
    pub conn: Option<crate::le::ConnHandle>,
    pub num_completed_ext_adv_events: u8,
}

impl AdvertisingSetTerminated {
    #[must_use]
    pub fn from_event(e: &mut Event) -> Option<Self> {
        debug_assert_eq!(
            e.typ(),
            EventType::Le(SubeventCode::AdvertisingSetTerminated)
        );
        let status = e.status();
        let handle = e.adv_handle()?;
        let u = e.unpack();
        let conn = crate::le::ConnHandle::new(u.u16());
        Some(Self {
            status,
            handle,
            conn,
            num_completed_ext_adv_events: u.u8(),
        })
    }
}

/// `HCI_LE_Scan_Request_Received` ([Vol 4] Part E, Section 7.7.65.19): a
/// scanner requested a scan response on a set advertising `AdvProp::SCANNABLE`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ScanRequestReceived {
    pub handle: AdvHandle,
    pub scanner_addr_type: crate::le::AddrType,
    pub scanner_addr: crate::le::RawAddr,
}

impl ScanRequestReceived {
    #[must_use]
    pub fn from_event(e: &mut Event) -> Option<Self> {
        debug_assert_eq!(e.typ(), EventType::Le(SubeventCode::ScanRequestReceived));
        let handle = e.adv_handle()?;
        let u = e.unpack();
        let (scanner_addr_type, scanner_addr) = u.typed_addr();
        Some(Self {
            handle,
            scanner_addr_type,
            scanner_addr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hci::buf::Packer;
    use crate::hci::EventCode;

    fn wrap_le(subevent: SubeventCode, params: &[u8]) -> Vec<u8> {
        let mut body = Packer::new();
        body.u8(subevent as u8).put(params);
        let body = body.into_vec();
        let mut w = Packer::new();
        w.u8(EventCode::LeMetaEvent as u8)
            .u8(u8::try_from(body.len()).unwrap())
            .put(&body);
        w.into_vec()
    }

    #[test]
    fn decodes_advertising_set_terminated() {
        let mut p = Packer::new();
        p.u8(0u8).u8(3u8).u16(7u16).u8(12u8);
        let raw = wrap_le(SubeventCode::AdvertisingSetTerminated, &p.into_vec());
        let mut evt = Event::try_from(&raw[..]).unwrap();
        let t = AdvertisingSetTerminated::from_event(&mut evt).unwrap();
        assert_eq!(t.handle.get(), 3);
        assert_eq!(t.num_completed_ext_adv_events, 12);
        assert!(t.conn.is_some());
    }
}
