//! HCI event header decoding, shared by every consumer in [`super::le`] and
//! [`super::hci`]. Parsing a raw event buffer is split from acting on it: this
//! module only turns bytes into an [`Event`], leaving correlation with
//! in-flight commands to [`crate::hci::dispatcher`].

use crate::hci::buf::Unpacker;
use crate::hci::consts::{EventFmt, EVT_HDR};
use crate::hci::{EventCode, Opcode, Status, SubeventCode};
use crate::hci::{Error, Result};

pub use hci::*;
pub use le::*;

mod hci;
mod le;

/// A decoded HCI event, with the command-completion and handle fields
/// pre-extracted and the rest of the parameters left in the cursor for the
/// caller to consume via [`Event::unpack`].
#[derive(Clone, Copy, Debug)]
#[must_use]
pub struct Event<'a> {
    typ: EventType,
    status: Status,
    opcode: Opcode,
    handle: u16,
    params: Unpacker<'a>,
}

impl<'a> Event<'a> {
    /// Returns the event type.
    #[inline]
    #[must_use]
    pub const fn typ(&self) -> EventType {
        self.typ
    }

    /// Returns the event status, or [`Status::Success`] for events without a
    /// status parameter.
    #[inline]
    #[must_use]
    pub const fn status(&self) -> Status {
        self.status
    }

    /// Returns the opcode from a `CommandComplete`/`CommandStatus` event.
    #[inline]
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// Returns the associated advertising handle, or `None` for events that
    /// don't carry one.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn adv_handle(&self) -> Option<crate::le::AdvHandle> {
        self.typ
            .param_fmt()
            .contains(EventFmt::ADV_HANDLE)
            .then(|| crate::le::AdvHandle::new(self.handle as u8))
            .flatten()
    }

    /// Returns the associated connection handle, or `None` for events that
    /// don't carry one.
    #[must_use]
    pub fn conn_handle(&self) -> Option<crate::le::ConnHandle> {
        self.typ
            .param_fmt()
            .contains(EventFmt::CONN_HANDLE)
            .then(|| crate::le::ConnHandle::new(self.handle))
            .flatten()
    }

    /// Gives mutable access to the remaining parameter cursor.
    #[inline]
    pub fn unpack(&mut self) -> &mut Unpacker<'a> {
        &mut self.params
    }

    /// Returns the event if it represents successful completion of a
    /// command, otherwise the command-failure error.
    pub fn ok(self) -> Result<Self> {
        if !self.status.is_ok() {
            return Err(Error::CommandFailed {
                opcode: self.opcode,
                status: self.status,
            });
        }
        Ok(self)
    }
}

impl<'a> TryFrom<&'a [u8]> for Event<'a> {
    type Error = Error;

    /// Parses the event header from `orig`. The subevent code for LE events,
    /// the status parameter, and handle parameters (where present for the
    /// event type) are consumed; everything else is left for the caller.
    fn try_from(orig: &'a [u8]) -> Result<Self> {
        if orig.len() < EVT_HDR {
            return Err(Error::Malformed("event shorter than header"));
        }
        let code = orig[0];
        let len = usize::from(orig[1]);
        let mut params = Unpacker::new(&orig[EVT_HDR..]);
        if params.remaining() != len {
            return Err(Error::Malformed("event length mismatch"));
        }
        let typ = match EventCode::try_from(code) {
            Ok(EventCode::LeMetaEvent) => {
                let subevent = params.u8();
                match SubeventCode::try_from(subevent) {
                    Ok(s) => EventType::Le(s),
                    Err(_) => return Err(Error::Malformed("unknown LE subevent")),
                }
            }
            Ok(c) => EventType::Hci(c),
            Err(_) => return Err(Error::Malformed("unknown event code")),
        };
        let mut evt = Self {
            typ,
            status: Status::Success,
            opcode: Opcode::None,
            handle: 0,
            params,
        };
        match typ {
            EventType::Hci(EventCode::CommandComplete) => {
                let _num_hci_cmd_pkts = evt.params.u8();
                evt.opcode = Opcode::from(evt.params.u16());
                if !evt.params.is_empty() {
                    evt.status = Status::from(evt.params.u8());
                }
            }
            EventType::Hci(EventCode::CommandStatus) => {
                evt.status = Status::from(evt.params.u8());
                let _num_hci_cmd_pkts = evt.params.u8();
                evt.opcode = Opcode::from(evt.params.u16());
            }
            _ => {
                let pf = typ.param_fmt();
                if pf.intersects(EventFmt::STATUS) {
                    evt.status = Status::from(evt.params.u8());
                }
                if pf.intersects(EventFmt::ADV_HANDLE) {
                    evt.handle = u16::from(evt.params.u8());
                } else if pf.intersects(EventFmt::HANDLE) {
                    evt.handle = evt.params.u16();
                }
            }
        }
        Ok(evt)
    }
}

/// HCI event code or LE meta-event subevent code.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EventType {
    Hci(EventCode),
    Le(SubeventCode),
}

impl EventType {
    /// Returns whether this is a `CommandComplete` or `CommandStatus` event.
    #[inline]
    #[must_use]
    pub const fn is_cmd(self) -> bool {
        matches!(
            self,
            Self::Hci(EventCode::CommandComplete | EventCode::CommandStatus)
        )
    }

    /// Returns the parameter layout for this event type.
    #[inline]
    #[must_use]
    pub const fn param_fmt(self) -> EventFmt {
        match self {
            Self::Hci(c) => c.param_fmt(),
            Self::Le(c) => c.param_fmt(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_command_complete_header() {
        // num_hci_command_packets=1, opcode=0x2036 (LE_Set_Extended_Advertising_Enable), status=Success
        let raw = [0x0E, 0x04, 0x01, 0x36, 0x20, 0x00];
        let evt = Event::try_from(&raw[..]).unwrap();
        assert_eq!(evt.typ(), EventType::Hci(EventCode::CommandComplete));
        assert_eq!(evt.status(), Status::Success);
        assert!(evt.typ().is_cmd());
    }

    #[test]
    fn rejects_length_mismatch() {
        let raw = [0x0E, 0x09, 0x01, 0x36, 0x20, 0x00];
        assert!(Event::try_from(&raw[..]).is_err());
    }
}
