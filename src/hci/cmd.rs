//! Outbound HCI command encoding. Each function here builds the opcode and
//! parameter bytes of one command; decoding its `HCI_Command_Complete`
//! return parameters (where it has any) is a sibling `_result` function
//! taking the bytes already stripped of the leading status field by
//! [`crate::hci::dispatcher::Dispatcher`].

pub mod hci_control;
pub mod le;
pub mod power;

use crate::hci::Opcode;

/// An outbound command: opcode plus little-endian-encoded parameters, ready
/// to hand to a [`crate::hci::dispatcher::Dispatcher`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Command {
    pub opcode: Opcode,
    pub params: Vec<u8>,
}

impl Command {
    #[must_use]
    pub fn new(opcode: Opcode, params: Vec<u8>) -> Self {
        Self { opcode, params }
    }
}

/// `HCI_Set_Event_Mask`, `HCI_Set_Event_Mask_Page_2`, and
/// `HCI_LE_Set_Event_Mask` command parameters
/// ([Vol 4] Part E, Section 7.3.1, 7.3.69, 7.8.1).
#[derive(Clone, Copy, Debug, Default)]
pub struct EventMask {
    pub(in crate::hci) p1: u64,
    pub(in crate::hci) p2: u64,
    pub(in crate::hci) le: u64,
}

impl FromIterator<crate::hci::EventCode> for EventMask {
    /// Creates an event mask from an iterator of events to enable.
    #[must_use]
    fn from_iter<T: IntoIterator<Item = crate::hci::EventCode>>(it: T) -> Self {
        let mut m = Self::default();
        for c in it {
            c.set(&mut m, true);
        }
        m
    }
}
