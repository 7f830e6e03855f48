//! HCI Control and Baseband commands ([Vol 4] Part E, Section 7.3) used
//! during controller bring-up.

use crate::hci::buf::Packer;
use crate::hci::cmd::{Command, EventMask};
use crate::hci::Opcode;

/// `HCI_Set_Event_Mask`.
#[must_use]
pub fn set_event_mask(mask: EventMask) -> Command {
    let mut w = Packer::new();
    w.u64(mask.p1);
    Command::new(Opcode::SetEventMask, w.into_vec())
}

/// `HCI_Reset`.
#[must_use]
pub fn reset() -> Command {
    Command::new(Opcode::Reset, Vec::new())
}

/// `HCI_Set_Controller_To_Host_Flow_Control`.
#[must_use]
pub fn set_controller_to_host_flow_control(enable: bool) -> Command {
    let mut w = Packer::new();
    w.bool(enable);
    Command::new(Opcode::SetControllerToHostFlowControl, w.into_vec())
}

/// `HCI_Set_Event_Mask_Page_2`.
#[must_use]
pub fn set_event_mask_page_2(mask: EventMask) -> Command {
    let mut w = Packer::new();
    w.u64(mask.p2);
    Command::new(Opcode::SetEventMaskPage2, w.into_vec())
}

/// `HCI_Write_LE_Host_Support`.
#[must_use]
pub fn write_le_host_support(enable: bool) -> Command {
    let mut w = Packer::new();
    w.bool(enable).u8(0u8);
    Command::new(Opcode::WriteLeHostSupport, w.into_vec())
}
