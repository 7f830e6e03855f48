//! LE Controller commands ([Vol 4] Part E, Section 7.8) used by the
//! advertising manager.

use std::time::Duration;

use crate::hci::buf::{Packer, Unpacker};
use crate::hci::cmd::Command;
use crate::hci::consts::{AdvAddrType, AdvChanMap, AdvDataOp, AdvFilterPolicy, AdvPhy, AdvProp};
use crate::hci::{Opcode, SubeventCode};
use crate::le::{Addr, AddrType, AdvHandle, RawAddr, TxPower};

/// `HCI_LE_Set_Event_Mask`.
#[must_use]
pub fn le_set_event_mask(events: impl Iterator<Item = SubeventCode>) -> Command {
    let mut mask = 0u64;
    for e in events {
        mask |= e.mask();
    }
    let mut w = Packer::new();
    w.u64(mask);
    Command::new(Opcode::LeSetEventMask, w.into_vec())
}

/// `HCI_LE_Set_Random_Address` ([Vol 4] Part E, Section 7.8.4), used for the
/// controller-wide random address on pre-extended-advertising controllers.
#[must_use]
pub fn le_set_random_address(a: RawAddr) -> Command {
    let mut w = Packer::new();
    w.addr(a);
    Command::new(Opcode::LeSetRandomAddress, w.into_vec())
}

/// `HCI_LE_Set_Advertising_Set_Random_Address` ([Vol 4] Part E, Section 7.8.4).
#[must_use]
pub fn le_set_advertising_set_random_address(h: AdvHandle, a: RawAddr) -> Command {
    let mut w = Packer::new();
    w.u8(h.get()).addr(a);
    Command::new(Opcode::LeSetAdvertisingSetRandomAddress, w.into_vec())
}

/// `HCI_LE_Set_Extended_Advertising_Parameters` parameters
/// ([Vol 4] Part E, Section 7.8.53).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct AdvParams {
    pub props: AdvProp,
    pub pri_interval_min: Duration,
    pub pri_interval_max: Duration,
    pub pri_chan_map: AdvChanMap,
    pub addr_type: AdvAddrType,
    pub peer_addr: Addr,
    pub filter_policy: AdvFilterPolicy,
    pub tx_power: Option<TxPower>,
    pub pri_phy: AdvPhy,
    pub sec_max_skip: u8,
    pub sec_phy: AdvPhy,
    pub sid: u8,
    pub scan_request_notify: bool,
}

/// Converts a duration to N*0.625ms ticks, saturating at the 3-octet max.
fn ticks_625us(d: Duration) -> u32 {
    let ticks = d.as_micros() / 625;
    u32::try_from(ticks).unwrap_or(u32::MAX).min(0x00FF_FFFF)
}

/// `HCI_LE_Set_Extended_Advertising_Parameters`.
#[must_use]
pub fn le_set_extended_advertising_parameters(h: AdvHandle, p: &AdvParams) -> Command {
    let mut w = Packer::new();
    w.u8(h.get())
        .u16(p.props.bits())
        .u24(ticks_625us(p.pri_interval_min))
        .u24(ticks_625us(p.pri_interval_max))
        .u8(p.pri_chan_map.bits())
        .u8(p.addr_type as u8)
        .u8(match p.peer_addr.addr_type {
            AddrType::Public => 0x00,
            AddrType::Random => 0x01,
        })
        .addr(p.peer_addr.addr)
        .u8(p.filter_policy as u8)
        .i8(p.tx_power.map_or(TxPower::NONE, i8::from))
        .u8(p.pri_phy as u8)
        .u8(p.sec_max_skip)
        .u8(p.sec_phy as u8)
        .u8(p.sid)
        .bool(p.scan_request_notify);
    Command::new(Opcode::LeSetExtendedAdvertisingParameters, w.into_vec())
}

/// Return parameter of `HCI_LE_Set_Extended_Advertising_Parameters`: the
/// selected tx power, already clipped by the controller.
#[must_use]
pub fn le_set_extended_advertising_parameters_result(params: &[u8]) -> TxPower {
    TxPower::dbm(Unpacker::new(params).i8())
}

/// Splits `data` into fragments no longer than `max_len`, tagging each with
/// the appropriate [`AdvDataOp`] (`Complete` for a single fragment,
/// `FirstFragment`/`Intermediate`/`LastFragment` otherwise).
#[must_use]
pub fn fragment_adv_data(data: &[u8], max_len: usize) -> Vec<(AdvDataOp, Vec<u8>)> {
    if data.is_empty() {
        return vec![(AdvDataOp::Complete, Vec::new())];
    }
    let chunks: Vec<&[u8]> = data.chunks(max_len.max(1)).collect();
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            let op = match (i == 0, i + 1 == chunks.len()) {
                (true, true) => AdvDataOp::Complete,
                (true, false) => AdvDataOp::First,
                (false, true) => AdvDataOp::Last,
                (false, false) => AdvDataOp::Cont,
            };
            (op, chunk.to_vec())
        })
        .collect()
}

/// `HCI_LE_Set_Extended_Advertising_Data`.
#[must_use]
pub fn le_set_extended_advertising_data(
    h: AdvHandle,
    op: AdvDataOp,
    dont_frag: bool,
    data: &[u8],
) -> Command {
    let mut w = Packer::new();
    w.u8(h.get())
        .u8(op as u8)
        .bool(dont_frag)
        .u8(u8::try_from(data.len()).expect("advertising data fragment exceeds 255 bytes"))
        .put(data);
    Command::new(Opcode::LeSetExtendedAdvertisingData, w.into_vec())
}

/// `HCI_LE_Set_Extended_Scan_Response_Data`.
#[must_use]
pub fn le_set_extended_scan_response_data(
    h: AdvHandle,
    op: AdvDataOp,
    dont_frag: bool,
    data: &[u8],
) -> Command {
    let mut w = Packer::new();
    w.u8(h.get())
        .u8(op as u8)
        .bool(dont_frag)
        .u8(u8::try_from(data.len()).expect("scan response fragment exceeds 255 bytes"))
        .put(data);
    Command::new(Opcode::LeSetExtendedScanResponseData, w.into_vec())
}

/// One advertising set entry in `HCI_LE_Set_Extended_Advertising_Enable`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AdvEnableParams {
    pub handle: AdvHandle,
    pub duration: Duration,
    pub max_events: u8,
}

impl From<AdvHandle> for AdvEnableParams {
    #[inline]
    fn from(h: AdvHandle) -> Self {
        Self {
            handle: h,
            duration: Duration::default(),
            max_events: 0,
        }
    }
}

/// `HCI_LE_Set_Extended_Advertising_Enable`.
#[must_use]
pub fn le_set_extended_advertising_enable(enable: bool, cfg: &[AdvEnableParams]) -> Command {
    let mut w = Packer::new();
    w.bool(enable)
        .u8(u8::try_from(cfg.len()).expect("too many advertising sets in one command"));
    for c in cfg {
        let ticks = (c.duration.as_millis() / 10).min(u128::from(u16::MAX));
        w.u8(c.handle.get())
            .u16(u16::try_from(ticks).unwrap_or(u16::MAX))
            .u8(c.max_events);
    }
    Command::new(Opcode::LeSetExtendedAdvertisingEnable, w.into_vec())
}

/// `HCI_LE_Read_Maximum_Advertising_Data_Length`.
#[must_use]
pub fn le_read_maximum_advertising_data_length() -> Command {
    Command::new(Opcode::LeReadMaximumAdvertisingDataLength, Vec::new())
}

#[must_use]
pub fn le_read_maximum_advertising_data_length_result(params: &[u8]) -> usize {
    usize::from(Unpacker::new(params).u16())
}

/// `HCI_LE_Read_Number_Of_Supported_Advertising_Sets`.
#[must_use]
pub fn le_read_number_of_supported_advertising_sets() -> Command {
    Command::new(Opcode::LeReadNumberOfSupportedAdvertisingSets, Vec::new())
}

#[must_use]
pub fn le_read_number_of_supported_advertising_sets_result(params: &[u8]) -> u8 {
    Unpacker::new(params).u8()
}

/// `HCI_LE_Remove_Advertising_Set`.
#[must_use]
pub fn le_remove_advertising_set(h: AdvHandle) -> Command {
    let mut w = Packer::new();
    w.u8(h.get());
    Command::new(Opcode::LeRemoveAdvertisingSet, w.into_vec())
}

/// `HCI_LE_Clear_Advertising_Sets`.
#[must_use]
pub fn le_clear_advertising_sets() -> Command {
    Command::new(Opcode::LeClearAdvertisingSets, Vec::new())
}

/// `HCI_LE_Set_Periodic_Advertising_Parameters` parameters
/// ([Vol 4] Part E, Section 7.8.61).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PeriodicParams {
    pub interval_min: Duration,
    pub interval_max: Duration,
    pub include_tx_power: bool,
}

/// Converts a duration to N*1.25ms ticks, saturating at the 2-octet max.
fn ticks_1250us(d: Duration) -> u16 {
    let ticks = d.as_micros() / 1250;
    u16::try_from(ticks).unwrap_or(u16::MAX)
}

/// `HCI_LE_Set_Periodic_Advertising_Parameters`.
#[must_use]
pub fn le_set_periodic_advertising_parameters(h: AdvHandle, p: &PeriodicParams) -> Command {
    let mut w = Packer::new();
    w.u8(h.get())
        .u16(ticks_1250us(p.interval_min))
        .u16(ticks_1250us(p.interval_max))
        .u16(u16::from(p.include_tx_power));
    Command::new(Opcode::LeSetPeriodicAdvertisingParameters, w.into_vec())
}

/// `HCI_LE_Set_Periodic_Advertising_Data`.
#[must_use]
pub fn le_set_periodic_advertising_data(h: AdvHandle, op: AdvDataOp, data: &[u8]) -> Command {
    let mut w = Packer::new();
    w.u8(h.get())
        .u8(op as u8)
        .u8(u8::try_from(data.len()).expect("periodic advertising fragment exceeds 255 bytes"))
        .put(data);
    Command::new(Opcode::LeSetPeriodicAdvertisingData, w.into_vec())
}

/// `HCI_LE_Set_Periodic_Advertising_Enable`.
#[must_use]
pub fn le_set_periodic_advertising_enable(h: AdvHandle, enable: bool, include_adi: bool) -> Command {
    let mut w = Packer::new();
    let mut bits = u8::from(enable);
    if include_adi {
        bits |= 0x02;
    }
    w.u8(bits).u8(h.get());
    Command::new(Opcode::LeSetPeriodicAdvertisingEnable, w.into_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragments_long_data_with_first_intermediate_last() {
        let data = vec![0xAB; 500];
        let frags = fragment_adv_data(&data, 200);
        assert_eq!(frags.len(), 3);
        assert_eq!(frags[0].0, AdvDataOp::First);
        assert_eq!(frags[1].0, AdvDataOp::Cont);
        assert_eq!(frags[2].0, AdvDataOp::Last);
        assert_eq!(frags[0].1.len() + frags[1].1.len() + frags[2].1.len(), 500);
    }

    #[test]
    fn short_data_is_a_single_complete_fragment() {
        let frags = fragment_adv_data(&[1, 2, 3], 200);
        assert_eq!(frags, vec![(AdvDataOp::Complete, vec![1, 2, 3])]);
    }

    #[test]
    fn set_extended_advertising_parameters_encodes_handle_first() {
        let cmd = le_set_extended_advertising_parameters(
            AdvHandle::new(3).unwrap(),
            &AdvParams::default(),
        );
        assert_eq!(cmd.opcode, Opcode::LeSetExtendedAdvertisingParameters);
        assert_eq!(cmd.params[0], 3);
    }

    #[test]
    fn periodic_advertising_enable_sets_the_adi_bit() {
        let cmd = le_set_periodic_advertising_enable(AdvHandle::new(1).unwrap(), true, true);
        assert_eq!(cmd.opcode, Opcode::LeSetPeriodicAdvertisingEnable);
        assert_eq!(cmd.params[0], 0x03);
        assert_eq!(cmd.params[1], 1);
    }
}
