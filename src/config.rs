//! Host-side configuration knobs recognized by the advertising and power
//! managers. These mirror the handful of system properties the original
//! stack reads at startup; nothing here is re-read at runtime, so a running
//! [`crate::adv::AdvertisingManager`] or [`crate::pm::PowerManager`] always
//! sees the value it was constructed with.

use crate::pm::policy::{AppId, PmSpec};
use crate::pm::table::SNIFF_TABLE_LEN;

/// `bluetooth.hardware.radio.le_tx_path_loss_comp_db` and friends.
#[derive(Clone, Debug)]
pub struct Config {
    /// Added to every requested advertising tx power before clipping to
    /// `[-127, 20]` dBm.
    pub le_tx_path_loss_comp_db: i16,
    /// Overrides for the built-in SNIFF power-mode table, one slot per
    /// index up to `PARK_IDX`. `None` entries fall back to the compiled-in
    /// default for that index.
    pub sniff_overrides: [Option<SniffOverride>; SNIFF_TABLE_LEN],
    /// `nrpa_non_connectable_adv`: non-connectable advertisements under
    /// `Public`/`Static` address policy use NRPA instead of the identity
    /// address.
    pub nrpa_non_connectable_adv: bool,
    /// `divide_long_single_gap_data`: permit a single GAP element to exceed
    /// 252 bytes, splitting across fragments by raw byte count.
    pub divide_long_single_gap_data: bool,
    /// `ble_check_data_length_on_legacy_advertising`: additionally cap
    /// legacy-PDU advertising data at 31 bytes.
    pub ble_check_data_length_on_legacy_advertising: bool,
    /// Per-profile PM policy overrides, consulted before the compiled-in
    /// `HFP`/`A2DP`/`HID`/default table in [`crate::pm::policy::spec_for`].
    pub pm_spec_overrides: Vec<(AppId, PmSpec)>,
}

/// One row of a `bluetooth.core.classic.sniff_*` override list.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SniffOverride {
    pub max_interval: u16,
    pub min_interval: u16,
    pub attempts: u16,
    pub timeout: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            le_tx_path_loss_comp_db: 0,
            sniff_overrides: [None; SNIFF_TABLE_LEN],
            nrpa_non_connectable_adv: false,
            divide_long_single_gap_data: false,
            ble_check_data_length_on_legacy_advertising: true,
            pm_spec_overrides: Vec::new(),
        }
    }
}

impl Config {
    /// Clips a requested tx power (dBm) after applying the configured path
    /// loss compensation.
    #[inline]
    #[must_use]
    pub fn compensate_tx_power(&self, requested: i8) -> i8 {
        let compensated = i16::from(requested) + self.le_tx_path_loss_comp_db;
        compensated.clamp(-127, 20) as i8
    }
}
