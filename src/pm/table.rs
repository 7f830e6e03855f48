//! Built-in SNIFF power-mode table: the ladder of increasingly deep sniff
//! intervals the power manager climbs through as a connection goes idle,
//! terminating in the PARK entry.

use crate::config::SniffOverride;

/// Number of table entries, one per `sniff_*` index plus the trailing PARK
/// entry.
pub const SNIFF_TABLE_LEN: usize = 5;

/// Index of the PARK entry; every lower index is a SNIFF level, shallowest
/// first.
pub const PARK_IDX: usize = SNIFF_TABLE_LEN - 1;

/// One row of the power-mode table: `Baseband_..._Interval` pair plus the
/// `attempts`/`timeout` parameters `HCI_Sniff_Mode` takes for this depth.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SniffEntry {
    pub max_interval: u16,
    pub min_interval: u16,
    pub attempts: u16,
    pub timeout: u16,
}

/// Compiled-in default table, shallowest sniff level first, PARK last.
/// Intervals are in baseband slots (0.625ms).
pub const DEFAULT_SNIFF_TABLE: [SniffEntry; SNIFF_TABLE_LEN] = [
    SniffEntry { max_interval: 800, min_interval: 400, attempts: 4, timeout: 1 },
    SniffEntry { max_interval: 400, min_interval: 200, attempts: 4, timeout: 1 },
    SniffEntry { max_interval: 200, min_interval: 100, attempts: 4, timeout: 1 },
    SniffEntry { max_interval: 54, min_interval: 18, attempts: 4, timeout: 1 },
    SniffEntry { max_interval: 1600, min_interval: 1600, attempts: 0, timeout: 1 },
];

/// Returns the effective entry for `idx`, preferring `overrides[idx]` over
/// the compiled-in default.
#[must_use]
pub fn entry(idx: usize, overrides: &[Option<SniffOverride>; SNIFF_TABLE_LEN]) -> SniffEntry {
    overrides[idx].map_or(DEFAULT_SNIFF_TABLE[idx], |o| SniffEntry {
        max_interval: o.max_interval,
        min_interval: o.min_interval,
        attempts: o.attempts,
        timeout: o.timeout,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn park_entry_is_the_last_row() {
        assert_eq!(PARK_IDX, SNIFF_TABLE_LEN - 1);
    }

    #[test]
    fn override_replaces_default_entry() {
        let mut overrides = [None; SNIFF_TABLE_LEN];
        overrides[0] = Some(SniffOverride { max_interval: 10, min_interval: 5, attempts: 2, timeout: 3 });
        let e = entry(0, &overrides);
        assert_eq!(e.max_interval, 10);
        let e1 = entry(1, &overrides);
        assert_eq!(e1, DEFAULT_SNIFF_TABLE[1]);
    }
}
