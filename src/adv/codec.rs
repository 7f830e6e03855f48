//! Advertising data codec (C4): serializes GAP data elements into the LTV
//! byte stream the controller expects, auto-inserts the `FLAGS` element,
//! seals payloads for encrypted advertising, and splits the result into
//! fragments no larger than a single HCI command can carry.

use crate::adv::{Error, Result};
use crate::hci::cmd::le::fragment_adv_data;
use crate::hci::AdvDataOp;
use btcore_crypto::KeyMaterial;

/// Maximum value length the controller will accept for a single GAP data
/// element (one byte for the combined length+type prefix is reserved).
const MAX_ELEMENT_LEN: usize = 253;
/// Additional cap on total payload length under the legacy advertising PDU,
/// which has no room for extended fragmentation.
const LEGACY_MAX_DATA_LEN: usize = 31;
/// Largest single fragment `LE_Set_Extended_Advertising_Data` can carry.
const MAX_FRAGMENT_LEN: usize = 252;

const AD_TYPE_FLAGS: u8 = 0x01;
const AD_TYPE_TX_POWER_LEVEL: u8 = 0x0A;
const AD_TYPE_ENCRYPTED_DATA: u8 = 0x31;

const FLAG_GENERAL_DISCOVERABLE: u8 = 0x02;
const FLAG_LIMITED_DISCOVERABLE: u8 = 0x01;

/// One `length, type, value` triple of a GAP advertising data stream.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GapElement {
    pub data_type: u8,
    pub value: Vec<u8>,
}

impl GapElement {
    #[must_use]
    pub fn new(data_type: u8, value: Vec<u8>) -> Self {
        Self { data_type, value }
    }

    fn encoded_len(&self) -> usize {
        // length byte + type byte + value
        2 + self.value.len()
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        #[allow(clippy::cast_possible_truncation)]
        out.push((self.value.len() + 1) as u8);
        out.push(self.data_type);
        out.extend_from_slice(&self.value);
    }
}

/// Serializes `elements` into the raw LTV byte stream, auto-inserting a
/// `FLAGS` element when the set is connectable and discoverable and one
/// isn't already present (choosing limited vs. general discoverable from
/// `duration_ticks`), and patching a `TX_POWER_LEVEL` element's value (if
/// present) to `tx_power`. Returns an error if any element or the total
/// payload is too large for `legacy` mode.
#[allow(clippy::fn_params_excessive_bools)]
pub fn serialize(
    elements: &[GapElement],
    duration_ticks: u32,
    tx_power: i8,
    legacy: bool,
    connectable: bool,
    discoverable: bool,
) -> Result<Vec<u8>> {
    for e in elements {
        if e.value.len() > MAX_ELEMENT_LEN {
            return Err(Error::ElementTooLarge);
        }
    }

    let flags = if duration_ticks != 0 {
        FLAG_LIMITED_DISCOVERABLE
    } else {
        FLAG_GENERAL_DISCOVERABLE
    };
    let has_flags = elements.iter().any(|e| e.data_type == AD_TYPE_FLAGS);

    let mut out = Vec::new();
    if connectable && discoverable && !has_flags {
        GapElement::new(AD_TYPE_FLAGS, vec![flags]).encode_into(&mut out);
    }
    for e in elements {
        if e.data_type == AD_TYPE_TX_POWER_LEVEL {
            #[allow(clippy::cast_sign_loss)]
            GapElement::new(AD_TYPE_TX_POWER_LEVEL, vec![tx_power as u8]).encode_into(&mut out);
        } else {
            e.encode_into(&mut out);
        }
    }

    if legacy && out.len() > LEGACY_MAX_DATA_LEN {
        return Err(Error::DataTooLarge);
    }
    Ok(out)
}

/// Wraps `plaintext` (already-serialized GAP elements) in an
/// `ENCRYPTED_ADVERTISING_DATA` element: `reverse(randomizer) ++ ciphertext
/// ++ mic`, sealed under `km`.
pub fn seal_encrypted(km: &KeyMaterial, plaintext: &[u8]) -> Result<GapElement> {
    let (randomizer, ciphertext, mic) =
        btcore_crypto::seal(km, plaintext).map_err(|_| Error::MissingKeyMaterial)?;
    let mut value = Vec::with_capacity(randomizer.len() + ciphertext.len() + mic.len());
    value.extend(randomizer.iter().rev());
    value.extend_from_slice(&ciphertext);
    value.extend_from_slice(&mic);
    Ok(GapElement::new(AD_TYPE_ENCRYPTED_DATA, value))
}

/// Splits a serialized payload into `(op, bytes)` fragments no larger than
/// a single `LE_Set_Extended_Advertising_Data` command can carry.
#[must_use]
pub fn fragment(data: &[u8]) -> Vec<(AdvDataOp, Vec<u8>)> {
    fragment_adv_data(data, MAX_FRAGMENT_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_inserts_general_discoverable_flags_when_connectable_and_discoverable() {
        let out = serialize(&[], 0, 0, false, true, true).unwrap();
        assert_eq!(out, vec![0x02, AD_TYPE_FLAGS, FLAG_GENERAL_DISCOVERABLE]);
    }

    #[test]
    fn auto_inserts_limited_discoverable_flags_when_duration_set() {
        let out = serialize(&[], 10, 0, false, true, true).unwrap();
        assert_eq!(out, vec![0x02, AD_TYPE_FLAGS, FLAG_LIMITED_DISCOVERABLE]);
    }

    #[test]
    fn omits_flags_for_non_connectable_non_discoverable_broadcaster() {
        let out = serialize(&[], 0, 0, false, false, false).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn does_not_duplicate_explicit_flags_element() {
        let el = GapElement::new(AD_TYPE_FLAGS, vec![0x06]);
        let out = serialize(std::slice::from_ref(&el), 0, 0, false, true, true).unwrap();
        assert_eq!(out, vec![0x02, AD_TYPE_FLAGS, 0x06]);
    }

    #[test]
    fn patches_tx_power_level_value() {
        let el = GapElement::new(AD_TYPE_TX_POWER_LEVEL, vec![0]);
        let out = serialize(&[el], 0, -7, false, true, true).unwrap();
        // flags element, then patched tx power element
        assert_eq!(&out[3..], &[0x02, AD_TYPE_TX_POWER_LEVEL, (-7i8) as u8]);
    }

    #[test]
    fn rejects_oversized_element() {
        let el = GapElement::new(0xFF, vec![0; MAX_ELEMENT_LEN + 1]);
        assert_eq!(
            serialize(&[el], 0, 0, false, true, true),
            Err(Error::ElementTooLarge)
        );
    }

    #[test]
    fn rejects_legacy_payload_over_31_bytes() {
        let el = GapElement::new(0xFF, vec![0; LEGACY_MAX_DATA_LEN]);
        assert_eq!(
            serialize(&[el], 0, 0, true, true, true),
            Err(Error::DataTooLarge)
        );
    }

    #[test]
    fn seal_then_open_round_trips_through_the_wrapper_element() {
        let km = KeyMaterial::generate();
        let plaintext = vec![0x02, 0x01, 0x06, 0x05, 0x09, b'h', b'i', b'!', b'!'];
        let wrapped = seal_encrypted(&km, &plaintext).unwrap();
        assert_eq!(wrapped.data_type, AD_TYPE_ENCRYPTED_DATA);
        let randomizer_len = btcore_crypto::RANDOMIZER_LEN;
        let mic_len = btcore_crypto::MIC_LEN;
        let ciphertext = &wrapped.value[randomizer_len..wrapped.value.len() - mic_len];
        assert_eq!(ciphertext.len(), plaintext.len());
    }
}
