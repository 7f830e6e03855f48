//! Encrypted advertising data sealing ([Vol 3] Part C, Section 11).
//!
//! Advertising payloads may be authenticated and encrypted with AES-128-CCM
//! before being written to the controller. The plaintext, key material, and
//! randomizer all live with the advertising set; this crate only implements
//! the symmetric transform.

#![forbid(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(unused_crate_dependencies)]

use aes::Aes128;
use ccm::aead::generic_array::GenericArray;
use ccm::aead::{AeadInPlace, KeyInit};
use ccm::consts::{U13, U4};
use ccm::Ccm;
use rand::RngCore;

/// `AES-128-CCM` with a 4-byte MIC and 13-byte nonce, as used by the
/// encrypted advertising data feature.
type AdvCcm = Ccm<Aes128, U4, U13>;

/// Length of the AES-128 key.
pub const KEY_LEN: usize = 16;
/// Length of the stored IV half of the key material.
pub const IV_LEN: usize = 16;
/// Length of the per-seal randomizer.
pub const RANDOMIZER_LEN: usize = 5;
/// Length of the message integrity check appended to the ciphertext.
pub const MIC_LEN: usize = 4;
/// Length of the key material blob persisted to storage
/// (`BTIF_STORAGE_KEY_ENCR_DATA`): 16-byte key followed by 16-byte IV.
pub const KEY_MATERIAL_LEN: usize = KEY_LEN + IV_LEN;

const NONCE_LEN: usize = 13;
/// Additional authenticated data byte prepended to every seal/open call.
const ADDITIONAL_DATA: [u8; 1] = [0xEA];

/// Errors produced by sealing or opening an encrypted advertising payload.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    /// AES-128-CCM encryption failed (should not happen for well-formed input).
    #[error("advertising data encryption failed")]
    Seal,
    /// AES-128-CCM decryption or authentication failed.
    #[error("advertising data decryption or authentication failed")]
    Open,
}

/// `Result` alias for this crate's fallible operations.
pub type Result<T> = std::result::Result<T, Error>;

/// 16-byte key and 16-byte IV pair loaded from or destined for
/// `BTIF_STORAGE_KEY_ENCR_DATA`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct KeyMaterial {
    key: [u8; KEY_LEN],
    iv: [u8; IV_LEN],
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial").finish_non_exhaustive()
    }
}

impl KeyMaterial {
    /// Splits a 32-byte storage blob into key and IV halves.
    #[inline]
    #[must_use]
    pub fn from_bytes(v: &[u8; KEY_MATERIAL_LEN]) -> Self {
        let mut key = [0; KEY_LEN];
        let mut iv = [0; IV_LEN];
        key.copy_from_slice(&v[..KEY_LEN]);
        iv.copy_from_slice(&v[KEY_LEN..]);
        Self { key, iv }
    }

    /// Generates fresh, random key material (used when provisioning a new
    /// encrypted advertiser and no stored material exists).
    #[must_use]
    pub fn generate() -> Self {
        let mut key = [0; KEY_LEN];
        let mut iv = [0; IV_LEN];
        let mut rng = rand::thread_rng();
        rng.fill_bytes(&mut key);
        rng.fill_bytes(&mut iv);
        Self { key, iv }
    }

    /// Joins key and IV back into the 32-byte storage blob.
    #[inline]
    #[must_use]
    pub fn to_bytes(self) -> [u8; KEY_MATERIAL_LEN] {
        let mut v = [0; KEY_MATERIAL_LEN];
        v[..KEY_LEN].copy_from_slice(&self.key);
        v[KEY_LEN..].copy_from_slice(&self.iv);
        v
    }
}

/// Generates a fresh 5-byte randomizer. Callers must mint a new one before
/// every [`seal`] call; reusing a randomizer with the same key breaks
/// CCM's authentication guarantee.
#[inline]
#[must_use]
pub fn random_randomizer() -> [u8; RANDOMIZER_LEN] {
    let mut r = [0; RANDOMIZER_LEN];
    rand::thread_rng().fill_bytes(&mut r);
    r
}

/// `nonce := reverse(randomizer) ++ reverse(iv[8..16])`, 13 bytes.
fn nonce(randomizer: &[u8; RANDOMIZER_LEN], iv: &[u8; IV_LEN]) -> GenericArray<u8, U13> {
    let mut n = [0_u8; NONCE_LEN];
    for (i, &b) in randomizer.iter().rev().enumerate() {
        n[i] = b;
    }
    for (i, &b) in iv[IV_LEN / 2..].iter().rev().enumerate() {
        n[RANDOMIZER_LEN + i] = b;
    }
    GenericArray::from(n)
}

/// Encrypts `plaintext` (the concatenated `type ++ value` bytes of one or
/// more GAP data elements, with no length prefixes) under `km.key`, using a
/// freshly generated randomizer, and returns
/// `(randomizer, ciphertext, mic)`. `ciphertext` has the same length as
/// `plaintext`; `mic` is always [`MIC_LEN`] bytes.
///
/// A fresh randomizer is minted internally on every call, matching the
/// requirement that the randomizer is regenerated before every seal.
pub fn seal(
    km: &KeyMaterial,
    plaintext: &[u8],
) -> Result<([u8; RANDOMIZER_LEN], Vec<u8>, [u8; MIC_LEN])> {
    let randomizer = random_randomizer();
    let cipher =
        AdvCcm::new_from_slice(&km.key).map_err(|_| Error::Seal)?;
    let mut buf = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(&nonce(&randomizer, &km.iv), &ADDITIONAL_DATA, &mut buf)
        .map_err(|_| Error::Seal)?;
    let mut mic = [0; MIC_LEN];
    mic.copy_from_slice(tag.as_slice());
    Ok((randomizer, buf, mic))
}

/// Inverse of [`seal`]: verifies the MIC and decrypts `ciphertext` in place,
/// returning the plaintext. Fails if the MIC does not validate.
pub fn open(
    km: &KeyMaterial,
    randomizer: &[u8; RANDOMIZER_LEN],
    ciphertext: &[u8],
    mic: &[u8; MIC_LEN],
) -> Result<Vec<u8>> {
    let cipher = AdvCcm::new_from_slice(&km.key).map_err(|_| Error::Open)?;
    let mut buf = ciphertext.to_vec();
    let tag = GenericArray::from_slice(mic);
    cipher
        .decrypt_in_place_detached(&nonce(randomizer, &km.iv), &ADDITIONAL_DATA, &mut buf, tag)
        .map_err(|_| Error::Open)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_round_trip() {
        let km = KeyMaterial::generate();
        let plaintext = [0xFFu8, 0xBE, 0xEF];
        let (randomizer, ciphertext, mic) = seal(&km, &plaintext).unwrap();
        assert_eq!(ciphertext.len(), plaintext.len());
        assert_ne!(ciphertext, plaintext, "CCM keystream should not be all-zero");
        let opened = open(&km, &randomizer, &ciphertext, &mic).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn open_rejects_tampered_ciphertext() {
        let km = KeyMaterial::generate();
        let (randomizer, mut ciphertext, mic) = seal(&km, &[1, 2, 3, 4]).unwrap();
        ciphertext[0] ^= 0xFF;
        assert!(open(&km, &randomizer, &ciphertext, &mic).is_err());
    }

    #[test]
    fn open_rejects_wrong_randomizer() {
        let km = KeyMaterial::generate();
        let (mut randomizer, ciphertext, mic) = seal(&km, &[9, 9, 9]).unwrap();
        randomizer[0] ^= 0x01;
        assert!(open(&km, &randomizer, &ciphertext, &mic).is_err());
    }

    #[test]
    fn fresh_randomizer_each_seal() {
        let km = KeyMaterial::generate();
        let (r1, _, _) = seal(&km, &[1]).unwrap();
        let (r2, _, _) = seal(&km, &[1]).unwrap();
        assert_ne!(r1, r2);
    }

    #[test]
    fn key_material_round_trips_through_storage_blob() {
        let km = KeyMaterial::generate();
        let blob = km.to_bytes();
        let restored = KeyMaterial::from_bytes(&blob);
        assert_eq!(km, restored);
    }
}
