//! CryptoPAn prefix-preserving address anonymization
//!
//! Implements the Xu/Fan/Ammar/Moon construction: a keyed AES-128 block
//! cipher drives a per-bit one-time pad such that two addresses sharing a
//! k-bit prefix map to pseudonyms sharing a k-bit prefix.
//!
//! The 32-byte key splits in half: the first 16 bytes key the cipher, the
//! second 16 bytes are encrypted once to form the pad block. After
//! construction the anonymizer is immutable and safe to share across the
//! worker pool.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes128;

/// Length of the raw CryptoPAn key
pub const KEY_LEN: usize = 32;

/// Prefix-preserving address anonymizer
pub struct Anonymizer {
    cipher: Aes128,
    pad: [u8; 16],
}

impl Anonymizer {
    /// Build an anonymizer from a 32-byte CryptoPAn key
    pub fn with_key(key: &[u8; KEY_LEN]) -> Self {
        let cipher = Aes128::new(GenericArray::from_slice(&key[..16]));

        let mut pad = GenericArray::clone_from_slice(&key[16..]);
        cipher.encrypt_block(&mut pad);

        let mut pad_bytes = [0u8; 16];
        pad_bytes.copy_from_slice(&pad);

        Self {
            cipher,
            pad: pad_bytes,
        }
    }

    fn encrypt(&self, input: [u8; 16]) -> [u8; 16] {
        let mut block = GenericArray::clone_from_slice(&input);
        self.cipher.encrypt_block(&mut block);
        let mut out = [0u8; 16];
        out.copy_from_slice(&block);
        out
    }

    /// Anonymize a 32-bit IPv4 address
    ///
    /// For each bit position the cipher input is the original address
    /// truncated to the bits above that position, padded out with the pad
    /// block. The high bit of each ciphertext forms the one-time pad.
    pub fn anon4(&self, addr: u32) -> u32 {
        let pad4 = u32::from_be_bytes([self.pad[0], self.pad[1], self.pad[2], self.pad[3]]);

        let mut otp = 0u32;
        for pos in 0..32u32 {
            // pos == 0 would shift by the full word width
            let input4 = if pos == 0 {
                pad4
            } else {
                ((addr >> (32 - pos)) << (32 - pos)) | ((pad4 << pos) >> pos)
            };

            let mut block = self.pad;
            block[..4].copy_from_slice(&input4.to_be_bytes());

            let out = self.encrypt(block);
            otp |= ((out[0] >> 7) as u32) << (31 - pos);
        }

        otp ^ addr
    }

    /// Anonymize a 128-bit IPv6 address given as `[high, low]` 64-bit words
    pub fn anon6(&self, addr: [u64; 2]) -> [u64; 2] {
        let orig = ((addr[0] as u128) << 64) | addr[1] as u128;
        let pad = u128::from_be_bytes(self.pad);

        let mut otp = 0u128;
        for pos in 0..128u32 {
            let input = if pos == 0 {
                pad
            } else {
                ((orig >> (128 - pos)) << (128 - pos)) | ((pad << pos) >> pos)
            };

            let out = self.encrypt(input.to_be_bytes());
            otp |= ((out[0] >> 7) as u128) << (127 - pos);
        }

        let result = orig ^ otp;
        [(result >> 64) as u64, result as u64]
    }
}
