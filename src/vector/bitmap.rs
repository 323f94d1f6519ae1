//! Validity bitmap tracking value presence per row.

use serde::{Deserialize, Serialize};

/// One bit per row marking presence (1) or absence (0) of a value.
///
/// Bits are LSB-packed: row `i` lives at bit `i % 8` of byte `i / 8`.
/// An absent bitmap means every row is valid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityBitmap {
    bits: Option<Vec<u8>>,
}

impl ValidityBitmap {
    /// Creates a bitmap where every row is valid.
    #[must_use]
    pub fn all_valid() -> Self {
        ValidityBitmap { bits: None }
    }

    /// Creates a bitmap from raw LSB-packed bytes.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        ValidityBitmap { bits: Some(bytes) }
    }

    /// Creates a bitmap from per-row validity flags.
    #[must_use]
    pub fn from_bools(valid: &[bool]) -> Self {
        if valid.iter().all(|v| *v) {
            return ValidityBitmap::all_valid();
        }
        let mut bytes = vec![0u8; valid.len().div_ceil(8)];
        for (i, v) in valid.iter().enumerate() {
            if *v {
                bytes[i / 8] |= 1 << (i % 8);
            }
        }
        ValidityBitmap { bits: Some(bytes) }
    }

    /// Returns true if the row holds a value.
    ///
    /// Rows beyond the backing byte range are reported as absent.
    #[must_use]
    pub fn is_valid(&self, row: usize) -> bool {
        match &self.bits {
            None => true,
            Some(bytes) => bytes
                .get(row / 8)
                .is_some_and(|byte| byte >> (row % 8) & 1 == 1),
        }
    }

    /// Counts the invalid rows among the first `rows` entries.
    #[must_use]
    pub fn count_invalid(&self, rows: usize) -> usize {
        match &self.bits {
            None => 0,
            Some(_) => (0..rows).filter(|&i| !self.is_valid(i)).count(),
        }
    }

    /// Releases the backing bytes.
    pub fn clear(&mut self) {
        self.bits = None;
    }
}
