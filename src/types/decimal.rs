//! Fixed-precision decimal values backed by a 128-bit unscaled integer.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A fixed-precision decimal value.
///
/// The stored form is an unscaled integer; the logical value is
/// `unscaled * 10^(-scale)`. Precision bounds the total number of digits
/// and is carried for diagnostics, not enforced arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Decimal {
    unscaled: i128,
    precision: u8,
    scale: u8,
}

impl Decimal {
    /// Creates a decimal from its unscaled backing integer.
    #[must_use]
    pub fn new(unscaled: i128, precision: u8, scale: u8) -> Self {
        Decimal {
            unscaled,
            precision,
            scale,
        }
    }

    /// Returns the unscaled backing integer.
    #[must_use]
    pub fn unscaled(&self) -> i128 {
        self.unscaled
    }

    /// Returns the declared precision.
    #[must_use]
    pub fn precision(&self) -> u8 {
        self.precision
    }

    /// Returns the declared scale.
    #[must_use]
    pub fn scale(&self) -> u8 {
        self.scale
    }

    /// Returns the value as an f64 approximation.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_f64(&self) -> f64 {
        self.unscaled as f64 / 10f64.powi(i32::from(self.scale))
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale == 0 {
            return write!(f, "{}", self.unscaled);
        }
        let negative = self.unscaled < 0;
        let digits = self.unscaled.unsigned_abs().to_string();
        let scale = self.scale as usize;
        let (int_part, frac_part) = if digits.len() > scale {
            let split = digits.len() - scale;
            (digits[..split].to_string(), digits[split..].to_string())
        } else {
            ("0".to_string(), format!("{digits:0>scale$}"))
        };
        let sign = if negative { "-" } else { "" };
        write!(f, "{sign}{int_part}.{frac_part}")
    }
}
