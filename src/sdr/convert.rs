//! Linear conversion of raw sensor bytes: `y = (m·x + b·10^k1) · 10^k2`.

use std::fmt;

use serde::{Serialize, Serializer};

/// Sign-extend the low `bits` bits of `value` to a full `i16`.
pub fn sign_extend(value: u16, bits: u32) -> i16 {
    let mask = (1u16 << bits) - 1;
    let value = value & mask;
    if value & (1 << (bits - 1)) != 0 {
        (value | !mask) as i16
    } else {
        value as i16
    }
}

/// Conversion factors carried by a full sensor record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conversion {
    /// Linearisation selector, low 7 bits of the record byte.
    pub linearity: u8,
    pub m: i16,
    pub b: i16,
    /// B exponent.
    pub k1: i8,
    /// Result exponent.
    pub k2: i8,
}

impl Conversion {
    /// Identity conversion used for compact records.
    pub const IDENTITY: Self = Self { linearity: 0, m: 1, b: 0, k1: 0, k2: 0 };

    pub fn apply(&self, raw: u8) -> ScaledValue {
        let (raw, decimals) = convert(raw, self.m, self.b, self.k1, self.k2);
        ScaledValue { raw, decimals }
    }
}

impl Default for Conversion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Apply the scaling law to a raw sample.
///
/// Returns the scaled integer and the number of decimal places it carries,
/// so the true value is `scaled / 10^decimal_places`. A negative `k2` only
/// contributes decimal places; it is never applied to the integer itself.
pub fn convert(raw: u8, m: i16, b: i16, k1: i8, k2: i8) -> (i64, u8) {
    let decimals = if k2 >= 0 { 0 } else { k2.unsigned_abs() };

    let mut result = i64::from(raw) * i64::from(m);
    if k1 >= 0 {
        result += i64::from(b) * 10i64.pow(u32::from(k1.unsigned_abs()));
    } else {
        result += i64::from(b) / 10i64.pow(u32::from(k1.unsigned_abs()));
    }
    if k2 >= 0 {
        result *= 10i64.pow(u32::from(k2.unsigned_abs()));
    }

    (result, decimals)
}

/// A converted value with its decimal point position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaledValue {
    pub raw: i64,
    pub decimals: u8,
}

impl ScaledValue {
    pub fn as_f64(&self) -> f64 {
        self.raw as f64 / 10f64.powi(i32::from(self.decimals))
    }
}

impl fmt::Display for ScaledValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.decimals == 0 {
            return write!(f, "{}", self.raw);
        }
        let scale = 10i64.pow(u32::from(self.decimals));
        let sign = if self.raw < 0 { "-" } else { "" };
        let abs = self.raw.unsigned_abs();
        write!(
            f,
            "{}{}.{:0width$}",
            sign,
            abs / scale as u64,
            abs % scale as u64,
            width = usize::from(self.decimals)
        )
    }
}

impl Serialize for ScaledValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}
