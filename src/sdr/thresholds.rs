//! Threshold slot selection for the upper and lower alarm limits.
//!
//! `raw_limits` slots, in record order:
//! 0 upper non-recoverable, 1 upper critical, 2 upper non-critical,
//! 3 lower non-recoverable, 4 lower critical, 5 lower non-critical,
//! 6 positive-going hysteresis, 7 negative-going hysteresis.

pub const SLOT_UPPER_NON_RECOVERABLE: usize = 0;
pub const SLOT_UPPER_CRITICAL: usize = 1;
pub const SLOT_UPPER_NON_CRITICAL: usize = 2;
pub const SLOT_LOWER_NON_RECOVERABLE: usize = 3;
pub const SLOT_LOWER_CRITICAL: usize = 4;
pub const SLOT_LOWER_NON_CRITICAL: usize = 5;
pub const SLOT_POSITIVE_HYSTERESIS: usize = 6;
pub const SLOT_NEGATIVE_HYSTERESIS: usize = 7;

// Readable-threshold mask bits (low byte); settable bits sit 8 higher.
pub const MASK_LOWER_NON_CRITICAL: u16 = 1 << 0;
pub const MASK_LOWER_CRITICAL: u16 = 1 << 1;
pub const MASK_LOWER_NON_RECOVERABLE: u16 = 1 << 2;
pub const MASK_UPPER_NON_CRITICAL: u16 = 1 << 3;
pub const MASK_UPPER_CRITICAL: u16 = 1 << 4;
pub const MASK_UPPER_NON_RECOVERABLE: u16 = 1 << 5;
const SETTABLE_SHIFT: u32 = 8;

// Capability sub-field values (hysteresis bits 5:4, threshold access bits 3:2).
pub const ACCESS_NONE: u8 = 0b00;
pub const ACCESS_READABLE: u8 = 0b01;
pub const ACCESS_SETTABLE: u8 = 0b10;
pub const ACCESS_FIXED: u8 = 0b11;

const UPPER_PREFERENCE: [(usize, u16); 3] = [
    (SLOT_UPPER_CRITICAL, MASK_UPPER_CRITICAL),
    (SLOT_UPPER_NON_RECOVERABLE, MASK_UPPER_NON_RECOVERABLE),
    (SLOT_UPPER_NON_CRITICAL, MASK_UPPER_NON_CRITICAL),
];

const LOWER_PREFERENCE: [(usize, u16); 3] = [
    (SLOT_LOWER_CRITICAL, MASK_LOWER_CRITICAL),
    (SLOT_LOWER_NON_RECOVERABLE, MASK_LOWER_NON_RECOVERABLE),
    (SLOT_LOWER_NON_CRITICAL, MASK_LOWER_NON_CRITICAL),
];

pub fn threshold_access(capability_bits: u8) -> u8 {
    (capability_bits >> 2) & 0b11
}

pub fn hysteresis_access(capability_bits: u8) -> u8 {
    (capability_bits >> 4) & 0b11
}

fn is_readable(access: u8) -> bool {
    access == ACCESS_READABLE || access == ACCESS_SETTABLE
}

/// Build a capability byte from hysteresis and threshold access values.
pub fn capabilities(hysteresis: u8, thresholds: u8) -> u8 {
    ((hysteresis & 0b11) << 4) | ((thresholds & 0b11) << 2)
}

/// Mask bit for a numeric threshold slot, `None` for the hysteresis slots.
pub fn mask_bit(slot: usize) -> Option<u16> {
    UPPER_PREFERENCE
        .iter()
        .chain(LOWER_PREFERENCE.iter())
        .find(|(s, _)| *s == slot)
        .map(|(_, bit)| *bit)
}

/// Pick the `raw_limits` slots used as the upper and lower alarm limits.
///
/// Upper: critical, then non-recoverable, then non-critical. Lower: the
/// negative-going hysteresis slot when hysteresis is readable, otherwise the
/// same order over the lower triplet. Numeric thresholds need readable access
/// and their mask bit.
pub fn select_thresholds(capability_bits: u8, threshold_mask: u16) -> (Option<usize>, Option<usize>) {
    let readable = is_readable(threshold_access(capability_bits));
    let pick = |order: &[(usize, u16); 3]| {
        if !readable {
            return None;
        }
        order
            .iter()
            .find(|(_, bit)| threshold_mask & bit != 0)
            .map(|(slot, _)| *slot)
    };

    let upper = pick(&UPPER_PREFERENCE);
    let lower = if is_readable(hysteresis_access(capability_bits)) {
        Some(SLOT_NEGATIVE_HYSTERESIS)
    } else {
        pick(&LOWER_PREFERENCE)
    };

    (upper, lower)
}

/// Whether the selected slots could be written back.
pub fn writable_thresholds(
    capability_bits: u8,
    threshold_mask: u16,
    upper: Option<usize>,
    lower: Option<usize>,
) -> (bool, bool) {
    let settable = |slot: Option<usize>| match slot {
        Some(SLOT_POSITIVE_HYSTERESIS) | Some(SLOT_NEGATIVE_HYSTERESIS) => {
            hysteresis_access(capability_bits) == ACCESS_SETTABLE
        }
        Some(slot) => {
            threshold_access(capability_bits) == ACCESS_SETTABLE
                && mask_bit(slot).is_some_and(|bit| threshold_mask & (bit << SETTABLE_SHIFT) != 0)
        }
        None => false,
    };
    (settable(upper), settable(lower))
}
