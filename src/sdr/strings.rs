//! Sensor ID string unpacking for the four SDR type/length encodings.

/// Maximum number of raw ID bytes a record may carry.
pub const MAX_ID_LENGTH: usize = 16;

/// Longest string the unpacker will return (6-bit packing expands 3 bytes to 4).
pub const MAX_UNPACKED_LENGTH: usize = MAX_ID_LENGTH * 4 / 3 + 2;

const BCD_PLUS: [u8; 16] = *b"0123456789 -.:,_";

/// ID string encoding, from the top two bits of the type/length byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringEncoding {
    Unicode,
    BcdPlus,
    Packed6Bit,
    Plain,
}

impl StringEncoding {
    pub fn from_type_length(byte: u8) -> Self {
        match byte >> 6 {
            0 => Self::Unicode,
            1 => Self::BcdPlus,
            2 => Self::Packed6Bit,
            _ => Self::Plain,
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            Self::Unicode => 0,
            Self::BcdPlus => 1,
            Self::Packed6Bit => 2,
            Self::Plain => 3,
        }
    }
}

/// Decode `length` raw ID bytes into a printable identifier.
///
/// Never fails: malformed input yields garbage text. Bytes missing from `raw`
/// read as zero. Packed 6-bit input is consumed in whole 3-byte groups, so a
/// `length` that is not a multiple of 3 decodes a few characters past it.
pub fn unpack(raw: &[u8], encoding: StringEncoding, length: usize) -> String {
    let length = length.min(MAX_ID_LENGTH);
    let byte_at = |i: usize| raw.get(i).copied().unwrap_or(0);

    let mut out: Vec<u8> = Vec::with_capacity(MAX_UNPACKED_LENGTH);
    match encoding {
        StringEncoding::Unicode => {
            out.extend((0..length).map(|i| byte_at(i) & 0x7f));
        }
        StringEncoding::BcdPlus => {
            for i in 0..length {
                let b = byte_at(i);
                out.push(BCD_PLUS[usize::from(b >> 4)]);
                out.push(BCD_PLUS[usize::from(b & 0x0f)]);
            }
        }
        StringEncoding::Packed6Bit => {
            let mut i = 0;
            while i < length {
                let (b0, b1, b2) = (byte_at(i), byte_at(i + 1), byte_at(i + 2));
                out.push(b0 & 0x3f);
                out.push((b0 >> 6) | ((b1 & 0x0f) << 2));
                out.push((b1 >> 4) | ((b2 & 0x03) << 4));
                out.push(b2 >> 2);
                i += 3;
            }
            for c in out.iter_mut() {
                *c += 0x20;
            }
        }
        StringEncoding::Plain => {
            out.extend((0..length).map(byte_at));
        }
    }

    if let Some(nul) = out.iter().position(|&c| c == 0) {
        out.truncate(nul);
    }
    out.truncate(MAX_UNPACKED_LENGTH);
    out.into_iter().map(char::from).collect()
}

/// Pack an ASCII string into 6-bit form (3 bytes per 4 characters).
pub fn pack_6bit(text: &str) -> Vec<u8> {
    let chars: Vec<u8> = text
        .bytes()
        .map(|c| c.to_ascii_uppercase().saturating_sub(0x20) & 0x3f)
        .collect();
    let mut out = Vec::with_capacity(chars.len() * 3 / 4 + 3);
    for group in chars.chunks(4) {
        let c = |i: usize| group.get(i).copied().unwrap_or(0);
        out.push(c(0) | (c(1) << 6));
        out.push((c(1) >> 2) | (c(2) << 4));
        out.push((c(2) >> 4) | (c(3) << 2));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_from_type_length_byte() {
        assert_eq!(StringEncoding::from_type_length(0xc8), StringEncoding::Plain);
        assert_eq!(StringEncoding::from_type_length(0x85), StringEncoding::Packed6Bit);
        assert_eq!(StringEncoding::from_type_length(0x43), StringEncoding::BcdPlus);
        assert_eq!(StringEncoding::from_type_length(0x05), StringEncoding::Unicode);
    }

    #[test]
    fn plain_copy() {
        assert_eq!(unpack(b"CPU Temp", StringEncoding::Plain, 8), "CPU Temp");
        assert_eq!(unpack(b"CPU Temp", StringEncoding::Plain, 3), "CPU");
    }

    #[test]
    fn unicode_masks_high_bit() {
        assert_eq!(unpack(&[0xc6, 0x41, 0x4e], StringEncoding::Unicode, 3), "FAN");
    }

    #[test]
    fn bcd_plus_maps_nibbles() {
        assert_eq!(unpack(&[0x12, 0xa3, 0xbc], StringEncoding::BcdPlus, 3), "12 3-.");
    }

    #[test]
    fn packed_6bit_round_trip_for_whole_groups() {
        let packed = pack_6bit("FAN1");
        assert_eq!(packed.len(), 3);
        assert_eq!(unpack(&packed, StringEncoding::Packed6Bit, 3), "FAN1");

        let packed = pack_6bit("SYS TEMP");
        assert_eq!(unpack(&packed, StringEncoding::Packed6Bit, 6), "SYS TEMP");
    }

    #[test]
    fn packed_6bit_runs_past_partial_group() {
        let packed = pack_6bit("VCORE");
        // 2 bytes declared, a full group of 4 characters comes out
        let text = unpack(&packed, StringEncoding::Packed6Bit, 2);
        assert_eq!(text, "VCOR");
    }

    #[test]
    fn output_is_null_free_and_bounded() {
        assert_eq!(unpack(b"AB\0CD", StringEncoding::Plain, 5), "AB");
        let long = [b'x'; 40];
        let text = unpack(&long, StringEncoding::BcdPlus, 40);
        assert!(text.len() <= MAX_UNPACKED_LENGTH);
    }

    #[test]
    fn missing_bytes_never_panic() {
        assert_eq!(unpack(&[], StringEncoding::Plain, 4), "");
        assert_eq!(unpack(&[0x21], StringEncoding::Packed6Bit, 1).len(), 4);
    }
}
