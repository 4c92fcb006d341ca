//! Sensor Data Record and live-reading response decoding.
//!
//! Offsets index a Get SDR response frame: byte 0 is the completion code,
//! bytes 1-2 the next record id, and the record itself starts at byte 3.

use serde::{Deserialize, Serialize};

use crate::errors::DecodeError;
use crate::sdr::convert::{sign_extend, Conversion};
use crate::sdr::strings::{self, StringEncoding, MAX_ID_LENGTH};
use crate::sdr::thresholds;

/// Record id that terminates the SDR directory.
pub const LAST_RECORD: u16 = 0xffff;

/// Bytes before the record body: completion code plus next record id.
pub const FRAME_PREFIX: usize = 3;
/// Record header: id, version, type, remaining length.
pub const RECORD_HEADER: usize = 5;

pub const RECORD_TYPE_FULL: u8 = 0x01;
pub const RECORD_TYPE_COMPACT: u8 = 0x02;
const SDR_VERSION: u8 = 0x51;

const NEXT_ID: usize = 1;
const RECORD_ID: usize = 3;
const VERSION: usize = 5;
const RECORD_TYPE: usize = 6;
const RECORD_LENGTH: usize = 7;
const SENSOR_NUMBER: usize = 10;
const CAPABILITIES: usize = 14;
const SENSOR_TYPE: usize = 15;
const EVENT_TYPE: usize = 16;
const THRESHOLD_MASK: usize = 21;

const FULL_LINEARIZATION: usize = 26;
const FULL_M: usize = 27;
const FULL_B: usize = 29;
const FULL_EXPONENTS: usize = 32;
const FULL_LIMITS: usize = 39;
const FULL_ID_TYPE_LENGTH: usize = 50;

const COMPACT_ID_TYPE_LENGTH: usize = 34;

/// Number of threshold slots a full record carries.
pub const LIMIT_SLOTS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorType {
    Temperature,
    Voltage,
    Current,
    Fan,
    Other,
}

impl SensorType {
    pub fn from_code(code: u8) -> Self {
        match code {
            0x01 => Self::Temperature,
            0x02 => Self::Voltage,
            0x03 => Self::Current,
            0x04 => Self::Fan,
            _ => Self::Other,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Temperature => 0x01,
            Self::Voltage => 0x02,
            Self::Current => 0x03,
            Self::Fan => 0x04,
            Self::Other => 0x00,
        }
    }

    pub fn is_monitored(self) -> bool {
        !matches!(self, Self::Other)
    }

    /// Prefix of the per-type attribute names (`temp1`, `in1`, ...).
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Temperature => "temp",
            Self::Voltage => "in",
            Self::Current => "curr",
            Self::Fan => "fan",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordFormat {
    Full,
    Compact,
}

/// One discovered sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct SdrDescriptor {
    pub record_id: u16,
    pub format: RecordFormat,
    pub sensor_type: SensorType,
    pub sensor_number: u8,
    pub capability_bits: u8,
    pub threshold_mask: u16,
    pub conversion: Conversion,
    pub raw_limits: [u8; LIMIT_SLOTS],
    pub selected_upper: Option<usize>,
    pub selected_lower: Option<usize>,
    pub upper_writable: bool,
    pub lower_writable: bool,
    pub identifier: String,
}

impl SdrDescriptor {
    pub fn new(sensor_type: SensorType, sensor_number: u8, identifier: impl Into<String>) -> Self {
        Self {
            record_id: 0,
            format: RecordFormat::Full,
            sensor_type,
            sensor_number,
            capability_bits: 0,
            threshold_mask: 0,
            conversion: Conversion::IDENTITY,
            raw_limits: [0; LIMIT_SLOTS],
            selected_upper: None,
            selected_lower: None,
            upper_writable: false,
            lower_writable: false,
            identifier: identifier.into(),
        }
    }

    /// Fix the alarm slots; compact records carry no thresholds.
    pub fn select_limits(&mut self) {
        if self.format == RecordFormat::Compact {
            return;
        }
        let (upper, lower) = thresholds::select_thresholds(self.capability_bits, self.threshold_mask);
        let (upper_writable, lower_writable) =
            thresholds::writable_thresholds(self.capability_bits, self.threshold_mask, upper, lower);
        self.selected_upper = upper;
        self.selected_lower = lower;
        self.upper_writable = upper_writable;
        self.lower_writable = lower_writable;
    }

    pub fn thresholds_readable(&self) -> bool {
        self.format == RecordFormat::Full
            && matches!(
                thresholds::threshold_access(self.capability_bits),
                thresholds::ACCESS_READABLE | thresholds::ACCESS_SETTABLE
            )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SdrEntry {
    Sensor(SensorType, SdrDescriptor),
    /// Record not of interest; `record_type` as found in the header.
    Skipped { record_type: u8 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSdr {
    pub next_pointer: u16,
    pub entry: SdrEntry,
}

fn need(bytes: &[u8], needed: usize) -> Result<(), DecodeError> {
    if bytes.len() < needed {
        Err(DecodeError::Truncated { len: bytes.len(), needed })
    } else {
        Ok(())
    }
}

fn le16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

/// Read the next record id of a frame.
pub fn next_pointer(bytes: &[u8]) -> Option<u16> {
    (bytes.len() >= FRAME_PREFIX).then(|| le16(bytes, NEXT_ID))
}

/// Read the id a record carries in its own header.
pub fn record_id(bytes: &[u8]) -> Option<u16> {
    (bytes.len() >= RECORD_ID + 2).then(|| le16(bytes, RECORD_ID))
}

/// Total frame length declared by a record header, once enough bytes are in.
pub fn declared_frame_length(bytes: &[u8]) -> Option<usize> {
    bytes
        .get(RECORD_LENGTH)
        .map(|&len| FRAME_PREFIX + RECORD_HEADER + usize::from(len))
}

fn ten_bit(bytes: &[u8], low: usize) -> i16 {
    let raw = u16::from(bytes[low]) | (u16::from(bytes[low + 1] & 0xc0) << 2);
    sign_extend(raw, 10)
}

fn decode_id(bytes: &[u8], at: usize) -> String {
    let type_length = bytes.get(at).copied().unwrap_or(0);
    let encoding = StringEncoding::from_type_length(type_length);
    let length = usize::from(type_length & 0x1f);
    let raw = bytes.get(at + 1..).unwrap_or(&[]);
    strings::unpack(raw, encoding, length)
}

/// Decode a Get SDR response frame.
pub fn decode_sdr(bytes: &[u8]) -> Result<DecodedSdr, DecodeError> {
    need(bytes, RECORD_TYPE + 1)?;
    let next_pointer = le16(bytes, NEXT_ID);
    let record_type = bytes[RECORD_TYPE];

    let format = match record_type {
        RECORD_TYPE_FULL => RecordFormat::Full,
        RECORD_TYPE_COMPACT => RecordFormat::Compact,
        _ => {
            return Ok(DecodedSdr { next_pointer, entry: SdrEntry::Skipped { record_type } });
        }
    };

    need(bytes, THRESHOLD_MASK + 2)?;
    let sensor_type = SensorType::from_code(bytes[SENSOR_TYPE]);
    if !sensor_type.is_monitored() {
        return Ok(DecodedSdr { next_pointer, entry: SdrEntry::Skipped { record_type } });
    }

    let mut descriptor = SdrDescriptor::new(sensor_type, bytes[SENSOR_NUMBER], String::new());
    descriptor.record_id = le16(bytes, RECORD_ID);
    descriptor.format = format;
    descriptor.capability_bits = bytes[CAPABILITIES];
    descriptor.threshold_mask = le16(bytes, THRESHOLD_MASK);

    match format {
        RecordFormat::Full => {
            need(bytes, FULL_ID_TYPE_LENGTH + 1)?;
            let exponents = bytes[FULL_EXPONENTS];
            descriptor.conversion = Conversion {
                linearity: bytes[FULL_LINEARIZATION] & 0x7f,
                m: ten_bit(bytes, FULL_M),
                b: ten_bit(bytes, FULL_B),
                k1: sign_extend(u16::from(exponents & 0x0f), 4) as i8,
                k2: sign_extend(u16::from(exponents >> 4), 4) as i8,
            };
            descriptor
                .raw_limits
                .copy_from_slice(&bytes[FULL_LIMITS..FULL_LIMITS + LIMIT_SLOTS]);
            descriptor.identifier = decode_id(bytes, FULL_ID_TYPE_LENGTH);
        }
        RecordFormat::Compact => {
            need(bytes, COMPACT_ID_TYPE_LENGTH + 1)?;
            descriptor.identifier = decode_id(bytes, COMPACT_ID_TYPE_LENGTH);
        }
    }

    Ok(DecodedSdr { next_pointer, entry: SdrEntry::Sensor(sensor_type, descriptor) })
}

/// A live sample from Get Sensor Reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SensorReading {
    pub reading: u8,
    pub status: u8,
    pub threshold_status: u8,
}

/// Decode a Get Sensor Reading payload (completion code stripped).
pub fn decode_reading(payload: &[u8]) -> Result<SensorReading, DecodeError> {
    need(payload, 3)?;
    Ok(SensorReading {
        reading: payload[0],
        status: payload[1],
        threshold_status: payload[2],
    })
}

/// Decode a Get Sensor Thresholds payload into `(slot, value)` updates for
/// the thresholds the BMC reports as readable.
pub fn decode_thresholds(payload: &[u8]) -> Result<Vec<(usize, u8)>, DecodeError> {
    need(payload, 7)?;
    let readable = u16::from(payload[0]);
    // response order: LNC, LCR, LNR, UNC, UCR, UNR
    let slots = [
        thresholds::SLOT_LOWER_NON_CRITICAL,
        thresholds::SLOT_LOWER_CRITICAL,
        thresholds::SLOT_LOWER_NON_RECOVERABLE,
        thresholds::SLOT_UPPER_NON_CRITICAL,
        thresholds::SLOT_UPPER_CRITICAL,
        thresholds::SLOT_UPPER_NON_RECOVERABLE,
    ];
    Ok(slots
        .iter()
        .enumerate()
        .filter(|(bit, _)| readable & (1 << bit) != 0)
        .map(|(bit, &slot)| (slot, payload[1 + bit]))
        .collect())
}

fn encode_id(identifier: &str, encoding: StringEncoding) -> (u8, Vec<u8>) {
    let mut raw = match encoding {
        StringEncoding::Packed6Bit => strings::pack_6bit(identifier),
        _ => identifier.bytes().collect(),
    };
    raw.truncate(MAX_ID_LENGTH);
    let type_length = (encoding.bits() << 6) | raw.len() as u8;
    (type_length, raw)
}

fn frame_header(frame: &mut [u8], descriptor: &SdrDescriptor, record_type: u8, next: u16) {
    frame[NEXT_ID..NEXT_ID + 2].copy_from_slice(&next.to_le_bytes());
    frame[RECORD_ID..RECORD_ID + 2].copy_from_slice(&descriptor.record_id.to_le_bytes());
    frame[VERSION] = SDR_VERSION;
    frame[RECORD_TYPE] = record_type;
    frame[RECORD_LENGTH] = (frame.len() - FRAME_PREFIX - RECORD_HEADER) as u8;
    frame[SENSOR_NUMBER] = descriptor.sensor_number;
    frame[CAPABILITIES] = descriptor.capability_bits;
    frame[SENSOR_TYPE] = descriptor.sensor_type.code();
    // threshold-based event/reading type
    frame[EVENT_TYPE] = 0x01;
    frame[THRESHOLD_MASK..THRESHOLD_MASK + 2].copy_from_slice(&descriptor.threshold_mask.to_le_bytes());
}

/// Encode a descriptor as a full-record Get SDR response frame.
pub fn encode_sdr(descriptor: &SdrDescriptor, next: u16) -> Vec<u8> {
    encode_sdr_with(descriptor, next, StringEncoding::Plain)
}

pub fn encode_sdr_with(descriptor: &SdrDescriptor, next: u16, encoding: StringEncoding) -> Vec<u8> {
    let (type_length, id) = encode_id(&descriptor.identifier, encoding);
    let mut frame = vec![0u8; FULL_ID_TYPE_LENGTH + 1 + id.len()];
    frame_header(&mut frame, descriptor, RECORD_TYPE_FULL, next);

    let c = &descriptor.conversion;
    let m = c.m as u16 & 0x3ff;
    let b = c.b as u16 & 0x3ff;
    frame[FULL_LINEARIZATION] = c.linearity & 0x7f;
    frame[FULL_M] = m as u8;
    frame[FULL_M + 1] = ((m >> 2) & 0xc0) as u8;
    frame[FULL_B] = b as u8;
    frame[FULL_B + 1] = ((b >> 2) & 0xc0) as u8;
    frame[FULL_EXPONENTS] = ((c.k2 as u8 & 0x0f) << 4) | (c.k1 as u8 & 0x0f);
    frame[FULL_LIMITS..FULL_LIMITS + LIMIT_SLOTS].copy_from_slice(&descriptor.raw_limits);
    frame[FULL_ID_TYPE_LENGTH] = type_length;
    frame[FULL_ID_TYPE_LENGTH + 1..].copy_from_slice(&id);
    frame
}

/// Encode a descriptor as a compact-record frame (no conversion, no limits).
pub fn encode_compact_sdr(descriptor: &SdrDescriptor, next: u16, encoding: StringEncoding) -> Vec<u8> {
    let (type_length, id) = encode_id(&descriptor.identifier, encoding);
    let mut frame = vec![0u8; COMPACT_ID_TYPE_LENGTH + 1 + id.len()];
    frame_header(&mut frame, descriptor, RECORD_TYPE_COMPACT, next);
    frame[COMPACT_ID_TYPE_LENGTH] = type_length;
    frame[COMPACT_ID_TYPE_LENGTH + 1..].copy_from_slice(&id);
    frame
}
