//! Pure SDR decoding: record layouts, ID strings, conversion, threshold policy.

pub mod convert;
pub mod record;
pub mod strings;
pub mod thresholds;

pub use convert::{convert, sign_extend, Conversion, ScaledValue};
pub use record::{
    decode_reading, decode_sdr, decode_thresholds, encode_compact_sdr, encode_sdr, encode_sdr_with,
    DecodedSdr, RecordFormat, SdrDescriptor, SdrEntry, SensorReading, SensorType, LAST_RECORD,
};
pub use strings::{unpack, StringEncoding};
pub use thresholds::select_thresholds;
