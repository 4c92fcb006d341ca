//! Serde structs for BMC fixture profiles used by the simulated BMC.
//! A profile describes an SDR repository plus the live values behind it.

use serde::{Deserialize, Serialize};

use crate::sdr::record::{RecordFormat, SensorType, LIMIT_SLOTS};
use crate::sdr::strings::StringEncoding;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BmcFixture {
    pub metadata: Metadata,
    /// Largest record slice one Get SDR response may carry before the BMC
    /// answers "cannot return requested number of bytes".
    #[serde(default = "default_max_transfer")]
    pub max_transfer: usize,
    #[serde(default = "default_reservation_id")]
    pub reservation_id: u16,
    /// Completion code forced onto Reserve SDR Repository.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserve_completion: Option<u8>,
    pub sensors: Vec<FixtureSensor>,
    /// Raw records (header included) served between the sensors, e.g. OEM records.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_records: Vec<Vec<u8>>,
}

pub fn default_max_transfer() -> usize { 255 }
pub fn default_reservation_id() -> u16 { 0x0001 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub vendor: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdEncoding {
    Plain,
    Packed6,
}

impl From<IdEncoding> for StringEncoding {
    fn from(encoding: IdEncoding) -> Self {
        match encoding {
            IdEncoding::Plain => StringEncoding::Plain,
            IdEncoding::Packed6 => StringEncoding::Packed6Bit,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureSensor {
    pub name: String,
    pub kind: SensorType,
    pub number: u8,
    #[serde(default = "default_record")]
    pub record: RecordFormat,
    #[serde(default = "default_m")]
    pub m: i16,
    #[serde(default)]
    pub b: i16,
    #[serde(default)]
    pub k1: i8,
    #[serde(default)]
    pub k2: i8,
    #[serde(default)]
    pub capabilities: u8,
    #[serde(default)]
    pub threshold_mask: u16,
    #[serde(default)]
    pub limits: [u8; LIMIT_SLOTS],
    #[serde(default)]
    pub reading: u8,
    #[serde(default = "default_status")]
    pub status: u8,
    #[serde(default)]
    pub threshold_status: u8,
    #[serde(default = "default_id_encoding")]
    pub id_encoding: IdEncoding,
    /// Completion code forced onto Get Sensor Reading for this sensor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reading_completion: Option<u8>,
}

pub fn default_record() -> RecordFormat { RecordFormat::Full }
pub fn default_m() -> i16 { 1 }
/// Event messages and scanning enabled.
pub fn default_status() -> u8 { 0xc0 }
pub fn default_id_encoding() -> IdEncoding { IdEncoding::Plain }

impl BmcFixture {
    pub fn new(vendor: impl Into<String>, sensors: Vec<FixtureSensor>) -> Self {
        Self {
            metadata: Metadata { vendor: vendor.into(), description: None },
            max_transfer: default_max_transfer(),
            reservation_id: default_reservation_id(),
            reserve_completion: None,
            sensors,
            extra_records: Vec::new(),
        }
    }
}

impl FixtureSensor {
    /// Full record, identity conversion, no thresholds.
    pub fn new(name: impl Into<String>, kind: SensorType, number: u8) -> Self {
        Self {
            name: name.into(),
            kind,
            number,
            record: default_record(),
            m: default_m(),
            b: 0,
            k1: 0,
            k2: 0,
            capabilities: 0,
            threshold_mask: 0,
            limits: [0; LIMIT_SLOTS],
            reading: 0,
            status: default_status(),
            threshold_status: 0,
            id_encoding: default_id_encoding(),
            reading_completion: None,
        }
    }
}
