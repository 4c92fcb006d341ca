//! Telemetry surface types: one readout per accepted sensor.

use std::fmt;

use serde::Serialize;

use crate::sdr::{ScaledValue, SensorType};

/// One named entry of the host telemetry namespace (`temp1`, `in3`, ...).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReadout {
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: SensorType,
    #[serde(rename = "sensorNumber")]
    pub sensor_number: u8,
    /// `None` until the first reading arrives.
    pub input: Option<ScaledValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<ScaledValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<ScaledValue>,
    pub status: u8,
    #[serde(rename = "thresholdStatus")]
    pub threshold_status: u8,
    #[serde(rename = "maxWritable")]
    pub max_writable: bool,
    #[serde(rename = "minWritable")]
    pub min_writable: bool,
}

impl fmt::Display for SensorReadout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.name)?;
        match &self.input {
            Some(v) => write!(f, "{}", v)?,
            None => write!(f, "N/A")?,
        }
        match (&self.min, &self.max) {
            (Some(min), Some(max)) => write!(f, " (min {}, max {})", min, max)?,
            (Some(min), None) => write!(f, " (min {})", min)?,
            (None, Some(max)) => write!(f, " (max {})", max)?,
            (None, None) => {}
        }
        write!(f, " \"{}\"", self.label)
    }
}

/// Everything the monitor publishes after a refresh.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SensorSnapshot {
    pub timestamp: String,
    #[serde(rename = "discoveryComplete")]
    pub discovery_complete: bool,
    /// Completed reading passes; 0 until the first one lands.
    pub pass: u64,
    pub sensors: Vec<SensorReadout>,
}
