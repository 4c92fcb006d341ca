//! Monitor configuration structs and defaults.

use serde::{Deserialize, Serialize};

use crate::sdr::SensorType;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub endpoint: EndpointSettings,
    pub discovery: DiscoverySettings,
    pub registry: RegistrySettings,
    pub reading: ReadingSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointKind {
    /// Local or LAN BMC through `ipmitool raw`.
    Ipmitool,
    /// In-process simulated BMC driven by a fixture profile.
    Emulator,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointSettings {
    pub kind: EndpointKind,
    pub fixture: Option<String>,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self { kind: EndpointKind::Ipmitool, fixture: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySettings {
    /// Get SDR byte count to start with; 255 reads whole records.
    pub max_chunk_size: u8,
    /// Discovery is abandoned when halving would go below this.
    pub min_chunk_size: u8,
    /// Re-reservations allowed after the BMC cancels ours mid-scan.
    pub max_reservation_retries: u32,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self { max_chunk_size: 0xff, min_chunk_size: 8, max_reservation_retries: 3 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    pub max_sensors: usize,
    pub max_temperature: usize,
    pub max_voltage: usize,
    pub max_current: usize,
    pub max_fan: usize,
}

impl RegistrySettings {
    pub fn cap_for(&self, kind: SensorType) -> usize {
        match kind {
            SensorType::Temperature => self.max_temperature,
            SensorType::Voltage => self.max_voltage,
            SensorType::Current => self.max_current,
            SensorType::Fan => self.max_fan,
            SensorType::Other => 0,
        }
    }
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self { max_sensors: 50, max_temperature: 16, max_voltage: 16, max_current: 8, max_fan: 16 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadingSettings {
    /// A full refresh younger than this is served from cache.
    pub staleness_ms: u64,
    pub tick_interval_ms: u64,
    /// Follow each reading with Get Sensor Thresholds.
    pub refresh_thresholds: bool,
}

impl Default for ReadingSettings {
    fn default() -> Self {
        Self { staleness_ms: 3000, tick_interval_ms: 1000, refresh_thresholds: false }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}
