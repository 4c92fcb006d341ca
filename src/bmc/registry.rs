//! Bounded, typed collection of accepted sensors and their live samples.

use std::time::Instant;

use tracing::debug;

use crate::config::types::RegistrySettings;
use crate::hardware::types::SensorReadout;
use crate::sdr::record::{SdrDescriptor, SensorReading, SensorType, LIMIT_SLOTS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub reading: SensorReading,
    pub read_at: Instant,
}

#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub descriptor: SdrDescriptor,
    /// Per-type name, e.g. `fan2`; 1-based in insertion order.
    pub name: String,
    pub sample: Option<Sample>,
}

#[derive(Debug, Clone)]
pub struct Registry {
    entries: Vec<RegistryEntry>,
    limits: RegistrySettings,
    published: bool,
}

impl Registry {
    pub fn new(limits: RegistrySettings) -> Self {
        let capacity = limits.max_sensors.min(256);
        Self { entries: Vec::with_capacity(capacity), limits, published: false }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count(&self, kind: SensorType) -> usize {
        self.entries.iter().filter(|e| e.descriptor.sensor_type == kind).count()
    }

    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&RegistryEntry> {
        self.entries.get(index)
    }

    /// Append a sensor if both its type and the registry have room.
    ///
    /// Returns `false` when the sensor was dropped.
    pub fn try_insert(&mut self, descriptor: SdrDescriptor) -> bool {
        let kind = descriptor.sensor_type;
        if self.entries.len() >= self.limits.max_sensors {
            debug!("Registry full ({}), dropping {:?}", self.limits.max_sensors, descriptor.identifier);
            return false;
        }
        let count = self.count(kind);
        if count >= self.limits.cap_for(kind) {
            debug!("No room for another {:?} sensor, dropping {:?}", kind, descriptor.identifier);
            return false;
        }
        self.entries.push(RegistryEntry {
            name: format!("{}{}", kind.prefix(), count + 1),
            descriptor,
            sample: None,
        });
        true
    }

    /// Fix threshold selection for every entry and expose the table.
    pub fn publish(&mut self) {
        for entry in &mut self.entries {
            entry.descriptor.select_limits();
        }
        self.published = true;
    }

    pub fn record_sample(&mut self, index: usize, reading: SensorReading, now: Instant) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.sample = Some(Sample { reading, read_at: now });
        }
    }

    pub fn update_limits(&mut self, index: usize, updates: &[(usize, u8)]) {
        if let Some(entry) = self.entries.get_mut(index) {
            for &(slot, value) in updates {
                if slot < LIMIT_SLOTS {
                    entry.descriptor.raw_limits[slot] = value;
                }
            }
        }
    }

    /// The host-visible sensor table; empty until discovery has published it.
    pub fn surface(&self) -> Vec<SensorReadout> {
        if !self.published {
            return Vec::new();
        }
        self.entries.iter().map(readout).collect()
    }
}

fn readout(entry: &RegistryEntry) -> SensorReadout {
    let d = &entry.descriptor;
    let limit = |slot: Option<usize>| slot.map(|s| d.conversion.apply(d.raw_limits[s]));
    let reading = entry.sample.map(|s| s.reading).unwrap_or_default();

    SensorReadout {
        name: entry.name.clone(),
        label: d.identifier.clone(),
        kind: d.sensor_type,
        sensor_number: d.sensor_number,
        input: entry.sample.map(|s| d.conversion.apply(s.reading.reading)),
        max: limit(d.selected_upper),
        min: limit(d.selected_lower),
        status: reading.status,
        threshold_status: reading.threshold_status,
        max_writable: d.upper_writable,
        min_writable: d.lower_writable,
    }
}
