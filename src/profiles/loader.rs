//! JSON fixture loader with validation.
//! Reads a BMC fixture profile from disk and rejects repositories the
//! simulated BMC could not serve consistently.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tracing::{info, warn};

use super::types::BmcFixture;
use crate::sdr::strings::MAX_ID_LENGTH;

/// Load a fixture profile from a JSON file and validate it.
pub fn load_fixture(path: &Path) -> Result<BmcFixture> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read fixture: {:?}", path))?;

    let fixture: BmcFixture = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse fixture JSON: {:?}", path))?;

    validate_fixture(&fixture)?;

    info!(
        "Loaded fixture: {} ({}) - {} sensors, {} extra records, max transfer {} bytes",
        fixture.metadata.vendor,
        fixture.metadata.description.as_deref().unwrap_or("no description"),
        fixture.sensors.len(),
        fixture.extra_records.len(),
        fixture.max_transfer,
    );

    Ok(fixture)
}

pub fn validate_fixture(fixture: &BmcFixture) -> Result<()> {
    if fixture.max_transfer == 0 {
        return Err(anyhow!("max_transfer must be at least 1 byte"));
    }

    let mut numbers = HashSet::new();
    for sensor in &fixture.sensors {
        if !numbers.insert(sensor.number) {
            return Err(anyhow!(
                "Duplicate sensor number 0x{:02x} ({}); readings would be ambiguous",
                sensor.number,
                sensor.name
            ));
        }
        if sensor.name.len() > MAX_ID_LENGTH {
            warn!("Sensor name {:?} is longer than {} bytes and will be truncated", sensor.name, MAX_ID_LENGTH);
        }
        if !(-512..512).contains(&sensor.m) || !(-512..512).contains(&sensor.b) {
            return Err(anyhow!("Sensor {}: m and b must fit in 10 signed bits", sensor.name));
        }
        if !(-8..8).contains(&sensor.k1) || !(-8..8).contains(&sensor.k2) {
            return Err(anyhow!("Sensor {}: k1 and k2 must fit in 4 signed bits", sensor.name));
        }
    }

    for (i, record) in fixture.extra_records.iter().enumerate() {
        if record.len() < 5 {
            return Err(anyhow!("extra_records[{}] is shorter than a record header", i));
        }
    }

    Ok(())
}
