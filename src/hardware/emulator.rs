//! In-process BMC that serves an SDR repository built from a fixture profile.
//! Used for `--fixture` runs and as the far end of the integration tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::bmc::message::{
    Request, Response, CC_RESERVATION_CANCELLED, CC_SIZE_TOO_LARGE, CMD_GET_SDR,
    CMD_GET_SENSOR_READING, CMD_GET_SENSOR_THRESHOLDS, CMD_RESERVE_SDR_REPOSITORY, NETFN_SENSOR,
    NETFN_STORAGE, READ_WHOLE_RECORD,
};
use crate::hardware::BmcEndpoint;
use crate::profiles::types::{BmcFixture, FixtureSensor};
use crate::sdr::convert::Conversion;
use crate::sdr::record::{
    encode_compact_sdr, encode_sdr_with, RecordFormat, SdrDescriptor, FRAME_PREFIX, LAST_RECORD,
};

pub const CC_INVALID_COMMAND: u8 = 0xc1;
pub const CC_REQUEST_DATA_LENGTH_INVALID: u8 = 0xc7;
pub const CC_NOT_PRESENT: u8 = 0xcb;

/// Requests kept for inspection; older ones are dropped.
pub const REQUEST_LOG_CAPACITY: usize = 1024;

/// Live values behind one sensor number.
#[derive(Debug, Clone)]
struct LiveSensor {
    reading: u8,
    status: u8,
    threshold_status: u8,
    threshold_mask: u16,
    limits: [u8; 8],
    reading_completion: Option<u8>,
}

impl From<&FixtureSensor> for LiveSensor {
    fn from(sensor: &FixtureSensor) -> Self {
        Self {
            reading: sensor.reading,
            status: sensor.status,
            threshold_status: sensor.threshold_status,
            threshold_mask: sensor.threshold_mask,
            limits: sensor.limits,
            reading_completion: sensor.reading_completion,
        }
    }
}

pub struct SimulatedBmc {
    /// `(record id, record bytes)` in directory order.
    records: Vec<(u16, Vec<u8>)>,
    sensors: HashMap<u8, LiveSensor>,
    reservation_id: u16,
    reserve_completion: Option<u8>,
    max_transfer: usize,
    requests: VecDeque<Request>,
}

fn descriptor_for(sensor: &FixtureSensor, record_id: u16) -> SdrDescriptor {
    let mut d = SdrDescriptor::new(sensor.kind, sensor.number, sensor.name.clone());
    d.record_id = record_id;
    d.format = sensor.record;
    d.capability_bits = sensor.capabilities;
    d.threshold_mask = sensor.threshold_mask;
    d.conversion = Conversion { linearity: 0, m: sensor.m, b: sensor.b, k1: sensor.k1, k2: sensor.k2 };
    d.raw_limits = sensor.limits;
    d
}

impl SimulatedBmc {
    pub fn from_fixture(fixture: &BmcFixture) -> Self {
        let mut bodies: Vec<Vec<u8>> = Vec::new();

        for sensor in &fixture.sensors {
            let d = descriptor_for(sensor, 0);
            let frame = match sensor.record {
                RecordFormat::Full => encode_sdr_with(&d, 0, sensor.id_encoding.into()),
                RecordFormat::Compact => encode_compact_sdr(&d, 0, sensor.id_encoding.into()),
            };
            bodies.push(frame[FRAME_PREFIX..].to_vec());
        }
        for raw in &fixture.extra_records {
            let mut body = raw.clone();
            if let Some(len) = body.get_mut(4) {
                *len = raw.len().saturating_sub(5) as u8;
            }
            bodies.push(body);
        }

        // ids start at 1; record id 0 addresses the first record
        let records = bodies
            .into_iter()
            .enumerate()
            .map(|(i, mut body)| {
                let id = (i + 1) as u16;
                if let Some(slot) = body.get_mut(..2) {
                    slot.copy_from_slice(&id.to_le_bytes());
                }
                (id, body)
            })
            .collect();

        Self {
            records,
            sensors: fixture.sensors.iter().map(|s| (s.number, LiveSensor::from(s))).collect(),
            reservation_id: fixture.reservation_id,
            reserve_completion: fixture.reserve_completion,
            max_transfer: fixture.max_transfer,
            requests: VecDeque::with_capacity(REQUEST_LOG_CAPACITY),
        }
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// The most recent requests served, oldest first.
    pub fn requests(&self) -> &VecDeque<Request> {
        &self.requests
    }

    pub fn set_reading(&mut self, number: u8, reading: u8) {
        if let Some(sensor) = self.sensors.get_mut(&number) {
            sensor.reading = reading;
        }
    }

    /// Invalidate the current reservation, as a repository change would.
    pub fn cancel_reservation(&mut self) {
        self.reservation_id = self.reservation_id.wrapping_add(1).max(1);
        debug!("Emulator reservation cancelled, next id 0x{:04x}", self.reservation_id);
    }

    pub fn handle(&mut self, request: &Request) -> Response {
        trace!("emulator <- {}", request);
        if self.requests.len() == REQUEST_LOG_CAPACITY {
            self.requests.pop_front();
        }
        self.requests.push_back(request.clone());
        match (request.netfn, request.command) {
            (NETFN_STORAGE, CMD_RESERVE_SDR_REPOSITORY) => self.reserve(),
            (NETFN_STORAGE, CMD_GET_SDR) => self.get_sdr(request),
            (NETFN_SENSOR, CMD_GET_SENSOR_READING) => self.get_reading(request),
            (NETFN_SENSOR, CMD_GET_SENSOR_THRESHOLDS) => self.get_thresholds(request),
            _ => Response::error(CC_INVALID_COMMAND),
        }
    }

    fn reserve(&self) -> Response {
        match self.reserve_completion {
            Some(cc) => Response::error(cc),
            None => Response::ok(self.reservation_id.to_le_bytes().to_vec()),
        }
    }

    fn get_sdr(&self, request: &Request) -> Response {
        let Some((reservation, record_id, offset, count)) = request.sdr_fields() else {
            return Response::error(CC_REQUEST_DATA_LENGTH_INVALID);
        };
        if reservation != self.reservation_id {
            return Response::error(CC_RESERVATION_CANCELLED);
        }
        let position = if record_id == 0 && !self.records.is_empty() {
            Some(0)
        } else {
            self.records.iter().position(|(id, _)| *id == record_id)
        };
        let Some(position) = position else {
            return Response::error(CC_NOT_PRESENT);
        };

        let body = &self.records[position].1;
        let start = usize::from(offset);
        if start > body.len() {
            return Response::error(CC_REQUEST_DATA_LENGTH_INVALID);
        }
        let wanted = if count == READ_WHOLE_RECORD {
            body.len() - start
        } else {
            usize::from(count)
        };
        if wanted > self.max_transfer {
            return Response::error(CC_SIZE_TOO_LARGE);
        }
        let end = (start + wanted).min(body.len());

        let next = self.records.get(position + 1).map_or(LAST_RECORD, |(id, _)| *id);
        let mut payload = next.to_le_bytes().to_vec();
        payload.extend_from_slice(&body[start..end]);
        Response::ok(payload)
    }

    fn get_reading(&self, request: &Request) -> Response {
        let Some(sensor) = request.payload.first().and_then(|n| self.sensors.get(n)) else {
            return Response::error(CC_NOT_PRESENT);
        };
        if let Some(cc) = sensor.reading_completion {
            return Response::error(cc);
        }
        Response::ok(vec![sensor.reading, sensor.status, sensor.threshold_status])
    }

    fn get_thresholds(&self, request: &Request) -> Response {
        let Some(sensor) = request.payload.first().and_then(|n| self.sensors.get(n)) else {
            return Response::error(CC_NOT_PRESENT);
        };
        let l = &sensor.limits;
        // slots: UNR UCR UNC LNR LCR LNC; response order LNC LCR LNR UNC UCR UNR
        Response::ok(vec![(sensor.threshold_mask & 0x3f) as u8, l[5], l[4], l[3], l[2], l[1], l[0]])
    }
}

/// `BmcEndpoint` over a shared `SimulatedBmc`.
#[derive(Clone)]
pub struct EmulatorEndpoint {
    bmc: Arc<Mutex<SimulatedBmc>>,
}

impl EmulatorEndpoint {
    pub fn new(bmc: SimulatedBmc) -> Self {
        Self { bmc: Arc::new(Mutex::new(bmc)) }
    }

    pub fn from_fixture(fixture: &BmcFixture) -> Self {
        Self::new(SimulatedBmc::from_fixture(fixture))
    }

    /// Shared handle for poking the BMC while a monitor is running.
    pub fn bmc(&self) -> Arc<Mutex<SimulatedBmc>> {
        Arc::clone(&self.bmc)
    }
}

#[async_trait]
impl BmcEndpoint for EmulatorEndpoint {
    async fn execute(&self, request: Request) -> Result<Response> {
        Ok(self.bmc.lock().await.handle(&request))
    }

    fn describe(&self) -> String {
        "simulated BMC".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdr::record::{decode_sdr, SdrEntry, SensorType};

    fn fixture() -> BmcFixture {
        let mut fixture = BmcFixture::new(
            "Test",
            vec![
                FixtureSensor::new("CPU Temp", SensorType::Temperature, 1),
                FixtureSensor::new("FAN1", SensorType::Fan, 0x30),
            ],
        );
        fixture.reservation_id = 0x0042;
        fixture.extra_records = vec![vec![0, 0, 0x51, 0xc0, 0, 0x57, 0x01, 0x00]];
        fixture
    }

    fn frame(response: &Response) -> Vec<u8> {
        let mut frame = vec![response.completion_code];
        frame.extend_from_slice(&response.payload);
        frame
    }

    #[test]
    fn record_zero_is_first_and_chain_ends() {
        let mut bmc = SimulatedBmc::from_fixture(&fixture());
        assert_eq!(bmc.record_count(), 3);

        let first = bmc.handle(&Request::get_sdr(0x42, 0, 0, READ_WHOLE_RECORD));
        let decoded = decode_sdr(&frame(&first)).unwrap();
        assert_eq!(decoded.next_pointer, 2);
        let SdrEntry::Sensor(kind, d) = decoded.entry else { panic!("expected a sensor") };
        assert_eq!(kind, SensorType::Temperature);
        assert_eq!(d.record_id, 1);

        let last = bmc.handle(&Request::get_sdr(0x42, 3, 0, READ_WHOLE_RECORD));
        let decoded = decode_sdr(&frame(&last)).unwrap();
        assert_eq!(decoded.next_pointer, LAST_RECORD);
        assert_eq!(decoded.entry, SdrEntry::Skipped { record_type: 0xc0 });
    }

    #[test]
    fn oversized_chunk_and_stale_reservation_are_rejected() {
        let mut fx = fixture();
        fx.max_transfer = 16;
        let mut bmc = SimulatedBmc::from_fixture(&fx);
        assert_eq!(bmc.handle(&Request::get_sdr(0x42, 0, 0, 32)).completion_code, CC_SIZE_TOO_LARGE);
        assert_eq!(bmc.handle(&Request::get_sdr(0x42, 0, 0, 16)).payload.len(), 18);

        bmc.cancel_reservation();
        assert_eq!(bmc.handle(&Request::get_sdr(0x42, 0, 0, 16)).completion_code, CC_RESERVATION_CANCELLED);
        let reserve = bmc.handle(&Request::reserve_sdr());
        assert_eq!(reserve.payload, vec![0x43, 0x00]);
    }

    #[test]
    fn readings_and_thresholds() {
        let mut fx = fixture();
        fx.sensors[0].reading = 42;
        fx.sensors[0].threshold_mask = 0x12;
        fx.sensors[0].limits = [95, 90, 85, 0, 5, 10, 0, 0];
        let mut bmc = SimulatedBmc::from_fixture(&fx);

        assert_eq!(bmc.handle(&Request::get_sensor_reading(1)).payload, vec![42, 0xc0, 0]);
        assert_eq!(
            bmc.handle(&Request::get_sensor_thresholds(1)).payload,
            vec![0x12, 10, 5, 0, 85, 90, 95]
        );
        assert_eq!(bmc.handle(&Request::get_sensor_reading(9)).completion_code, CC_NOT_PRESENT);

        bmc.set_reading(1, 50);
        assert_eq!(bmc.handle(&Request::get_sensor_reading(1)).payload[0], 50);
        assert_eq!(bmc.requests().len(), 4);
    }

    #[test]
    fn request_log_keeps_only_the_latest() {
        let mut bmc = SimulatedBmc::from_fixture(&fixture());
        bmc.handle(&Request::reserve_sdr());
        for _ in 0..REQUEST_LOG_CAPACITY * 3 {
            bmc.handle(&Request::get_sensor_reading(1));
        }
        bmc.handle(&Request::get_sensor_thresholds(1));

        let log = bmc.requests();
        assert_eq!(log.len(), REQUEST_LOG_CAPACITY);
        assert!(log.iter().all(|r| *r != Request::reserve_sdr()));
        assert_eq!(log.back(), Some(&Request::get_sensor_thresholds(1)));
        assert_eq!(log.front(), Some(&Request::get_sensor_reading(1)));
    }

    #[tokio::test]
    async fn endpoint_serves_through_the_trait() {
        let endpoint = EmulatorEndpoint::from_fixture(&fixture());
        let response = endpoint.execute(Request::reserve_sdr()).await.unwrap();
        assert_eq!(response, Response::ok(vec![0x42, 0x00]));
        assert_eq!(endpoint.bmc().lock().await.requests().len(), 1);
    }
}
