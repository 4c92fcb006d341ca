//! Discovery and reading state machine for one BMC endpoint.
//!
//! Everything runs inside `on_response` and `tick`; at most one request is
//! outstanding at a time. There is no per-request timeout: a response that
//! never arrives leaves the subsystem waiting forever.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, trace, warn};

use crate::bmc::message::{Request, RequestHandle, Response, CC_RESERVATION_CANCELLED, CC_SUCCESS};
use crate::bmc::reading::ReadingCycle;
use crate::bmc::reassembly::{ChunkReassembler, Progress};
use crate::bmc::registry::Registry;
use crate::bmc::transport::Transport;
use crate::config::types::MonitorConfig;
use crate::hardware::types::SensorReadout;
use crate::sdr::record::{self, SdrEntry, LAST_RECORD};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// Not started, or the reservation failed.
    Init,
    Reserved,
    ScanningFull,
    ScanningPartial,
    /// A reading pass is in flight.
    Reading,
    /// Idle; discovery is over.
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Reserve,
    Record,
    Reading(usize),
    Thresholds(usize),
}

pub struct Subsystem<T: Transport> {
    transport: T,
    state: ScanState,
    activated: bool,
    pending: Option<(RequestHandle, Pending)>,
    reservation_id: u16,
    next_record_pointer: u16,
    /// Record ids seen during this walk.
    visited: HashSet<u16>,
    reservation_retries: u32,
    max_reservation_retries: u32,
    reassembler: ChunkReassembler,
    registry: Registry,
    cycle: ReadingCycle,
    refresh_thresholds: bool,
}

impl<T: Transport> Subsystem<T> {
    pub fn new(transport: T, config: &MonitorConfig) -> Self {
        Self {
            transport,
            state: ScanState::Init,
            activated: false,
            pending: None,
            reservation_id: 0,
            next_record_pointer: 0,
            visited: HashSet::new(),
            reservation_retries: 0,
            max_reservation_retries: config.discovery.max_reservation_retries,
            reassembler: ChunkReassembler::new(
                config.discovery.max_chunk_size,
                config.discovery.min_chunk_size,
            ),
            registry: Registry::new(config.registry.clone()),
            cycle: ReadingCycle::new(Duration::from_millis(config.reading.staleness_ms)),
            refresh_thresholds: config.reading.refresh_thresholds,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn reservation_id(&self) -> u16 {
        self.reservation_id
    }

    pub fn next_record_pointer(&self) -> u16 {
        self.next_record_pointer
    }

    pub fn requested_chunk_size(&self) -> u8 {
        self.reassembler.chunk_size()
    }

    pub fn reassembly_offset(&self) -> usize {
        self.reassembler.offset()
    }

    pub fn current_registry_index(&self) -> usize {
        self.cycle.current_index()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn is_awaiting_response(&self) -> bool {
        self.pending.is_some()
    }

    pub fn discovery_complete(&self) -> bool {
        matches!(self.state, ScanState::Reading | ScanState::Done)
    }

    pub fn last_refresh(&self) -> Option<Instant> {
        self.cycle.last_refresh()
    }

    pub fn surface(&self) -> Vec<SensorReadout> {
        self.registry.surface()
    }

    /// First activation: reserve the repository. Later calls do nothing.
    pub fn start(&mut self) {
        if self.activated || self.state != ScanState::Init {
            return;
        }
        self.activated = true;
        info!("Starting SDR discovery");
        self.send(Request::reserve_sdr(), Pending::Reserve);
    }

    /// Periodic timer: starts discovery once, then keeps readings fresh.
    pub fn tick(&mut self, now: Instant) {
        match self.state {
            ScanState::Init => self.start(),
            ScanState::Done => {
                self.refresh(now);
            }
            ScanState::Reserved
            | ScanState::ScanningFull
            | ScanState::ScanningPartial
            | ScanState::Reading => {}
        }
    }

    /// Host refresh request. Returns `true` if a reading pass was started.
    ///
    /// Only acts when idle after discovery and the cache has gone stale.
    pub fn refresh(&mut self, now: Instant) -> bool {
        if self.state != ScanState::Done || self.pending.is_some() || self.registry.is_empty() {
            return false;
        }
        if !self.cycle.begin(now) {
            trace!("Readings still fresh, serving cache");
            return false;
        }
        self.state = ScanState::Reading;
        self.request_reading()
    }

    /// Deliver the response for an outstanding request.
    pub fn on_response(&mut self, handle: RequestHandle, response: Response, now: Instant) {
        let pending = match self.pending {
            Some((expected, pending)) if expected == handle => pending,
            Some((expected, _)) => {
                warn!("Ignoring response for request {:?}, waiting on {:?}", handle, expected);
                return;
            }
            None => {
                warn!("Ignoring unsolicited response for request {:?}", handle);
                return;
            }
        };
        self.pending = None;

        match (self.state, pending) {
            (ScanState::Init, Pending::Reserve) => self.on_reservation(response),
            (ScanState::ScanningFull | ScanState::ScanningPartial, Pending::Reserve) => {
                self.on_rereservation(response)
            }
            (ScanState::ScanningFull | ScanState::ScanningPartial, Pending::Record) => {
                self.on_record(response, now)
            }
            (ScanState::Reading, Pending::Reading(index)) => self.on_reading(index, response, now),
            (ScanState::Reading, Pending::Thresholds(index)) => {
                self.on_thresholds(index, response, now)
            }
            (state, pending) => {
                warn!("Unexpected {:?} response in state {:?}", pending, state);
            }
        }
    }

    fn send(&mut self, request: Request, pending: Pending) -> bool {
        trace!("-> {}", request);
        match self.transport.send(request) {
            Ok(handle) => {
                self.pending = Some((handle, pending));
                true
            }
            Err(e) => {
                error!("Failed to send {:?} request: {}", pending, e);
                false
            }
        }
    }

    fn on_reservation(&mut self, response: Response) {
        if !response.is_success() || response.payload.len() < 2 {
            // no retry; discovery stays parked in Init
            error!(
                "Reserve SDR Repository failed (cc=0x{:02x}, {} bytes), sensor discovery stopped",
                response.completion_code,
                response.payload.len()
            );
            return;
        }
        self.reservation_id = u16::from_le_bytes([response.payload[0], response.payload[1]]);
        self.state = ScanState::Reserved;
        debug!("SDR reservation 0x{:04x}", self.reservation_id);

        self.next_record_pointer = 0;
        self.visited.clear();
        self.fetch_record(0);
    }

    fn on_rereservation(&mut self, response: Response) {
        if !response.is_success() || response.payload.len() < 2 {
            error!("Re-reservation failed (cc=0x{:02x})", response.completion_code);
            self.abandon_discovery();
            return;
        }
        self.reservation_id = u16::from_le_bytes([response.payload[0], response.payload[1]]);
        debug!("SDR re-reserved as 0x{:04x}", self.reservation_id);
        self.reassembler.rewind();
        self.send_record_request();
    }

    fn fetch_record(&mut self, record_id: u16) {
        self.reassembler.start(record_id);
        self.send_record_request();
    }

    fn send_record_request(&mut self) {
        self.state = if self.reassembler.is_partial() {
            ScanState::ScanningPartial
        } else {
            ScanState::ScanningFull
        };
        match self.reassembler.request(self.reservation_id) {
            Ok(request) => {
                if !self.send(request, Pending::Record) {
                    self.abandon_discovery();
                }
            }
            Err(e) => {
                error!("Cannot request record 0x{:04x}: {}", self.reassembler.record_id(), e);
                self.abandon_discovery();
            }
        }
    }

    fn on_record(&mut self, response: Response, now: Instant) {
        match response.completion_code {
            CC_SUCCESS => {}
            CC_RESERVATION_CANCELLED => {
                if self.reservation_retries < self.max_reservation_retries {
                    self.reservation_retries += 1;
                    warn!(
                        "SDR reservation cancelled, re-reserving ({}/{})",
                        self.reservation_retries, self.max_reservation_retries
                    );
                    if !self.send(Request::reserve_sdr(), Pending::Reserve) {
                        self.abandon_discovery();
                    }
                } else {
                    error!("SDR reservation cancelled too often, abandoning discovery");
                    self.abandon_discovery();
                }
                return;
            }
            // 0xCA is the usual one, but any rejection is taken as a size problem
            cc => {
                match self.reassembler.on_size_error() {
                    Some(size) => {
                        info!(
                            "Get SDR for record 0x{:04x} rejected (cc=0x{:02x}), retrying with {} bytes",
                            self.reassembler.record_id(),
                            cc,
                            size
                        );
                        self.send_record_request();
                    }
                    None => {
                        error!(
                            "SDR chunk size fell below {} bytes (cc=0x{:02x}), abandoning discovery",
                            self.reassembler.chunk_size(),
                            cc
                        );
                        self.abandon_discovery();
                    }
                }
                return;
            }
        }

        match self.reassembler.on_success(&response.payload, self.reservation_id) {
            Ok(Progress::Complete(frame)) => self.on_complete_record(&frame, now),
            Ok(Progress::More(request)) => {
                if !self.send(request, Pending::Record) {
                    self.abandon_discovery();
                }
            }
            Err(e) => {
                error!("Bad Get SDR payload for record 0x{:04x}: {}", self.reassembler.record_id(), e);
                self.abandon_discovery();
            }
        }
    }

    fn on_complete_record(&mut self, frame: &[u8], now: Instant) {
        let current = self.reassembler.record_id();
        let next = match record::decode_sdr(frame) {
            Ok(decoded) => {
                match decoded.entry {
                    SdrEntry::Sensor(kind, descriptor) => {
                        debug!(
                            "SDR 0x{:04x}: {:?} sensor #{} {:?}",
                            current, kind, descriptor.sensor_number, descriptor.identifier
                        );
                        self.registry.try_insert(descriptor);
                    }
                    SdrEntry::Skipped { record_type } => {
                        trace!("SDR 0x{:04x}: skipping record type 0x{:02x}", current, record_type);
                    }
                }
                Some(decoded.next_pointer)
            }
            Err(e) => {
                warn!("Undecodable SDR 0x{:04x}: {}", current, e);
                record::next_pointer(frame)
            }
        };

        self.visited.insert(current);
        if let Some(own) = record::record_id(frame) {
            self.visited.insert(own);
        }

        match next {
            Some(LAST_RECORD) => self.complete_discovery(now),
            Some(next) if self.visited.contains(&next) => {
                warn!("SDR 0x{:04x} links back to record 0x{:04x}, ending discovery", current, next);
                self.complete_discovery(now);
            }
            Some(next) => {
                self.next_record_pointer = next;
                self.fetch_record(next);
            }
            None => self.abandon_discovery(),
        }
    }

    fn publish(&mut self, outcome: &str) {
        self.registry.publish();
        self.next_record_pointer = LAST_RECORD;
        self.state = ScanState::Done;
        info!("SDR discovery {}: {} sensors registered", outcome, self.registry.len());
    }

    /// End of directory: publish the table and start the first reading pass.
    fn complete_discovery(&mut self, now: Instant) {
        self.publish("complete");
        if self.registry.is_empty() {
            return;
        }
        if self.cycle.begin(now) {
            self.state = ScanState::Reading;
            self.request_reading();
        }
    }

    /// Give up on the directory, keeping whatever was registered.
    fn abandon_discovery(&mut self) {
        self.publish("abandoned");
    }

    fn request_reading(&mut self) -> bool {
        let index = self.cycle.current_index();
        let Some(entry) = self.registry.get(index) else {
            self.cycle.abort();
            self.state = ScanState::Done;
            return false;
        };
        let request = Request::get_sensor_reading(entry.descriptor.sensor_number);
        if self.send(request, Pending::Reading(index)) {
            true
        } else {
            self.cycle.abort();
            self.state = ScanState::Done;
            false
        }
    }

    fn on_reading(&mut self, index: usize, response: Response, now: Instant) {
        let name = self.registry.get(index).map(|e| e.name.clone()).unwrap_or_default();
        if response.is_success() {
            match record::decode_reading(&response.payload) {
                Ok(reading) => {
                    trace!("{}: raw 0x{:02x} status 0x{:02x}", name, reading.reading, reading.status);
                    self.registry.record_sample(index, reading, now);
                }
                Err(e) => warn!("Bad reading payload for {}: {}", name, e),
            }
        } else {
            warn!("Reading {} failed (cc=0x{:02x})", name, response.completion_code);
        }

        let wants_thresholds = self.refresh_thresholds
            && self.registry.get(index).is_some_and(|e| e.descriptor.thresholds_readable());
        if wants_thresholds {
            let number = self.registry.get(index).map(|e| e.descriptor.sensor_number).unwrap_or(0);
            if self.send(Request::get_sensor_thresholds(number), Pending::Thresholds(index)) {
                return;
            }
        }
        self.advance(now);
    }

    fn on_thresholds(&mut self, index: usize, response: Response, now: Instant) {
        if response.is_success() {
            match record::decode_thresholds(&response.payload) {
                Ok(updates) => self.registry.update_limits(index, &updates),
                Err(e) => warn!("Bad threshold payload for entry {}: {}", index, e),
            }
        } else {
            debug!("Get Sensor Thresholds for entry {} failed (cc=0x{:02x})", index, response.completion_code);
        }
        self.advance(now);
    }

    fn advance(&mut self, now: Instant) {
        if self.cycle.advance(self.registry.len(), now) {
            trace!("Reading pass complete");
            self.state = ScanState::Done;
        } else {
            self.request_reading();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bmc::message::CC_SIZE_TOO_LARGE;
    use crate::errors::TransportError;
    use crate::hardware::emulator::SimulatedBmc;
    use crate::profiles::types::{BmcFixture, FixtureSensor, IdEncoding};
    use crate::sdr::record::{RecordFormat, SensorType};
    use crate::sdr::thresholds::*;

    #[derive(Default)]
    struct RecordingTransport {
        next: u64,
        sent: Vec<(RequestHandle, Request)>,
        fail: bool,
    }

    impl Transport for RecordingTransport {
        fn send(&mut self, request: Request) -> Result<RequestHandle, TransportError> {
            if self.fail {
                return Err(TransportError::Closed);
            }
            self.next += 1;
            let handle = RequestHandle(self.next);
            self.sent.push((handle, request));
            Ok(handle)
        }
    }

    type TestSubsystem = Subsystem<RecordingTransport>;

    fn fixture() -> BmcFixture {
        let mut cpu = FixtureSensor::new("CPU Temp", SensorType::Temperature, 0x01);
        cpu.capabilities = capabilities(ACCESS_NONE, ACCESS_READABLE);
        cpu.threshold_mask = MASK_UPPER_CRITICAL | MASK_LOWER_CRITICAL;
        cpu.limits = [95, 90, 85, 0, 5, 10, 0, 0];
        cpu.reading = 42;

        let mut fan = FixtureSensor::new("FAN1", SensorType::Fan, 0x30);
        fan.record = RecordFormat::Compact;
        fan.id_encoding = IdEncoding::Packed6;
        fan.reading = 30;

        let mut volts = FixtureSensor::new("P12V", SensorType::Voltage, 0x12);
        volts.m = 6;
        volts.k2 = -2;
        volts.reading = 200;

        let intrusion = FixtureSensor::new("Intrusion", SensorType::Other, 0x50);

        let mut fixture = BmcFixture::new("Test", vec![cpu, fan, volts, intrusion]);
        // OEM record
        fixture.extra_records = vec![vec![0, 0, 0x51, 0xc0, 0, 0x57, 0x01, 0x00]];
        fixture
    }

    fn subsystem(config: &MonitorConfig) -> TestSubsystem {
        Subsystem::new(RecordingTransport::default(), config)
    }

    fn last_request(sub: &TestSubsystem) -> Request {
        sub.transport().sent.last().map(|(_, r)| r.clone()).unwrap()
    }

    fn sent_count(sub: &TestSubsystem) -> usize {
        sub.transport().sent.len()
    }

    /// Answer the outstanding request.
    fn answer_one(sub: &mut TestSubsystem, bmc: &mut SimulatedBmc, now: Instant) -> Response {
        let (handle, request) = sub.transport().sent.last().cloned().unwrap();
        let response = bmc.handle(&request);
        sub.on_response(handle, response.clone(), now);
        response
    }

    /// Answer requests until nothing is outstanding, checking that the
    /// subsystem never has two requests in flight.
    fn pump(sub: &mut TestSubsystem, bmc: &mut SimulatedBmc, now: Instant) {
        while sub.is_awaiting_response() {
            let before = sent_count(sub);
            answer_one(sub, bmc, now);
            assert!(sent_count(sub) <= before + 1, "more than one request issued per response");
        }
    }

    fn count_commands(bmc: &SimulatedBmc, command: u8) -> usize {
        bmc.requests().iter().filter(|r| r.command == command).count()
    }

    #[test]
    fn discovery_registers_monitored_sensors_and_reads_them() {
        let t0 = Instant::now();
        let config = MonitorConfig::default();
        let mut bmc = SimulatedBmc::from_fixture(&fixture());
        let mut sub = subsystem(&config);

        assert!(sub.surface().is_empty());
        sub.start();
        assert_eq!(sent_count(&sub), 1);
        assert_eq!(last_request(&sub), Request::reserve_sdr());

        pump(&mut sub, &mut bmc, t0);

        assert_eq!(sub.state(), ScanState::Done);
        assert_eq!(sub.next_record_pointer(), LAST_RECORD);
        assert_eq!(sub.reservation_id(), 1);
        assert_eq!(sub.last_refresh(), Some(t0));
        assert_eq!(sub.current_registry_index(), 0);
        assert_eq!(count_commands(&bmc, crate::bmc::message::CMD_GET_SDR), bmc.record_count());
        assert_eq!(count_commands(&bmc, crate::bmc::message::CMD_GET_SENSOR_READING), 3);

        let surface = sub.surface();
        let names: Vec<_> = surface.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["temp1", "fan1", "in1"]);

        let temp = &surface[0];
        assert_eq!(temp.label, "CPU Temp");
        assert_eq!(temp.input.map(|v| v.raw), Some(42));
        assert_eq!(temp.max.map(|v| v.raw), Some(90));
        assert_eq!(temp.min.map(|v| v.raw), Some(5));

        let fan = &surface[1];
        assert_eq!(fan.label, "FAN1");
        assert_eq!(fan.input.map(|v| v.raw), Some(30));
        assert!(fan.max.is_none() && fan.min.is_none());

        let volts = surface[2].input.unwrap();
        assert_eq!((volts.raw, volts.decimals), (1200, 2));
    }

    #[test]
    fn size_rejection_halves_chunk_and_restarts_record() {
        let t0 = Instant::now();
        let mut config = MonitorConfig::default();
        config.discovery.max_chunk_size = 32;
        let mut fx = fixture();
        fx.max_transfer = 16;
        let mut bmc = SimulatedBmc::from_fixture(&fx);
        let mut sub = subsystem(&config);

        sub.start();
        answer_one(&mut sub, &mut bmc, t0);
        assert_eq!(sub.state(), ScanState::ScanningFull);
        assert_eq!(last_request(&sub).sdr_fields(), Some((1, 0, 0, 32)));

        let rejected = answer_one(&mut sub, &mut bmc, t0);
        assert_eq!(rejected.completion_code, CC_SIZE_TOO_LARGE);
        assert_eq!(sub.state(), ScanState::ScanningPartial);
        assert_eq!(sub.requested_chunk_size(), 16);
        assert_eq!(sub.reassembly_offset(), 0);
        assert_eq!(sub.next_record_pointer(), 0);
        assert_eq!(last_request(&sub).sdr_fields(), Some((1, 0, 0, 16)));

        pump(&mut sub, &mut bmc, t0);
        assert_eq!(sub.state(), ScanState::Done);
        assert_eq!(sub.registry().len(), 3);
        assert_eq!(sub.surface()[0].input.map(|v| v.raw), Some(42));
    }

    #[test]
    fn chunk_floor_abandons_discovery() {
        let t0 = Instant::now();
        let mut config = MonitorConfig::default();
        config.discovery.max_chunk_size = 32;
        config.discovery.min_chunk_size = 8;
        let mut fx = fixture();
        fx.max_transfer = 4;
        let mut bmc = SimulatedBmc::from_fixture(&fx);
        let mut sub = subsystem(&config);

        sub.start();
        pump(&mut sub, &mut bmc, t0);

        assert_eq!(sub.state(), ScanState::Done);
        assert!(sub.discovery_complete());
        assert!(sub.registry().is_empty());
        // 32, 16 and 8 byte attempts
        assert_eq!(count_commands(&bmc, crate::bmc::message::CMD_GET_SDR), 3);
        assert_eq!(count_commands(&bmc, crate::bmc::message::CMD_GET_SENSOR_READING), 0);
        assert!(!sub.refresh(t0 + Duration::from_secs(10)));
    }

    #[test]
    fn failed_reservation_parks_in_init() {
        let t0 = Instant::now();
        let mut fx = fixture();
        fx.reserve_completion = Some(0xc1);
        let mut bmc = SimulatedBmc::from_fixture(&fx);
        let mut sub = subsystem(&MonitorConfig::default());

        sub.tick(t0);
        answer_one(&mut sub, &mut bmc, t0);
        assert_eq!(sub.state(), ScanState::Init);
        assert!(!sub.is_awaiting_response());

        sub.tick(t0 + Duration::from_secs(5));
        sub.start();
        assert_eq!(sent_count(&sub), 1, "no retry after a failed reservation");
        assert!(sub.surface().is_empty());
    }

    #[test]
    fn refresh_during_pass_sends_nothing() {
        let t0 = Instant::now();
        let mut bmc = SimulatedBmc::from_fixture(&fixture());
        let mut sub = subsystem(&MonitorConfig::default());

        sub.start();
        while sub.state() != ScanState::Reading {
            answer_one(&mut sub, &mut bmc, t0);
        }
        let in_flight = sent_count(&sub);
        assert!(!sub.refresh(t0));
        sub.tick(t0);
        assert_eq!(sent_count(&sub), in_flight);

        pump(&mut sub, &mut bmc, t0);
        assert_eq!(sub.state(), ScanState::Done);
    }

    #[test]
    fn cache_is_served_until_stale() {
        let t0 = Instant::now();
        let mut bmc = SimulatedBmc::from_fixture(&fixture());
        let mut sub = subsystem(&MonitorConfig::default());
        sub.start();
        pump(&mut sub, &mut bmc, t0);
        let after_first_pass = sent_count(&sub);

        assert!(!sub.refresh(t0 + Duration::from_secs(1)));
        assert_eq!(sent_count(&sub), after_first_pass);

        bmc.set_reading(0x01, 55);
        let t1 = t0 + Duration::from_secs(3);
        assert!(sub.refresh(t1));
        assert_eq!(sub.state(), ScanState::Reading);
        assert_eq!(last_request(&sub), Request::get_sensor_reading(0x01));

        pump(&mut sub, &mut bmc, t1);
        assert_eq!(sub.last_refresh(), Some(t1));
        assert_eq!(sub.surface()[0].input.map(|v| v.raw), Some(55));
    }

    #[test]
    fn cancelled_reservation_is_renewed() {
        let t0 = Instant::now();
        let mut bmc = SimulatedBmc::from_fixture(&fixture());
        let mut sub = subsystem(&MonitorConfig::default());

        sub.start();
        answer_one(&mut sub, &mut bmc, t0);
        bmc.cancel_reservation();
        let cancelled = answer_one(&mut sub, &mut bmc, t0);
        assert_eq!(cancelled.completion_code, CC_RESERVATION_CANCELLED);
        assert_eq!(last_request(&sub), Request::reserve_sdr());

        answer_one(&mut sub, &mut bmc, t0);
        assert_eq!(sub.reservation_id(), 2);
        assert_eq!(last_request(&sub).sdr_fields().map(|f| (f.0, f.1, f.2)), Some((2, 0, 0)));

        pump(&mut sub, &mut bmc, t0);
        assert_eq!(sub.registry().len(), 3);
    }

    #[test]
    fn cancelled_reservation_without_retries_abandons() {
        let t0 = Instant::now();
        let mut config = MonitorConfig::default();
        config.discovery.max_reservation_retries = 0;
        let mut bmc = SimulatedBmc::from_fixture(&fixture());
        let mut sub = subsystem(&config);

        sub.start();
        answer_one(&mut sub, &mut bmc, t0);
        answer_one(&mut sub, &mut bmc, t0);
        bmc.cancel_reservation();
        pump(&mut sub, &mut bmc, t0);

        assert_eq!(sub.state(), ScanState::Done);
        assert_eq!(sub.registry().len(), 1, "sensors found before the cancel are kept");
        assert_eq!(count_commands(&bmc, crate::bmc::message::CMD_GET_SENSOR_READING), 0);
    }

    #[test]
    fn per_type_capacity_drops_extra_sensors() {
        let t0 = Instant::now();
        let mut config = MonitorConfig::default();
        config.registry.max_fan = 1;
        let fx = BmcFixture::new(
            "Test",
            vec![
                FixtureSensor::new("FAN1", SensorType::Fan, 0x30),
                FixtureSensor::new("FAN2", SensorType::Fan, 0x31),
                FixtureSensor::new("Inlet", SensorType::Temperature, 0x02),
            ],
        );
        let mut bmc = SimulatedBmc::from_fixture(&fx);
        let mut sub = subsystem(&config);
        sub.start();
        pump(&mut sub, &mut bmc, t0);

        let labels: Vec<_> = sub.surface().into_iter().map(|s| (s.name, s.label)).collect();
        assert_eq!(
            labels,
            [("fan1".to_string(), "FAN1".to_string()), ("temp1".to_string(), "Inlet".to_string())]
        );
    }

    #[test]
    fn stray_handles_are_ignored() {
        let t0 = Instant::now();
        let mut sub = subsystem(&MonitorConfig::default());
        sub.on_response(RequestHandle(7), Response::ok(vec![1, 0]), t0);
        assert_eq!(sub.state(), ScanState::Init);

        sub.start();
        sub.on_response(RequestHandle(99), Response::ok(vec![1, 0]), t0);
        assert_eq!(sub.state(), ScanState::Init);
        assert!(sub.is_awaiting_response());
    }

    #[test]
    fn transport_failure_leaves_nothing_pending() {
        let mut sub = Subsystem::new(
            RecordingTransport { fail: true, ..Default::default() },
            &MonitorConfig::default(),
        );
        sub.start();
        assert_eq!(sub.state(), ScanState::Init);
        assert!(!sub.is_awaiting_response());
    }

    #[test]
    fn failed_reading_still_completes_the_pass() {
        let t0 = Instant::now();
        let mut fx = fixture();
        fx.sensors[0].reading_completion = Some(0xcb);
        let mut bmc = SimulatedBmc::from_fixture(&fx);
        let mut sub = subsystem(&MonitorConfig::default());
        sub.start();
        pump(&mut sub, &mut bmc, t0);

        let surface = sub.surface();
        assert_eq!(sub.last_refresh(), Some(t0));
        assert!(surface[0].input.is_none());
        assert_eq!(surface[1].input.map(|v| v.raw), Some(30));
    }

    #[test]
    fn threshold_refresh_follows_readable_sensors() {
        let t0 = Instant::now();
        let mut config = MonitorConfig::default();
        config.reading.refresh_thresholds = true;
        let mut bmc = SimulatedBmc::from_fixture(&fixture());
        let mut sub = subsystem(&config);
        sub.start();
        pump(&mut sub, &mut bmc, t0);

        let thresholds: Vec<_> = bmc
            .requests()
            .iter()
            .filter(|r| r.command == crate::bmc::message::CMD_GET_SENSOR_THRESHOLDS)
            .collect();
        assert_eq!(thresholds, [&Request::get_sensor_thresholds(0x01)]);
        assert_eq!(sub.surface()[0].max.map(|v| v.raw), Some(90));
        assert_eq!(sub.state(), ScanState::Done);
    }

    #[test]
    fn undecodable_record_is_stepped_over() {
        let t0 = Instant::now();
        let mut fx = fixture();
        // full-record type, far too short
        fx.extra_records.insert(0, vec![0, 0, 0x51, 0x01, 0, 0xaa, 0xbb]);
        let mut bmc = SimulatedBmc::from_fixture(&fx);
        let mut sub = subsystem(&MonitorConfig::default());
        sub.start();
        pump(&mut sub, &mut bmc, t0);

        assert_eq!(sub.registry().len(), 3);
        assert_eq!(sub.last_refresh(), Some(t0), "discovery completed rather than abandoned");
    }

    fn answer_with(sub: &mut TestSubsystem, response: Response, now: Instant) {
        let (handle, _) = sub.transport().sent.last().cloned().unwrap();
        sub.on_response(handle, response, now);
    }

    /// A whole temperature record as a Get SDR success payload.
    fn temperature_record(number: u8, record_id: u16, next: u16) -> Response {
        let mut d = record::SdrDescriptor::new(SensorType::Temperature, number, format!("Temp {}", number));
        d.record_id = record_id;
        let frame = record::encode_sdr(&d, next);
        Response::ok(frame[1..].to_vec())
    }

    fn sdr_requests(sub: &TestSubsystem) -> Vec<u16> {
        sub.transport()
            .sent
            .iter()
            .filter_map(|(_, r)| r.sdr_fields())
            .map(|(_, record_id, _, _)| record_id)
            .collect()
    }

    #[test]
    fn record_pointing_at_itself_ends_the_walk() {
        let t0 = Instant::now();
        let mut sub = subsystem(&MonitorConfig::default());
        sub.start();
        answer_with(&mut sub, Response::ok(vec![1, 0]), t0);
        answer_with(&mut sub, temperature_record(0x01, 1, 2), t0);
        answer_with(&mut sub, temperature_record(0x02, 2, 2), t0);

        assert_eq!(sdr_requests(&sub), [0, 2]);
        assert_eq!(sub.state(), ScanState::Reading);
        assert_eq!(sub.next_record_pointer(), LAST_RECORD);
        assert_eq!(sub.registry().len(), 2);
        assert_eq!(last_request(&sub), Request::get_sensor_reading(0x01));
    }

    #[test]
    fn directory_cycle_ends_the_walk() {
        let t0 = Instant::now();
        let mut sub = subsystem(&MonitorConfig::default());
        sub.start();
        answer_with(&mut sub, Response::ok(vec![1, 0]), t0);
        answer_with(&mut sub, temperature_record(0x01, 1, 2), t0);
        // record 2 links back to record 1
        answer_with(&mut sub, temperature_record(0x02, 2, 1), t0);

        assert_eq!(sdr_requests(&sub), [0, 2]);
        assert!(sub.discovery_complete());
        let names: Vec<_> = sub.surface().into_iter().map(|s| s.name).collect();
        assert_eq!(names, ["temp1", "temp2"]);

        answer_with(&mut sub, Response::ok(vec![40, 0xc0, 0]), t0);
        answer_with(&mut sub, Response::ok(vec![41, 0xc0, 0]), t0);
        assert_eq!(sub.state(), ScanState::Done);
        assert_eq!(sub.last_refresh(), Some(t0));
    }

    #[test]
    fn unreadable_next_pointer_abandons_discovery() {
        let t0 = Instant::now();
        let mut sub = subsystem(&MonitorConfig::default());
        sub.start();
        answer_with(&mut sub, Response::ok(vec![1, 0]), t0);
        answer_with(&mut sub, temperature_record(0x01, 1, 2), t0);
        let before = sent_count(&sub);
        // success with only one byte where the next record id belongs
        answer_with(&mut sub, Response::ok(vec![0x03]), t0);

        assert_eq!(sub.state(), ScanState::Done);
        assert!(!sub.is_awaiting_response());
        assert_eq!(sent_count(&sub), before, "no reading pass after an abandoned walk");
        assert_eq!(sub.last_refresh(), None);
        assert_eq!(sub.surface().len(), 1, "sensors found before the failure are kept");
    }

    #[test]
    fn empty_directory_goes_idle() {
        let t0 = Instant::now();
        let fx = BmcFixture::new("Test", vec![FixtureSensor::new("Intrusion", SensorType::Other, 0x50)]);
        let mut bmc = SimulatedBmc::from_fixture(&fx);
        let mut sub = subsystem(&MonitorConfig::default());
        sub.start();
        pump(&mut sub, &mut bmc, t0);

        assert_eq!(sub.state(), ScanState::Done);
        assert!(sub.surface().is_empty());
        assert!(!sub.refresh(t0 + Duration::from_secs(60)));
    }
}
