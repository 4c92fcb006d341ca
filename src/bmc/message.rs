//! Request/response messages exchanged with the BMC.

use std::fmt;

pub const NETFN_SENSOR: u8 = 0x04;
pub const NETFN_STORAGE: u8 = 0x0a;

pub const CMD_GET_SENSOR_THRESHOLDS: u8 = 0x27;
pub const CMD_GET_SENSOR_READING: u8 = 0x2d;
pub const CMD_RESERVE_SDR_REPOSITORY: u8 = 0x22;
pub const CMD_GET_SDR: u8 = 0x23;

pub const CC_SUCCESS: u8 = 0x00;
pub const CC_RESERVATION_CANCELLED: u8 = 0xc5;
/// Cannot return the requested number of data bytes.
pub const CC_SIZE_TOO_LARGE: u8 = 0xca;
pub const CC_UNSPECIFIED: u8 = 0xff;

/// Byte count meaning "read the entire record".
pub const READ_WHOLE_RECORD: u8 = 0xff;

/// Identifies one outstanding request on a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestHandle(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub netfn: u8,
    pub command: u8,
    pub payload: Vec<u8>,
}

impl Request {
    pub fn reserve_sdr() -> Self {
        Self { netfn: NETFN_STORAGE, command: CMD_RESERVE_SDR_REPOSITORY, payload: Vec::new() }
    }

    pub fn get_sdr(reservation_id: u16, record_id: u16, offset: u8, count: u8) -> Self {
        let mut payload = Vec::with_capacity(6);
        payload.extend_from_slice(&reservation_id.to_le_bytes());
        payload.extend_from_slice(&record_id.to_le_bytes());
        payload.push(offset);
        payload.push(count);
        Self { netfn: NETFN_STORAGE, command: CMD_GET_SDR, payload }
    }

    pub fn get_sensor_reading(sensor_number: u8) -> Self {
        Self { netfn: NETFN_SENSOR, command: CMD_GET_SENSOR_READING, payload: vec![sensor_number] }
    }

    pub fn get_sensor_thresholds(sensor_number: u8) -> Self {
        Self { netfn: NETFN_SENSOR, command: CMD_GET_SENSOR_THRESHOLDS, payload: vec![sensor_number] }
    }

    /// Decode the fields of a Get SDR request: `(reservation, record, offset, count)`.
    pub fn sdr_fields(&self) -> Option<(u16, u16, u8, u8)> {
        if self.netfn != NETFN_STORAGE || self.command != CMD_GET_SDR || self.payload.len() < 6 {
            return None;
        }
        let p = &self.payload;
        Some((
            u16::from_le_bytes([p[0], p[1]]),
            u16::from_le_bytes([p[2], p[3]]),
            p[4],
            p[5],
        ))
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "netfn=0x{:02x} cmd=0x{:02x}", self.netfn, self.command)?;
        for b in &self.payload {
            write!(f, " {:02x}", b)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub completion_code: u8,
    pub payload: Vec<u8>,
}

impl Response {
    pub fn ok(payload: Vec<u8>) -> Self {
        Self { completion_code: CC_SUCCESS, payload }
    }

    pub fn error(completion_code: u8) -> Self {
        Self { completion_code, payload: Vec::new() }
    }

    pub fn is_success(&self) -> bool {
        self.completion_code == CC_SUCCESS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_sdr_layout() {
        let req = Request::get_sdr(0x1234, 0x0042, 16, 8);
        assert_eq!(req.payload, vec![0x34, 0x12, 0x42, 0x00, 16, 8]);
        assert_eq!(req.sdr_fields(), Some((0x1234, 0x0042, 16, 8)));
        assert_eq!(Request::reserve_sdr().sdr_fields(), None);
    }

    #[test]
    fn display_is_hex() {
        assert_eq!(Request::get_sensor_reading(0x30).to_string(), "netfn=0x04 cmd=0x2d 30");
    }
}
