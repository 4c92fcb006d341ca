//! ipmitool raw output parsing.
//! Converts the hex dump printed by `ipmitool raw` into bytes and extracts the
//! completion code ipmitool reports when the BMC rejects a request.

use anyhow::{anyhow, Result};

use crate::bmc::message::Request;

/// Arguments for `ipmitool raw`: netfn, command, then the data bytes.
pub fn raw_args(request: &Request) -> Vec<String> {
    std::iter::once(request.netfn)
        .chain(std::iter::once(request.command))
        .chain(request.payload.iter().copied())
        .map(|b| format!("0x{:02x}", b))
        .collect()
}

/// Parse the response data of a successful `ipmitool raw` call.
/// Input:  " 01 00\n 51 01 33 20 00 01 ..."
pub fn parse_raw_output(stdout: &str) -> Result<Vec<u8>> {
    stdout
        .split_whitespace()
        .map(|token| {
            let digits = token.trim_start_matches("0x");
            u8::from_str_radix(digits, 16)
                .map_err(|_| anyhow!("Unexpected token {:?} in ipmitool output", token))
        })
        .collect()
}

/// Completion code from an ipmitool failure message.
/// Input:  "Unable to send RAW command (channel=0x0 netfn=0xa lun=0x0 cmd=0x23 rsp=0xca): ..."
pub fn parse_completion_code(stderr: &str) -> Option<u8> {
    let start = stderr.find("rsp=0x")? + "rsp=0x".len();
    let digits: String = stderr[start..]
        .chars()
        .take_while(|c| c.is_ascii_hexdigit())
        .take(2)
        .collect();
    u8::from_str_radix(&digits, 16).ok()
}
