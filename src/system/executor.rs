//! ipmitool subprocess executor.
//! Spawns `ipmitool raw` and respects BMC_IPMI_HOST for LAN or emulator targets.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tracing::{debug, trace};

use crate::bmc::message::{Request, Response};
use crate::hardware::BmcEndpoint;
use crate::system::parser;

/// Build an ipmitool Command with the correct interface flags.
/// If BMC_IPMI_HOST is set, routes via LAN to a remote BMC.
/// Otherwise, uses the local /dev/ipmi0 interface.
pub fn build_ipmitool_command() -> std::process::Command {
    let mut cmd = std::process::Command::new("ipmitool");

    if let Ok(host) = std::env::var("BMC_IPMI_HOST") {
        let port = std::env::var("BMC_IPMI_PORT").unwrap_or_else(|_| "623".to_string());
        let user = std::env::var("BMC_IPMI_USER").unwrap_or_else(|_| "admin".to_string());
        let pass = std::env::var("BMC_IPMI_PASS").unwrap_or_else(|_| "password".to_string());
        debug!("IPMI routing to {}:{}", host, port);
        cmd.args(["-I", "lanplus", "-H", &host, "-p", &port, "-U", &user, "-P", &pass]);
    } else {
        cmd.args(["-I", "open"]);
    }

    cmd
}

/// Execute one request with `ipmitool raw`.
///
/// A BMC rejection comes back as a `Response` carrying its completion code;
/// only a failure without a completion code is an error.
pub async fn run_ipmitool_raw(request: &Request) -> Result<Response> {
    let mut cmd = build_ipmitool_command();
    cmd.arg("raw").args(parser::raw_args(request));

    trace!("Executing: ipmitool raw {}", request);

    let output = tokio::process::Command::from(cmd)
        .output()
        .await
        .context("Failed to execute ipmitool raw")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return match parser::parse_completion_code(&stderr) {
            Some(cc) => Ok(Response::error(cc)),
            None => Err(anyhow!("ipmitool raw failed: {}", stderr.trim())),
        };
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let payload = parser::parse_raw_output(&stdout)
        .with_context(|| format!("Bad response to ipmitool raw {}", request))?;
    Ok(Response::ok(payload))
}

/// A real BMC reached through the ipmitool binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct IpmitoolEndpoint;

#[async_trait]
impl BmcEndpoint for IpmitoolEndpoint {
    async fn execute(&self, request: Request) -> Result<Response> {
        run_ipmitool_raw(&request).await
    }

    fn describe(&self) -> String {
        match std::env::var("BMC_IPMI_HOST") {
            Ok(host) => format!("ipmitool lanplus {}", host),
            Err(_) => "ipmitool (local interface)".to_string(),
        }
    }
}
