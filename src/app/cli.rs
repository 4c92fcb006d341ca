//! Command-line argument definitions (clap) and help text.

use std::path::PathBuf;

use clap::Parser;

pub const HELP_TEXT: &str = "
BMC Sensor Monitor
Usage: bmc-sensors [OPTIONS]

Options:
  -h, --help                    Print help
  -V, --version                 Print version
Source:
  -c, --config <PATH>           Configuration file (JSON); defaults apply when absent
  -f, --fixture <PATH>          Serve sensors from a simulated BMC fixture instead of ipmitool
Output:
      --once                    Print one complete sensor table and exit
      --json                    Print tables as JSON
  -n, --interval <MS>           Refresh interval in milliseconds (overrides config)
Logging:
      --log-level <LOG_LEVEL>   Set log level (TRACE, DEBUG, INFO, WARN, ERROR)
";

#[derive(Parser, Debug)]
#[command(name = "bmc-sensors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "BMC Sensor Monitor", long_about = None)]
pub struct Args {
    // === Source ===
    /// Configuration file (JSON); defaults apply when absent
    #[arg(short = 'c', long, help_heading = "Source")]
    pub config: Option<PathBuf>,

    /// Serve sensors from a simulated BMC fixture instead of ipmitool
    #[arg(short = 'f', long, help_heading = "Source")]
    pub fixture: Option<PathBuf>,

    // === Output ===
    /// Print one complete sensor table and exit
    #[arg(long, help_heading = "Output")]
    pub once: bool,

    /// Print tables as JSON
    #[arg(long, help_heading = "Output")]
    pub json: bool,

    /// Refresh interval in milliseconds (overrides config)
    #[arg(short = 'n', long, help_heading = "Output")]
    pub interval: Option<u64>,

    // === Logging ===
    /// Set log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(long = "log-level", help_heading = "Logging")]
    pub log_level: Option<String>,
}
