//! Tracing subscriber setup, custom formatters, log level reload.

use tracing_subscriber::{reload, EnvFilter};

pub type ReloadHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;
pub static RELOAD_HANDLE: std::sync::OnceLock<ReloadHandle> = std::sync::OnceLock::new();

/// Map a user-supplied level name to a filter directive.
pub fn level_filter(level: &str) -> Option<&'static str> {
    match level.trim().to_lowercase().as_str() {
        "trace" => Some("trace"),
        "debug" => Some("debug"),
        "info" => Some("info"),
        "warn" | "warning" => Some("warn"),
        "error" | "critical" => Some("error"),
        _ => None,
    }
}

/// Pick the log level: command line, then `LOG_LEVEL`, then config, then `info`.
pub fn resolve_level(cli: Option<&str>, env: Option<&str>, config: Option<&str>) -> &'static str {
    [cli, env, config]
        .into_iter()
        .flatten()
        .find_map(level_filter)
        .unwrap_or("info")
}

// "YYYY-MM-DD HH:MM:SS" in local time
pub struct LocalTimeFormatter;

impl tracing_subscriber::fmt::time::FormatTime for LocalTimeFormatter {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        #[cfg(unix)]
        unsafe {
            let now = libc::time(std::ptr::null_mut());
            let mut tm: libc::tm = std::mem::zeroed();
            libc::localtime_r(&now, &mut tm);

            write!(w, "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                tm.tm_year + 1900,
                tm.tm_mon + 1,
                tm.tm_mday,
                tm.tm_hour,
                tm.tm_min,
                tm.tm_sec)
        }

        #[cfg(not(unix))]
        {
            write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"))
        }
    }
}

/// "YYYY-MM-DD HH:MM:SS [LEVEL] message", level colored only on a terminal.
pub struct CustomEventFormat {
    pub ansi: bool,
}

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for CustomEventFormat
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: tracing_subscriber::fmt::format::Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        use tracing_subscriber::fmt::time::FormatTime;

        LocalTimeFormatter.format_time(&mut writer)?;
        write!(writer, " ")?;

        let level = event.metadata().level();
        if self.ansi {
            let color = match *level {
                tracing::Level::TRACE => "\x1b[2m",
                tracing::Level::DEBUG => "\x1b[34m",
                tracing::Level::INFO => "\x1b[32m",
                tracing::Level::WARN => "\x1b[33m",
                tracing::Level::ERROR => "\x1b[31m",
            };
            write!(writer, "{}[{}]\x1b[0m ", color, level)?;
        } else {
            write!(writer, "[{}] ", level)?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

/// Install the global subscriber. Logs go to stderr so tables on stdout
/// stay machine-readable.
pub fn init_tracing(filter: &str) {
    use std::io::IsTerminal;
    use tracing_subscriber::prelude::*;

    let (filter_layer, reload_handle) = reload::Layer::new(EnvFilter::new(filter));
    let ansi = std::io::stderr().is_terminal();

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .fmt_fields(tracing_subscriber::fmt::format::DefaultFields::new())
                .event_format(CustomEventFormat { ansi }),
        )
        .init();

    let _ = RELOAD_HANDLE.set(reload_handle);
}

/// Swap the active filter, e.g. once the config file's level is known.
pub fn reload_level(filter: &str) -> anyhow::Result<()> {
    let handle = RELOAD_HANDLE
        .get()
        .ok_or_else(|| anyhow::anyhow!("Tracing is not initialized"))?;
    handle
        .reload(EnvFilter::new(filter))
        .map_err(|e| anyhow::anyhow!("Failed to reload log level: {}", e))
}
