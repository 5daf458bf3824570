//! Structured logging
//!
//! Compact lines for an operator at a terminal, JSON for unattended runs that
//! feed a log pipeline. Every command runs inside a span carrying a [`RunId`]
//! so the events of one invocation (including every sync pass of a `follow`
//! run) can be grouped.
//!
//! Precedence, lowest first: defaults, `LOG_FORMAT` / `LOG_ANSI`, command
//! line flags. `RUST_LOG`, when set, replaces the computed filter entirely.

use std::fmt;
use std::str::FromStr;
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Crates whose level follows `-v`.
const OWN_CRATES: [&str; 5] = [
    "blockfill",
    "blockfill_node",
    "blockfill_sync",
    "blockfill_rpc",
    "blockfill_storage",
];

/// HTTP plumbing that stays at `warn` unless `RUST_LOG` says otherwise.
const NOISY_CRATES: [&str; 2] = ["hyper", "reqwest"];

/// Identifier attached to every event of one command invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunId {
    started_ms: u64,
    nonce: u32,
}

impl RunId {
    pub fn new() -> Self {
        let started_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            started_ms,
            nonce: rand::random(),
        }
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}-{:08x}", self.started_ms, self.nonce)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Single-line human output
    #[default]
    Compact,
    /// Multi-line human output
    Pretty,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}' (compact, pretty, json)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub format: LogFormat,
    /// 0 = info, 1 = debug, 2+ = trace for the blockfill crates
    pub verbosity: u8,
    pub ansi_colors: bool,
    /// Emit span open/close events (pass durations show up as `sync_pass` closes)
    pub span_events: bool,
    /// Include file and line
    pub include_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Compact,
            verbosity: 0,
            ansi_colors: true,
            span_events: false,
            include_location: false,
        }
    }
}

impl LogConfig {
    /// Combine the environment with command line flags. JSON output turns on
    /// span events and source locations and turns off colors.
    pub fn resolve(format: Option<LogFormat>, verbosity: u8) -> Self {
        let env_format = std::env::var("LOG_FORMAT")
            .ok()
            .and_then(|f| f.parse().ok());
        let ansi = std::env::var("LOG_ANSI")
            .ok()
            .map(|v| v.eq_ignore_ascii_case("true"));
        Self::from_parts(format.or(env_format), ansi, verbosity)
    }

    fn from_parts(format: Option<LogFormat>, ansi: Option<bool>, verbosity: u8) -> Self {
        let format = format.unwrap_or_default();
        let json = format == LogFormat::Json;
        Self {
            format,
            verbosity,
            ansi_colors: !json && ansi.unwrap_or(true),
            span_events: json || verbosity > 0,
            include_location: json || verbosity > 1,
        }
    }

    fn directives(&self) -> String {
        let own = match self.verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        let mut directives = vec!["warn".to_string()];
        directives.extend(OWN_CRATES.iter().map(|c| format!("{c}={own}")));
        directives.extend(NOISY_CRATES.iter().map(|c| format!("{c}=warn")));
        directives.join(",")
    }
}

/// Install the global subscriber. Output goes to stderr so `gaps` and
/// `status` can be piped.
pub fn init_logging(config: &LogConfig) -> anyhow::Result<()> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(rust_log) => EnvFilter::new(rust_log),
        Err(_) => EnvFilter::new(config.directives()),
    };

    let span_events = if config.span_events {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_span_events(span_events);

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.format {
        LogFormat::Json => registry.with(layer.json().with_ansi(false)).try_init(),
        LogFormat::Pretty => registry
            .with(layer.pretty().with_ansi(config.ansi_colors))
            .try_init(),
        LogFormat::Compact => registry
            .with(layer.compact().with_ansi(config.ansi_colors))
            .try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("Failed to init logging: {}", e))
}
