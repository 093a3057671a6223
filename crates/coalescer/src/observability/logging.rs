//! Structured logging setup.
//!
//! Renders coordinator events as plain text or as one JSON object per line.
//! Every dispatched batch runs inside a `dispatch` span carrying its `kind`
//! and `size`, so both formats show which batch an event belongs to:
//!
//! ```text
//! DEBUG dispatch{kind=load size=3}: coalescer_core::coordinator: dispatching batch remaining=0
//! ```
//!
//! ```json
//! {"timestamp":"...","level":"DEBUG","fields":{"message":"dispatching batch","remaining":0},"target":"coalescer_core::coordinator","span":{"kind":"load","size":3,"name":"dispatch"}}
//! ```
//!
//! With `span_timings` set, closing a `dispatch` span also logs how long the
//! batch function was busy, which is the quickest way to spot a slow backend.

use tracing::level_filters::LevelFilter;
use tracing::{Level, Subscriber};
use tracing_subscriber::fmt::{self, format::FmtSpan, MakeWriter};
use tracing_subscriber::layer::Layered;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable single-line text without ANSI colors.
    #[default]
    Text,
    /// One JSON object per line, with the current span attached.
    Json,
}

/// Configuration for structured logging.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Level used when `RUST_LOG` is not set.
    pub default_level: Level,
    /// Log a `close` event with busy/idle time for every finished span.
    pub span_timings: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            default_level: Level::INFO,
            span_timings: false,
        }
    }
}

impl LoggingConfig {
    pub fn json() -> Self {
        Self {
            format: LogFormat::Json,
            ..Default::default()
        }
    }

    pub fn text() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }

    pub fn with_span_timings(mut self, enabled: bool) -> Self {
        self.span_timings = enabled;
        self
    }
}

type Filtered = Layered<EnvFilter, Registry>;

type FormatLayer = Box<dyn Layer<Filtered> + Send + Sync>;

fn layered<W>(config: &LoggingConfig, filter: EnvFilter, writer: W) -> Layered<FormatLayer, Filtered>
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let span_events = if config.span_timings {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let layer: FormatLayer = match config.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_span_events(span_events)
            .with_target(true)
            .with_writer(writer)
            .boxed(),
        LogFormat::Text => fmt::layer()
            .with_ansi(false)
            .with_span_events(span_events)
            .with_target(true)
            .with_writer(writer)
            .boxed(),
    };

    tracing_subscriber::registry().with(filter).with(layer)
}

/// Builds a subscriber for `config` that writes to `writer`.
///
/// Filters at `config.default_level` and ignores `RUST_LOG`. Use it with
/// [`tracing::subscriber::set_default`] to capture logs for one thread.
pub fn build_subscriber<W>(config: &LoggingConfig, writer: W) -> impl Subscriber + Send + Sync
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(config.default_level).into())
        .parse_lossy("");
    layered(config, filter, writer)
}

/// Installs the process-wide subscriber described by `config`, writing to
/// stdout.
///
/// `RUST_LOG` wins over `config.default_level` when set. Returns `false` if
/// a global subscriber was already installed, in which case it is kept.
///
/// ```ignore
/// use coalescer::observability::{init_logging, LoggingConfig};
///
/// // Show every dispatched batch with its timing
/// init_logging(LoggingConfig::text().with_level(tracing::Level::DEBUG).with_span_timings(true));
/// ```
pub fn init_logging(config: LoggingConfig) -> bool {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(config.default_level).into())
        .from_env_lossy();

    let subscriber = layered(&config, filter, std::io::stdout);
    tracing::subscriber::set_global_default(subscriber).is_ok()
}
