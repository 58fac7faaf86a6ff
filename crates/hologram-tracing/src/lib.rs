//! Shared tracing configuration for the hologram interop workspace.
//!
//! Executables, integration tests and benchmarks install their `tracing`
//! subscriber through this crate so that filters, output format and field
//! redaction behave the same everywhere. Native handles show up as span and
//! event fields (`native`, `program`, `kernel`, ...); list them in
//! `HOLOGRAM_TRACING_REDACT_FIELDS` to keep them out of shared logs.

pub mod timing;

pub use timing::{import_timing_threshold_us, set_import_timing_threshold_us, ImportTimer};
pub use tracing::{debug, error, info, trace, warn};

use std::collections::HashSet;
use std::error::Error;
use std::sync::Arc;
use std::{env, fmt};
use tracing::field::{Field, Visit};
use tracing::Subscriber;
use tracing_subscriber::field::RecordFields;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as tracing_fmt, EnvFilter, Registry};

/// Subscriber settings shared by binaries, tests and benchmarks
#[derive(Clone, Debug)]
pub struct TracingConfig {
    /// Filter directives such as `hologram_interop=debug,info`; `None`
    /// defers to `RUST_LOG`, then to `default_directive`
    pub directives: Option<String>,
    pub default_directive: String,
    /// Print event targets (module paths)
    pub include_targets: bool,
    pub ansi: bool,
    /// Span lifecycle events to report
    pub span_events: FmtSpan,
    pub output: TracingOutput,
    /// Fields whose values are masked in text output
    pub redacted_fields: Vec<String>,
    pub redaction_text: String,
    /// Shortest [`ImportTimer`] duration to report, in microseconds; `None`
    /// disables the threshold
    pub import_timing_threshold_us: Option<u64>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self::for_local()
    }
}

impl TracingConfig {
    /// Interactive use: pretty, coloured, `info` and up
    pub fn for_local() -> Self {
        TracingConfig {
            directives: None,
            default_directive: String::from("info"),
            include_targets: true,
            ansi: true,
            span_events: FmtSpan::NONE,
            output: TracingOutput::Pretty,
            redacted_fields: vec![],
            redaction_text: String::from("***REDACTED***"),
            import_timing_threshold_us: None,
        }
    }

    /// CI or log collection: JSON, no ANSI, native handles redacted.
    pub fn for_ci() -> Self {
        Self {
            ansi: false,
            output: TracingOutput::Json,
            redacted_fields: vec!["native".to_string()],
            ..Self::for_local()
        }
    }

    /// Following one import through the reconciler.
    ///
    /// Enables debug output for the interop crates, trace output for native
    /// calls, and span close events so every entry point reports its
    /// duration.
    pub fn for_import_debugging() -> Self {
        Self {
            directives: Some("hologram_interop=debug,hologram_native=trace".to_string()),
            ansi: false,
            span_events: FmtSpan::CLOSE,
            output: TracingOutput::Compact,
            import_timing_threshold_us: Some(0),
            ..Self::for_local()
        }
    }

    /// Configuration chosen by environment variables
    ///
    /// # Environment Variables
    ///
    /// - `HOLOGRAM_TRACING_PROFILE` - `local` (default), `ci` or `import`
    /// - `HOLOGRAM_TRACING_DIRECTIVES` - filter directives, overriding the profile's
    /// - `HOLOGRAM_TRACING_FORMAT` - `pretty`, `compact` or `json`
    /// - `HOLOGRAM_TRACING_REDACT_FIELDS` - comma-separated field names to redact
    /// - `HOLOGRAM_TRACING_REDACT_TOKEN` - text printed in place of redacted values
    /// - `HOLOGRAM_IMPORT_TIMING_THRESHOLD_US` - shortest import worth reporting
    ///
    /// Blank and unparsable values are ignored.
    pub fn from_env() -> Self {
        let mut config = match env_value("HOLOGRAM_TRACING_PROFILE")
            .map(|profile| profile.to_ascii_lowercase())
            .as_deref()
        {
            Some("ci") => Self::for_ci(),
            Some("import") => Self::for_import_debugging(),
            _ => Self::for_local(),
        };

        if let Some(directives) = env_value("HOLOGRAM_TRACING_DIRECTIVES") {
            config.directives = Some(directives);
        }
        if let Some(output) = env_value("HOLOGRAM_TRACING_FORMAT").and_then(|v| TracingOutput::from_env_value(&v)) {
            config.ansi &= output != TracingOutput::Json;
            config.output = output;
        }
        if let Some(fields) = env_value("HOLOGRAM_TRACING_REDACT_FIELDS") {
            let fields: Vec<String> = fields
                .split(',')
                .map(str::trim)
                .filter(|field| !field.is_empty())
                .map(String::from)
                .collect();
            if !fields.is_empty() {
                config.redacted_fields = fields;
            }
        }
        if let Some(token) = env_value("HOLOGRAM_TRACING_REDACT_TOKEN") {
            config.redaction_text = token;
        }
        if let Some(threshold) = env_value("HOLOGRAM_IMPORT_TIMING_THRESHOLD_US") {
            config.import_timing_threshold_us = threshold.parse().ok().or(config.import_timing_threshold_us);
        }

        config
    }

    /// Explicit directives, else `RUST_LOG`, else the default directive
    fn resolve_filter(&self) -> Result<EnvFilter, TracingSetupError> {
        match &self.directives {
            Some(directives) => {
                EnvFilter::try_new(directives).map_err(|err| TracingSetupError::InvalidFilter(err.to_string()))
            }
            None => Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_directive))),
        }
    }
}

/// Trimmed value of `key`, `None` when unset or blank
fn env_value(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Tracing subscriber setup failures
#[derive(Debug, thiserror::Error)]
pub enum TracingSetupError {
    #[error("invalid tracing directive: {0}")]
    InvalidFilter(String),

    /// Usually another subscriber is already installed
    #[error("failed to install global tracing subscriber: {0}")]
    SubscriberInit(#[source] tracing_subscriber::util::TryInitError),
}

/// Build a `tracing` subscriber using the provided configuration.
pub fn build_subscriber(config: &TracingConfig) -> Result<impl Subscriber + Send + Sync, TracingSetupError> {
    let filter = config.resolve_filter()?;
    Ok(Registry::default().with(format_layer(config)).with(filter))
}

/// Text layer of the given style, with redacting field formatting when configured
macro_rules! text_layer {
    ($config:expr, $style:ident) => {{
        let layer = tracing_fmt::layer()
            .$style()
            .with_target($config.include_targets)
            .with_ansi($config.ansi)
            .with_span_events($config.span_events.clone());
        let boxed: Box<dyn Layer<Registry> + Send + Sync> = match TextRedactingFields::from_config($config) {
            Some(fields) => Box::new(layer.fmt_fields(fields)),
            None => Box::new(layer),
        };
        boxed
    }};
}

fn format_layer(config: &TracingConfig) -> Box<dyn Layer<Registry> + Send + Sync> {
    match config.output {
        TracingOutput::Compact => text_layer!(config, compact),
        TracingOutput::Pretty => text_layer!(config, pretty),
        // JSON fields are structured; redaction applies to text output only.
        TracingOutput::Json => Box::new(
            tracing_fmt::layer()
                .json()
                .with_target(config.include_targets)
                .with_span_events(config.span_events.clone())
                .with_ansi(false),
        ),
    }
}

/// Install the configured subscriber as the process-wide default
///
/// Also applies the configured import timing threshold.
pub fn init_global_tracing(config: &TracingConfig) -> Result<(), TracingSetupError> {
    set_import_timing_threshold_us(config.import_timing_threshold_us);
    build_subscriber(config)?
        .try_init()
        .map_err(TracingSetupError::SubscriberInit)
}

/// Install a subscriber writing through the test harness' captured output
///
/// Safe to call from every test; only the first call installs anything.
/// Honours `RUST_LOG`, defaulting to `debug` for the interop crates.
pub fn init_test_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("hologram_interop=debug,hologram_native=debug"));
    let _ = tracing_fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .with_ansi(false)
        .try_init();
}

/// Field formatter that masks the values of selected fields
#[derive(Clone)]
struct TextRedactingFields {
    redacted: Arc<HashSet<String>>,
    replacement: Arc<str>,
}

impl TextRedactingFields {
    fn from_config(config: &TracingConfig) -> Option<Self> {
        (!config.redacted_fields.is_empty()).then(|| Self {
            redacted: Arc::new(config.redacted_fields.iter().cloned().collect()),
            replacement: Arc::from(config.redaction_text.as_str()),
        })
    }
}

impl<'writer> tracing_subscriber::fmt::FormatFields<'writer> for TextRedactingFields {
    fn format_fields<R>(&self, mut writer: tracing_subscriber::fmt::format::Writer<'writer>, fields: R) -> fmt::Result
    where
        R: RecordFields,
    {
        let mut collector = TextFieldCollector {
            rendered: Vec::new(),
            redacted: &self.redacted,
            replacement: &self.replacement,
        };
        fields.record(&mut collector);
        writer.write_str(&collector.rendered.join(" "))
    }
}

/// Renders each field as `name=value`, the message bare
struct TextFieldCollector<'a> {
    rendered: Vec<String>,
    redacted: &'a HashSet<String>,
    replacement: &'a str,
}

impl TextFieldCollector<'_> {
    fn push(&mut self, field: &Field, value: impl FnOnce() -> String) {
        let value = if self.redacted.contains(field.name()) {
            format!("{:?}", self.replacement)
        } else {
            value()
        };
        self.rendered.push(match field.name() {
            "message" => value,
            name => format!("{name}={value}"),
        });
    }
}

impl Visit for TextFieldCollector<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.push(field, || format!("{value:?}"));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, || value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, || value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, || value.to_string());
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, || format!("{value:?}"));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn Error + 'static)) {
        self.push(field, || value.to_string());
    }
}

/// Formatter layer output
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TracingOutput {
    /// Single line per event
    Compact,
    /// Multi-line, human oriented
    Pretty,
    /// One JSON object per event
    Json,
}

impl TracingOutput {
    fn from_env_value(value: &str) -> Option<Self> {
        [Self::Compact, Self::Pretty, Self::Json]
            .into_iter()
            .find(|output| value.trim().eq_ignore_ascii_case(output.name()))
    }

    fn name(self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}
