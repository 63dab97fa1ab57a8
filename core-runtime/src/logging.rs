//! # Logging
//!
//! `tracing-subscriber` setup for the push engine. Events are written to
//! stdout in one of three formats and, when the host supplies a
//! [`LoggerSink`], mirrored to it (a CMS admin log table, a journal, ...).
//!
//! Credentials never leave the process through the sink: fields whose name
//! suggests a secret are replaced, and values shaped like a GitHub token are
//! masked wherever they appear.
//!
//! ```ignore
//! use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
//! use bridge_traits::time::LogLevel;
//!
//! init_logging(
//!     LoggingConfig::default()
//!         .with_format(LogFormat::Compact)
//!         .with_level(LogLevel::Debug)
//!         .with_logger_sink(host_sink),
//! )?;
//!
//! tracing::info!(stage = "collecting_files", "Chunk finished");
//! ```

use crate::error::{Error, Result};

use bridge_traits::time::{LogEntry, LogLevel, LoggerSink};

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::{
    filter::EnvFilter,
    fmt::format::FmtSpan,
    layer::{Context, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
    Layer,
};

/// Crates that follow [`LoggingConfig::level`]; everything else stays at `warn`
const WORKSPACE_CRATES: &[&str] = &[
    "core_runtime",
    "core_sync",
    "core_service",
    "provider_github",
    "bridge_desktop",
];

const NOISY_DEPENDENCIES: &str = "h2=warn,hyper=warn,reqwest=warn,sqlx=warn";

const SENSITIVE_FIELD_NAMES: &[&str] = &["token", "password", "secret", "authorization"];

/// Prefixes GitHub puts on its credentials
const TOKEN_PREFIXES: &[&str] = &["ghp_", "gho_", "ghs_", "ghu_", "github_pat_"];

const REDACTED: &str = "[REDACTED]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, coloured
    Pretty,
    /// One JSON object per line
    Json,
    Compact,
}

impl Default for LogFormat {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

#[derive(Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: LogLevel,
    /// Full `EnvFilter` directive string; overrides `level` when set
    pub filter: Option<String>,
    pub logger_sink: Option<Arc<dyn LoggerSink>>,
    /// Log span open/close (pretty) or the span stack (JSON)
    pub enable_spans: bool,
    pub display_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: LogLevel::Info,
            filter: None,
            logger_sink: None,
            enable_spans: false,
            display_target: true,
        }
    }
}

impl LoggingConfig {
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_logger_sink(mut self, sink: Arc<dyn LoggerSink>) -> Self {
        self.logger_sink = Some(sink);
        self
    }

    pub fn with_spans(mut self, enable: bool) -> Self {
        self.enable_spans = enable;
        self
    }

    pub fn with_target(mut self, display: bool) -> Self {
        self.display_target = display;
        self
    }

    fn directives(&self) -> String {
        if let Some(filter) = &self.filter {
            return filter.clone();
        }

        let level = level_name(self.level);
        let mut directives = vec!["warn".to_string()];
        directives.extend(WORKSPACE_CRATES.iter().map(|c| format!("{}={}", c, level)));
        directives.push(NOISY_DEPENDENCIES.to_string());
        directives.join(",")
    }
}

/// Install the global subscriber. Only the first call in a process succeeds.
///
/// `RUST_LOG` takes precedence over the configured level when no explicit
/// filter was given.
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = match (&config.filter, std::env::var("RUST_LOG")) {
        (None, Ok(from_env)) if !from_env.trim().is_empty() => parse_filter(&from_env)?,
        _ => parse_filter(&config.directives())?,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(HostSinkLayer::new(config.logger_sink.clone()))
        .with(output_layer(&config))
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialize logging: {}", e)))
}

fn parse_filter(directives: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(directives).map_err(|e| Error::Config(format!("Invalid log filter: {}", e)))
}

fn output_layer<S>(config: &LoggingConfig) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_target(config.display_target)
        .with_writer(std::io::stdout);

    match config.format {
        LogFormat::Pretty => layer
            .pretty()
            .with_span_events(if config.enable_spans {
                FmtSpan::NEW | FmtSpan::CLOSE
            } else {
                FmtSpan::NONE
            })
            .boxed(),
        LogFormat::Json => layer
            .json()
            .flatten_event(true)
            .with_current_span(config.enable_spans)
            .with_span_list(config.enable_spans)
            .boxed(),
        LogFormat::Compact => layer.compact().boxed(),
    }
}

fn level_name(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Trace => "trace",
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    }
}

fn from_tracing(level: &tracing::Level) -> LogLevel {
    match *level {
        tracing::Level::TRACE => LogLevel::Trace,
        tracing::Level::DEBUG => LogLevel::Debug,
        tracing::Level::INFO => LogLevel::Info,
        tracing::Level::WARN => LogLevel::Warn,
        tracing::Level::ERROR => LogLevel::Error,
    }
}

/// Mirrors events into the host's [`LoggerSink`]
struct HostSinkLayer {
    sink: Option<Arc<dyn LoggerSink>>,
}

impl HostSinkLayer {
    fn new(sink: Option<Arc<dyn LoggerSink>>) -> Self {
        Self { sink }
    }

    fn deliver(sink: Arc<dyn LoggerSink>, entry: LogEntry) {
        let send = async move {
            if let Err(e) = sink.log(entry).await {
                eprintln!("LoggerSink error: {}", e);
            }
        };

        // The sink is async; outside a runtime there is nothing to spawn onto.
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(send);
            }
            Err(_) => futures::executor::block_on(send),
        }
    }
}

impl<S> Layer<S> for HostSinkLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let Some(sink) = &self.sink else {
            return;
        };

        let metadata = event.metadata();
        let level = from_tracing(metadata.level());
        if level < sink.min_level() {
            return;
        }

        let mut fields = FieldCollector::default();
        event.record(&mut fields);

        let message = fields
            .message
            .map(|m| redact_value(&m).into_owned())
            .unwrap_or_else(|| metadata.name().to_string());
        let mut entry = LogEntry::new(level, metadata.target(), message);
        for (name, value) in fields.values {
            let value = redact_if_sensitive(&name, &value);
            entry = entry.with_field(name, value);
        }
        if let Some(span) = ctx.lookup_current() {
            entry = entry.with_field("span", span.name());
        }

        Self::deliver(Arc::clone(sink), entry);
    }
}

#[derive(Default)]
struct FieldCollector {
    message: Option<String>,
    values: HashMap<String, String>,
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.record_debug(field, &format_args!("{}", value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.record_debug(field, &format_args!("{}", value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let rendered = format!("{:?}", value);
        match field.name() {
            "message" => self.message = Some(rendered),
            name => {
                self.values.insert(name.to_string(), rendered);
            }
        }
    }
}

/// Value to log for field `name`: fully replaced if the name looks like a
/// credential, otherwise with any token-shaped words masked.
pub fn redact_if_sensitive(name: &str, value: &str) -> String {
    let lowered = name.to_ascii_lowercase();
    if SENSITIVE_FIELD_NAMES.iter().any(|s| lowered.contains(s)) {
        return REDACTED.to_string();
    }
    redact_value(value).into_owned()
}

fn redact_value(value: &str) -> Cow<'_, str> {
    let looks_like_token = |word: &str| TOKEN_PREFIXES.iter().any(|p| word.starts_with(p));
    if !value.split_whitespace().any(looks_like_token) {
        return Cow::Borrowed(value);
    }

    let masked: Vec<String> = value
        .split_whitespace()
        .map(|word| {
            if looks_like_token(word) {
                mask_token(word)
            } else {
                word.to_string()
            }
        })
        .collect();
    Cow::Owned(masked.join(" "))
}

/// Displayable stand-in for a credential: recognisable prefix plus length.
///
/// `ghp_abcdef123456` becomes `ghp_…(16 chars)`.
pub fn mask_token(token: &str) -> String {
    let prefix = TOKEN_PREFIXES
        .iter()
        .find(|p| token.starts_with(*p))
        .copied()
        .unwrap_or("");
    format!("{}…({} chars)", prefix, token.chars().count())
}
