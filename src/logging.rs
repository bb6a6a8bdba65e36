//! Log output setup
//!
//! Library code only emits `tracing` events. Where they end up is decided
//! here: the CLI installs a formatted stderr subscriber, firmware builds can
//! route every event to their own console through a [`LogSink`].

use std::fmt::{self, Write as _};
use std::sync::Arc;

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as tfmt, EnvFilter, Layer};

use crate::error::Result;

/// Install the stderr subscriber
///
/// `verbosity` maps 0=warn, 1=info, 2=debug, 3+=trace. `RUST_LOG` wins
/// when set.
pub fn init_logging(verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("picoguard={}", level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(tfmt::layer().with_target(false))
        .try_init()
        .map_err(|e| std::io::Error::other(e.to_string()))?;

    Ok(())
}

/// Receives one rendered line per log event
pub trait LogSink: Send + Sync + 'static {
    fn log(&self, level: Level, message: &str);
}

impl<T: LogSink> LogSink for Arc<T> {
    fn log(&self, level: Level, message: &str) {
        (**self).log(level, message)
    }
}

/// Forwards every event to a [`LogSink`]
pub struct SinkLayer<K> {
    sink: K,
}

impl<K: LogSink> SinkLayer<K> {
    pub fn new(sink: K) -> Self {
        Self { sink }
    }
}

impl<S, K> Layer<S> for SinkLayer<K>
where
    S: Subscriber,
    K: LogSink,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut line = LineVisitor::default();
        event.record(&mut line);
        self.sink.log(*event.metadata().level(), &line.finish());
    }
}

/// Renders the message first, then `key=value` for every other field
#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl LineVisitor {
    fn finish(mut self) -> String {
        if !self.fields.is_empty() {
            if !self.message.is_empty() {
                self.message.push(' ');
            }
            self.message.push_str(&self.fields);
        }
        self.message
    }

    fn push_field(&mut self, field: &Field, value: fmt::Arguments<'_>) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{}={}", field.name(), value);
    }
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            self.push_field(field, format_args!("{}", value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            self.push_field(field, format_args!("{:?}", value));
        }
    }
}
