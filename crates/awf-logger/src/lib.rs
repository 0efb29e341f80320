//! Structured JSON event logging.
//!
//! A `tracing_subscriber::Layer` that renders each event as a single
//! newline-delimited JSON object on standard output,
//! `{timestamp, level, event, ...fields}`, matching the call-site
//! convention already in use (`event = "..."`, `request_id = %request_id`,
//! and so on).
//!
//! Fields are only included when the call site passes them, so "omit
//! undefined fields" is satisfied by callers simply not passing an absent
//! value rather than by any logic here.

use serde_json::{json, Map, Value};
use time::OffsetDateTime;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

#[derive(Default)]
struct JsonVisitor {
    fields: Map<String, Value>,
}

impl Visit for JsonVisitor {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), json!(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), json!(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), json!(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), json!(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.fields.insert(field.name().to_string(), json!(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.fields
            .insert(field.name().to_string(), json!(format!("{value:?}")));
    }
}

fn level_str(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "error",
        Level::WARN => "warn",
        _ => "info",
    }
}

/// `YYYY-MM-DDTHH:MM:SS.sssZ`, millisecond precision, always UTC.
fn format_timestamp(dt: OffsetDateTime) -> String {
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
        dt.year(),
        dt.month() as u8,
        dt.day(),
        dt.hour(),
        dt.minute(),
        dt.second(),
        dt.millisecond(),
    )
}

fn render(level: &Level, fields: Map<String, Value>, metadata_name: &str) -> Value {
    let mut out = Map::new();
    out.insert(
        "timestamp".to_string(),
        json!(format_timestamp(OffsetDateTime::now_utc())),
    );
    out.insert("level".to_string(), json!(level_str(level)));
    if !fields.contains_key("event") {
        out.insert("event".to_string(), json!(metadata_name));
    }
    for (k, v) in fields {
        out.insert(k, v);
    }
    Value::Object(out)
}

/// Renders every event on the default subscriber as one JSON line to stdout.
pub struct JsonEventLayer;

impl<S: Subscriber> Layer<S> for JsonEventLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);
        let line = render(event.metadata().level(), visitor.fields, event.metadata().name());
        println!("{line}");
    }
}

/// Installs the JSON layer as the global default subscriber. Idempotent:
/// a second call is a no-op rather than a panic, so tests and the binary can
/// both call it freely.
pub fn init() {
    use tracing_subscriber::prelude::*;
    let _ = tracing_subscriber::registry().with(JsonEventLayer).try_init();
}
