//! Server-side analytics sink.
//!
//! Browser pixels are not this service's business; events are logged as
//! structured `tracing` records and left as Sentry breadcrumbs so an error
//! report shows the funnel trail that led to it.

use sweetbox_core::{EventParams, EventSink};

/// Logs analytics events and records them as Sentry breadcrumbs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn track(&self, event: &str, params: EventParams) {
        let payload = serde_json::Value::Object(params.clone());
        tracing::info!(target: "sweetbox_landing::events", event, params = %payload, "Analytics event");

        sentry::add_breadcrumb(sentry::Breadcrumb {
            category: Some("analytics".to_string()),
            message: Some(event.to_string()),
            level: sentry::Level::Info,
            data: params.into_iter().collect(),
            ..Default::default()
        });
    }
}
