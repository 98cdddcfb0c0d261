//! Analytics event sink.
//!
//! Events are fire-and-forget: a name plus a parameter map. Where they end up
//! (pixels, logs, a collector) is the sink's business.

use std::sync::Arc;

/// Parameters attached to an analytics event.
pub type EventParams = serde_json::Map<String, serde_json::Value>;

/// Receiver of analytics events.
pub trait EventSink {
    /// Record an event. Must not fail or block on delivery.
    fn track(&self, event: &str, params: EventParams);
}

impl<T: EventSink + ?Sized> EventSink for &T {
    fn track(&self, event: &str, params: EventParams) {
        (**self).track(event, params);
    }
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn track(&self, event: &str, params: EventParams) {
        (**self).track(event, params);
    }
}

/// Build an [`EventParams`] map from a `serde_json::json!` object.
///
/// Non-object values produce an empty map.
#[must_use]
pub fn params(value: serde_json::Value) -> EventParams {
    match value {
        serde_json::Value::Object(map) => map,
        _ => EventParams::new(),
    }
}
