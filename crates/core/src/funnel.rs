//! Monotonic funnel stage tracker.
//!
//! Tracks the furthest stage a visitor has reached. The persisted stage only
//! ever moves forward; attempts to set an earlier or equal stage, or a stage
//! name outside the funnel, are silently ignored.
//!
//! Persistence and analytics are injected ([`StageStore`], [`EventSink`]) so the
//! tracker works the same over a cookie jar, a session, or a test double.

use std::time::Duration;

use rust_decimal::Decimal;
use serde_json::json;

use crate::events::{EventParams, EventSink, params};
use crate::types::FunnelStage;

/// How long a persisted stage lives (30 days).
pub const FUNNEL_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Analytics event emitted on every real advance.
pub const FUNNEL_EVENT: &str = "funnel_step";

/// Persistence for the visitor's furthest stage.
pub trait StageStore {
    /// The persisted stage, or `None` if nothing (valid) is stored.
    fn load(&self) -> Option<FunnelStage>;

    /// Persist `stage` for `ttl`.
    fn persist(&mut self, stage: FunnelStage, ttl: Duration);
}

/// Funnel tracker bound to one visitor's store.
#[derive(Debug)]
pub struct FunnelTracker<S, E> {
    store: S,
    sink: E,
    current: FunnelStage,
}

impl<S: StageStore, E: EventSink> FunnelTracker<S, E> {
    /// Create a tracker, reading the persisted stage once.
    pub fn new(store: S, sink: E) -> Self {
        let current = store.load().unwrap_or_default();
        Self {
            store,
            sink,
            current,
        }
    }

    /// The furthest stage reached, `landing` if none was persisted.
    #[must_use]
    pub const fn current_stage(&self) -> FunnelStage {
        self.current
    }

    /// The event sink this tracker reports to.
    pub const fn events(&self) -> &E {
        &self.sink
    }

    /// Consume the tracker and hand back its store.
    pub fn into_store(self) -> S {
        self.store
    }

    /// Advance to `stage` if it lies strictly beyond the current stage.
    ///
    /// On a real advance the stage is persisted and a `funnel_step` event is
    /// emitted with `step`, `step_number` and every entry of `data`.
    pub fn advance_step(&mut self, stage: FunnelStage, data: EventParams) {
        if stage.ordinal() <= self.current.ordinal() {
            return;
        }

        self.current = stage;
        self.store.persist(stage, FUNNEL_TTL);

        let mut event = params(json!({
            "step": stage.as_str(),
            "step_number": stage.step_number(),
        }));
        event.extend(data);
        self.sink.track(FUNNEL_EVENT, event);
    }

    /// Advance by stage name. Names outside the funnel are a no-op.
    pub fn advance_named(&mut self, name: &str, data: EventParams) {
        if let Ok(stage) = name.parse::<FunnelStage>() {
            self.advance_step(stage, data);
        }
    }

    /// Visitor showed interest in an item.
    pub fn track_interest(&mut self, item: &str) {
        self.advance_step(FunnelStage::Interest, params(json!({ "product": item })));
    }

    /// Visitor left an email address.
    pub fn track_email_capture(&mut self, email: &str) {
        self.advance_step(FunnelStage::EmailCapture, params(json!({ "email": email })));
    }

    /// Visitor converted for `value` in `currency`.
    pub fn track_conversion(&mut self, value: Decimal, currency: &str) {
        self.advance_step(
            FunnelStage::Conversion,
            params(json!({ "value": value, "currency": currency })),
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    #[derive(Default)]
    struct MemoryStore {
        stage: Option<FunnelStage>,
        writes: Vec<(FunnelStage, Duration)>,
    }

    impl StageStore for MemoryStore {
        fn load(&self) -> Option<FunnelStage> {
            self.stage
        }

        fn persist(&mut self, stage: FunnelStage, ttl: Duration) {
            self.stage = Some(stage);
            self.writes.push((stage, ttl));
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        events: RefCell<Vec<(String, EventParams)>>,
    }

    impl EventSink for RecordingSink {
        fn track(&self, event: &str, params: EventParams) {
            self.events.borrow_mut().push((event.to_string(), params));
        }
    }

    #[test]
    fn test_defaults_to_landing() {
        let sink = RecordingSink::default();
        let tracker = FunnelTracker::new(MemoryStore::default(), &sink);
        assert_eq!(tracker.current_stage(), FunnelStage::Landing);
    }

    #[test]
    fn test_advance_persists_and_emits() {
        let sink = RecordingSink::default();
        let mut tracker = FunnelTracker::new(MemoryStore::default(), &sink);

        tracker.track_email_capture("a@b.com");

        assert_eq!(tracker.current_stage(), FunnelStage::EmailCapture);
        let store = tracker.into_store();
        assert_eq!(store.writes, vec![(FunnelStage::EmailCapture, FUNNEL_TTL)]);

        let events = sink.events.borrow();
        assert_eq!(events.len(), 1);
        let (name, params) = &events[0];
        assert_eq!(name, FUNNEL_EVENT);
        assert_eq!(params["step"], "email_capture");
        assert_eq!(params["step_number"], 3);
        assert_eq!(params["email"], "a@b.com");
    }

    #[test]
    fn test_never_regresses() {
        let sink = RecordingSink::default();
        let mut tracker = FunnelTracker::new(MemoryStore::default(), &sink);

        for later in FunnelStage::ALL {
            for earlier in FunnelStage::ALL {
                if earlier.ordinal() > later.ordinal() {
                    continue;
                }
                tracker.advance_step(later, EventParams::new());
                tracker.advance_step(earlier, EventParams::new());
                assert!(tracker.current_stage() >= later);
            }
        }

        assert_eq!(tracker.current_stage(), FunnelStage::Conversion);
        // landing is never an advance; the other three advance once each
        assert_eq!(sink.events.borrow().len(), 3);
    }

    #[test]
    fn test_equal_stage_is_noop() {
        let sink = RecordingSink::default();
        let store = MemoryStore {
            stage: Some(FunnelStage::Interest),
            ..MemoryStore::default()
        };
        let mut tracker = FunnelTracker::new(store, &sink);

        tracker.track_interest("dubai-chocolate");

        assert!(sink.events.borrow().is_empty());
        assert!(tracker.into_store().writes.is_empty());
    }

    #[test]
    fn test_unknown_name_is_silent_noop() {
        let sink = RecordingSink::default();
        let mut tracker = FunnelTracker::new(MemoryStore::default(), &sink);

        tracker.advance_named("checkout", EventParams::new());

        assert_eq!(tracker.current_stage(), FunnelStage::Landing);
        assert!(sink.events.borrow().is_empty());
    }

    #[test]
    fn test_conversion_payload() {
        let sink = RecordingSink::default();
        let mut tracker = FunnelTracker::new(MemoryStore::default(), &sink);

        tracker.track_conversion(Decimal::new(1999, 2), "EUR");

        let events = sink.events.borrow();
        let (_, params) = &events[0];
        assert_eq!(params["step_number"], 4);
        assert_eq!(params["currency"], "EUR");
        assert_eq!(params["value"], "19.99");
    }
}
