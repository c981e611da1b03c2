//! c2s metrics for observability.
//!
//! Uses the global OpenTelemetry meter provider, which must be installed by
//! the host application. Without one every instrument is a no-op.

use opentelemetry::metrics::{Counter, Meter};
use opentelemetry::KeyValue;
use std::sync::OnceLock;

static METER: OnceLock<Meter> = OnceLock::new();

fn meter() -> &'static Meter {
    METER.get_or_init(|| opentelemetry::global::meter("mesh-c2s"))
}

// ============================================================================
// Counters (Cumulative)
// ============================================================================

/// Counter for stanzas dispatched to a handler.
pub fn stanzas_dispatched() -> Counter<u64> {
    meter()
        .u64_counter("c2s.stanzas.dispatched")
        .with_description("Total inbound stanzas claimed by a c2s handler")
        .with_unit("stanza")
        .build()
}

/// Counter for offline messages replayed to a reconnecting user.
pub fn offline_flushed() -> Counter<u64> {
    meter()
        .u64_counter("c2s.offline.flushed")
        .with_description("Total offline messages delivered on presence")
        .with_unit("message")
        .build()
}

/// Counter for offline messages removed from storage.
pub fn offline_retracted() -> Counter<u64> {
    meter()
        .u64_counter("c2s.offline.retracted")
        .with_description("Total offline messages deleted from storage")
        .with_unit("message")
        .build()
}

/// Counter for probe responses sent.
pub fn probe_responses() -> Counter<u64> {
    meter()
        .u64_counter("c2s.probe.responses")
        .with_description("Total presence probe responses sent")
        .with_unit("stanza")
        .build()
}

/// Counter for stanzas the router refused.
pub fn delivery_failures() -> Counter<u64> {
    meter()
        .u64_counter("c2s.delivery.failures")
        .with_description("Total outbound stanzas that could not be routed")
        .with_unit("stanza")
        .build()
}

// ============================================================================
// Metric Recording Helpers
// ============================================================================

/// Record a stanza claimed by a route.
pub fn record_dispatch(route: &str) {
    stanzas_dispatched().add(1, &[KeyValue::new("route", route.to_string())]);
}

/// Record an offline message delivery attempt.
pub fn record_offline_flush(deferred: bool) {
    offline_flushed().add(
        1,
        &[KeyValue::new(
            "retraction",
            if deferred { "deferred" } else { "immediate" },
        )],
    );
}

/// Record an offline message deletion.
pub fn record_offline_retraction(reason: &'static str) {
    offline_retracted().add(1, &[KeyValue::new("reason", reason)]);
}

/// Record probe responses for one probe.
pub fn record_probe_responses(count: usize, found: bool) {
    probe_responses().add(
        count as u64,
        &[KeyValue::new("result", if found { "found" } else { "not-found" })],
    );
}

/// Record a routing failure.
pub fn record_delivery_failure(stanza_type: &str) {
    delivery_failures().add(1, &[KeyValue::new("type", stanza_type.to_string())]);
}
