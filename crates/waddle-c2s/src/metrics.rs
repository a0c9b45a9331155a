//! C2S session metrics.
//!
//! Uses the global OpenTelemetry meter provider which must be initialized
//! by the host application. Without one, every instrument is a no-op.

use opentelemetry::metrics::{Counter, Meter, UpDownCounter};
use opentelemetry::KeyValue;
use std::sync::OnceLock;

use crate::error::SessionError;
use crate::types::TransportKind;

static METER: OnceLock<Meter> = OnceLock::new();

fn meter() -> &'static Meter {
    METER.get_or_init(|| opentelemetry::global::meter("waddle-c2s"))
}

// ============================================================================
// Instruments
// ============================================================================

/// Counter for sessions created.
pub fn sessions_created() -> Counter<u64> {
    meter()
        .u64_counter("xmpp.c2s.sessions.created")
        .with_description("Total C2S sessions created")
        .with_unit("session")
        .build()
}

/// Up/down counter for live sessions.
pub fn sessions_active() -> UpDownCounter<i64> {
    meter()
        .i64_up_down_counter("xmpp.c2s.sessions.active")
        .with_description("Current number of live C2S sessions")
        .with_unit("session")
        .build()
}

/// Counter for stanzas crossing a session.
pub fn stanzas_relayed() -> Counter<u64> {
    meter()
        .u64_counter("xmpp.c2s.stanzas")
        .with_description("Total stanzas relayed by C2S sessions")
        .with_unit("stanza")
        .build()
}

/// Counter for session errors.
pub fn session_errors() -> Counter<u64> {
    meter()
        .u64_counter("xmpp.c2s.errors")
        .with_description("Total C2S session errors")
        .with_unit("error")
        .build()
}

/// Counter for authentication attempts.
pub fn auth_attempts() -> Counter<u64> {
    meter()
        .u64_counter("xmpp.auth.attempts")
        .with_description("Total authentication attempts")
        .with_unit("attempt")
        .build()
}

// ============================================================================
// Metric Recording Helpers
// ============================================================================

/// Record a session being created.
pub fn record_session_created(transport: TransportKind) {
    let attrs = [KeyValue::new("transport", transport.to_string())];
    sessions_created().add(1, &attrs);
    sessions_active().add(1, &attrs);
}

/// Record a session being dropped.
pub fn record_session_dropped(transport: TransportKind) {
    sessions_active().add(-1, &[KeyValue::new("transport", transport.to_string())]);
}

/// Record a stanza crossing a session.
pub fn record_stanza(stanza_type: &'static str, direction: &'static str) {
    stanzas_relayed().add(
        1,
        &[
            KeyValue::new("type", stanza_type),
            KeyValue::new("direction", direction),
        ],
    );
}

/// Record a session error.
pub fn record_session_error(error: &SessionError) {
    session_errors().add(
        1,
        &[
            KeyValue::new("kind", error.branch()),
            KeyValue::new("code", error.code()),
        ],
    );
}

/// Record an authentication attempt.
///
/// `mechanism` comes from the client, so only offered mechanisms are kept as
/// label values.
pub fn record_auth_attempt(mechanism: &str, success: bool) {
    auth_attempts().add(
        1,
        &[
            KeyValue::new("mechanism", mechanism_label(mechanism)),
            KeyValue::new("result", if success { "success" } else { "failure" }),
        ],
    );
}

fn mechanism_label(mechanism: &str) -> &'static str {
    match mechanism {
        "PLAIN" => "PLAIN",
        _ => "other",
    }
}
