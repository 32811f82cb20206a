//! Metrics instrumentation for the client core.
//!
//! Uses the `metrics` facade; nothing is recorded until the host installs
//! a recorder (see the `wayfarer` binary).

use metrics::counter;

/// Metric names.
pub mod names {
    pub const FRAMES_TOTAL: &str = "wayfarer_frames_total";
    pub const MALFORMED_PAYLOADS_TOTAL: &str = "wayfarer_malformed_payloads_total";
    pub const EVENTS_TOTAL: &str = "wayfarer_events_total";
    pub const CONNECTIONS_TOTAL: &str = "wayfarer_connections_total";
    pub const SESSION_FLUSHES_TOTAL: &str = "wayfarer_session_flushes_total";
    pub const ERRORS_TOTAL: &str = "wayfarer_errors_total";
}

/// Describe all metrics.
pub fn describe() {
    metrics::describe_counter!(names::FRAMES_TOTAL, "Frames sent and received");
    metrics::describe_counter!(
        names::MALFORMED_PAYLOADS_TOTAL,
        "Inbound frames whose payload was not valid JSON"
    );
    metrics::describe_counter!(names::EVENTS_TOTAL, "Events appended to the log");
    metrics::describe_counter!(names::CONNECTIONS_TOTAL, "Connections opened");
    metrics::describe_counter!(
        names::SESSION_FLUSHES_TOTAL,
        "Session persistence attempts"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");
}

/// Record a frame.
pub fn record_frame(command: &str, direction: &'static str) {
    counter!(names::FRAMES_TOTAL, "command" => command.to_string(), "direction" => direction)
        .increment(1);
}

/// Record a recovered payload.
pub fn record_malformed() {
    counter!(names::MALFORMED_PAYLOADS_TOTAL).increment(1);
}

/// Record an appended event.
pub fn record_event(kind: &str) {
    counter!(names::EVENTS_TOTAL, "type" => kind.to_string()).increment(1);
}

/// Record an opened connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
}

/// Record a session flush.
pub fn record_session_flush(ok: bool) {
    let outcome = if ok { "ok" } else { "failed" };
    counter!(names::SESSION_FLUSHES_TOTAL, "outcome" => outcome).increment(1);
}

/// Record an error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder() {
        // Just test that it doesn't panic
        describe();
        record_frame("room", "outbound");
        record_session_flush(false);
    }
}
