//! Millisecond timings: unrounded in memory, two decimals on the wire.

use serde::Serializer;
use std::time::Instant;

/// Milliseconds since `start`, unrounded.
pub fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Round to two decimals for display.
pub fn round_ms(ms: f64) -> f64 {
    (ms * 100.0).round() / 100.0
}

/// `serialize_with` helper for timing fields.
pub fn serialize_ms<S: Serializer>(ms: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(round_ms(*ms))
}
