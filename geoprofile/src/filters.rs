//! Rounding and validity filters shared by the profile engine and the
//! single-point height query.

/// Treat missing or non-positive altitudes as invalid; round the rest to
/// 0.1 m (decimeter accuracy is enough for ground altitudes).
pub(crate) fn filter_altitude(altitude: Option<f64>) -> Option<f64> {
    match altitude {
        Some(a) if a > 0.0 => Some(round_to(a, 10.0)),
        _ => None,
    }
}

/// Running distances are reported with 0.1 m precision.
pub(crate) fn round_distance(distance: f64) -> f64 {
    round_to(distance, 10.0)
}

/// Coordinates are reported with millimeter precision.
pub(crate) fn round_coordinate(coordinate: f64) -> f64 {
    round_to(coordinate, 1000.0)
}

fn round_to(value: f64, scale: f64) -> f64 {
    (value * scale).round() / scale
}
