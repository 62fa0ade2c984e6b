//! EstimatedDays and EstimatedPrice rules.

use thiserror::Error;

/// Raised when a bounded estimate falls outside `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("estimate {value} lies outside [{min}, {max}]")]
pub struct OutOfRange {
    /// Proposed estimate.
    pub value: f64,
    /// Lower bound (MinDays).
    pub min: f64,
    /// Upper bound (MaxDays).
    pub max: f64,
}

/// `ceil((min + 4·real + 4·max) / 9)`.
pub fn weighted_estimated_days(min: f64, real: f64, max: f64) -> f64 {
    ((min + 4.0 * real + 4.0 * max) / 9.0).ceil()
}

/// Round a chosen estimate in `[min, max]`: down when it exceeds `real`, up otherwise.
pub fn bounded_estimated_days(
    min: f64,
    real: f64,
    max: f64,
    chosen: f64,
) -> Result<f64, OutOfRange> {
    if chosen < min || chosen > max || chosen.is_nan() {
        return Err(OutOfRange {
            value: chosen,
            min,
            max,
        });
    }
    Ok(if chosen > real {
        chosen.floor()
    } else {
        chosen.ceil()
    })
}

/// `days × rate`, or half the rate when no full day is estimated.
pub fn estimated_price(days: f64, rate: f64) -> f64 {
    if days == 0.0 { rate / 2.0 } else { days * rate }
}
