//! Progress arithmetic shared by every progress source.
//!
//! All values are whole percentages in `0..=100`, truncated toward zero.

use std::time::Duration;

/// Progress value once a job has fully completed.
pub const PROGRESS_COMPLETE: u8 = 100;

/// Clamp an arbitrary percentage into `0..=100`, truncating the fraction.
///
/// `NaN` maps to 0.
pub fn clamp_percent(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.clamp(0.0, f64::from(PROGRESS_COMPLETE)).floor() as u8
}

/// Progress of a time-based source: elapsed output time over total duration.
///
/// An unknown (zero or negative) duration reports 0 until completion.
pub fn percent_from_elapsed(elapsed: Duration, total_secs: f64) -> u8 {
    if total_secs <= 0.0 || !total_secs.is_finite() {
        return 0;
    }
    clamp_percent(elapsed.as_secs_f64() / total_secs * 100.0)
}

/// Progress of a frame-based source: `floor(done / total * 100)`, computed in
/// integers so no rounding error can push a value past the exact floor.
///
/// An unknown (zero) total reports 0 until completion.
pub fn percent_from_frames(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let percent = u128::from(done) * 100 / u128::from(total);
    percent.min(u128::from(PROGRESS_COMPLETE)) as u8
}
