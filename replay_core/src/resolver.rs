//! The "FRAME" Resolver - continuous logical time to recorded frame index
//!
//! Time is folded into one loop of the animation before rounding, so reverse
//! playback past `start` continues from the end of the loop instead of
//! freezing on frame 0:
//!
//! ```text
//!   offset = ((time - start) mod span + span) mod span
//!   frame  = round(offset / step)            (clamped to frame_count - 1)
//! ```
//!
//! Poses are never interpolated; the nearest recorded frame wins. Rounding is
//! half-to-even throughout, and `time == stop` wraps to frame 0 of the next
//! loop.

use crate::record::Timing;
use thiserror::Error;

/// Timing that should have been rejected at parse time reached the resolver.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidTimingError {
    #[error("Timing span is empty: stop {stop} <= start {start}")]
    EmptySpan { start: f64, stop: f64 },

    #[error("Step must be positive, got {0}")]
    NonPositiveStep(f64),

    #[error("Cannot resolve non-finite time {0}")]
    NonFiniteTime(f64),
}

/// Resolves `time` to the index of the nearest recorded frame.
///
/// Pure: the same `time` and `timing` always give the same index, and the
/// result is always in `0..timing.frame_count()`.
pub fn resolve(time: f64, timing: &Timing) -> Result<usize, InvalidTimingError> {
    let span = timing.stop - timing.start;
    if !(span > 0.0) || !span.is_finite() {
        return Err(InvalidTimingError::EmptySpan {
            start: timing.start,
            stop: timing.stop,
        });
    }
    if !(timing.step > 0.0) || !timing.step.is_finite() {
        return Err(InvalidTimingError::NonPositiveStep(timing.step));
    }
    if !time.is_finite() {
        return Err(InvalidTimingError::NonFiniteTime(time));
    }

    // offset < span, so rounding never passes round(span / step); the clamp
    // only guards hand-built timings.
    let offset = ((time - timing.start) % span + span) % span;
    let index = (offset / timing.step).round_ties_even() as usize;

    Ok(index.min(timing.frame_count() - 1))
}

/// Resolves `time` and returns the logical time of the chosen frame.
///
/// This quantized value, not the free-running clock, is what the time
/// display and scrubber show.
pub fn quantize(time: f64, timing: &Timing) -> Result<f64, InvalidTimingError> {
    resolve(time, timing).map(|frame| timing.time_of(frame))
}
