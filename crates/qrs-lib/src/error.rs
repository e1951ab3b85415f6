use thiserror::Error;

/// Hard failures of the detection pipeline.
///
/// Only structurally invalid input or configuration ends up here. Flat or
/// noisy recordings are not errors: they come back as a result with no beats.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectionError {
    #[error("time series is empty")]
    EmptySignal,
    #[error("column length mismatch: {time} time values, {amplitude} amplitude values")]
    ColumnLengthMismatch { time: usize, amplitude: usize },
    #[error("time column decreases at sample {index}")]
    NonMonotonicTime { index: usize },
    #[error("sample {index} is not a finite number")]
    NonFiniteSample { index: usize },
    #[error("sampling rate cannot be derived from the time column (need at least two distinct timestamps)")]
    UnderivableSamplingRate,
    #[error("sampling rate {supplied} disagrees with the {derived:.3} samples/s implied by the time column")]
    SamplingRateMismatch { supplied: f64, derived: f64 },
    #[error("sampling rate must be positive and finite, got {0}")]
    InvalidSamplingRate(f64),
    #[error("findpeaks limit must be positive and finite, got {0}")]
    InvalidFindpeaksLimit(f64),
    #[error("invalid pipeline parameter {name}: {value}")]
    InvalidParameter { name: &'static str, value: f64 },
}
