use crate::error::DetectionError;
use serde::{Deserialize, Serialize};

/// One row of a two-column ECG export.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub time: f64,
    pub amplitude: f64,
}

/// Unit of the time column, used when the sampling rate is derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    #[default]
    Seconds,
    Milliseconds,
}

impl TimeUnit {
    pub fn seconds_per_unit(self) -> f64 {
        match self {
            TimeUnit::Seconds => 1.0,
            TimeUnit::Milliseconds => 1e-3,
        }
    }
}

/// Largest relative gap tolerated between a supplied and a derived rate.
const RATE_TOLERANCE: f64 = 0.01;

/// Validated ECG time series: elapsed time plus raw amplitude per sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recording {
    time: Vec<f64>,
    amplitude: Vec<f64>,
}

impl Recording {
    /// Build a recording from its two columns.
    ///
    /// Rejects empty input, columns of different length, non-finite values
    /// and a time column that ever decreases.
    pub fn from_columns(time: Vec<f64>, amplitude: Vec<f64>) -> Result<Self, DetectionError> {
        if time.len() != amplitude.len() {
            return Err(DetectionError::ColumnLengthMismatch {
                time: time.len(),
                amplitude: amplitude.len(),
            });
        }
        if amplitude.is_empty() {
            return Err(DetectionError::EmptySignal);
        }
        for (index, (t, a)) in time.iter().zip(&amplitude).enumerate() {
            if !t.is_finite() || !a.is_finite() {
                return Err(DetectionError::NonFiniteSample { index });
            }
            if index > 0 && *t < time[index - 1] {
                return Err(DetectionError::NonMonotonicTime { index });
            }
        }
        Ok(Self { time, amplitude })
    }

    pub fn from_samples(samples: &[Sample]) -> Result<Self, DetectionError> {
        let time = samples.iter().map(|s| s.time).collect();
        let amplitude = samples.iter().map(|s| s.amplitude).collect();
        Self::from_columns(time, amplitude)
    }

    /// Recording without a meaningful time column; the sampling rate has to be
    /// supplied with the detection parameters.
    pub fn from_amplitudes(amplitude: Vec<f64>) -> Result<Self, DetectionError> {
        let time = vec![0.0; amplitude.len()];
        Self::from_columns(time, amplitude)
    }

    pub fn len(&self) -> usize {
        self.amplitude.len()
    }

    pub fn is_empty(&self) -> bool {
        self.amplitude.is_empty()
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn amplitude(&self) -> &[f64] {
        &self.amplitude
    }

    pub fn samples(&self) -> impl Iterator<Item = Sample> + '_ {
        self.time
            .iter()
            .zip(&self.amplitude)
            .map(|(&time, &amplitude)| Sample { time, amplitude })
    }

    /// Samples per second implied by the time column.
    pub fn derive_sampling_rate(&self, unit: TimeUnit) -> Result<f64, DetectionError> {
        let (first, last) = match (self.time.first(), self.time.last()) {
            (Some(first), Some(last)) if self.time.len() >= 2 => (*first, *last),
            _ => return Err(DetectionError::UnderivableSamplingRate),
        };
        let span = (last - first) * unit.seconds_per_unit();
        if span <= 0.0 {
            return Err(DetectionError::UnderivableSamplingRate);
        }
        let bps = (self.time.len() - 1) as f64 / span;
        if bps.is_finite() {
            Ok(bps)
        } else {
            Err(DetectionError::UnderivableSamplingRate)
        }
    }

    /// Check a supplied sampling rate against the time column. Recordings
    /// whose time column spans no time (index-only input) accept any rate.
    pub fn check_sampling_rate(&self, bps: f64, unit: TimeUnit) -> Result<(), DetectionError> {
        let derived = match self.derive_sampling_rate(unit) {
            Ok(derived) => derived,
            Err(_) => return Ok(()),
        };
        if ((bps - derived) / derived).abs() > RATE_TOLERANCE {
            return Err(DetectionError::SamplingRateMismatch {
                supplied: bps,
                derived,
            });
        }
        Ok(())
    }
}

/// Point events on a timeline (e.g., R-peak indices)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Events {
    pub indices: Vec<usize>,
}

impl Events {
    pub fn from_indices(indices: Vec<usize>) -> Self {
        Self { indices }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// RR intervals (milliseconds)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RRSeries {
    pub rr_ms: Vec<f64>,
}

impl RRSeries {
    pub fn from_events(events: &Events, bps: f64) -> Self {
        let rr_ms = events
            .indices
            .windows(2)
            .map(|w| (w[1] as f64 - w[0] as f64) / bps * 1000.0)
            .collect();
        Self { rr_ms }
    }
}
