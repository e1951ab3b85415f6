//! Pan–Tompkins style conditioning: bandpass → derivative → squaring →
//! moving-window integration, followed by a min/max normalisation so peak
//! limits are relative to the recording's own dynamic range.
//!
//! Every stage is causal and length preserving. The lag each stage adds is
//! reported by [`processing_delay`] instead of being shifted out of the data.

use super::ecg::EcgPipelineConfig;
use std::f64::consts::PI;

/// Outputs of every conditioning stage, each the length of the input.
#[derive(Debug, Clone, Default)]
pub struct ConditionedSignal {
    pub filtered: Vec<f64>,
    pub differentiated: Vec<f64>,
    pub squared: Vec<f64>,
    pub integrated: Vec<f64>,
    /// `integrated` rescaled into `[0, 1]`.
    pub energy: Vec<f64>,
}

impl ConditionedSignal {
    pub fn len(&self) -> usize {
        self.energy.len()
    }

    pub fn is_empty(&self) -> bool {
        self.energy.is_empty()
    }
}

pub fn condition(data: &[f64], bps: f64, cfg: &EcgPipelineConfig) -> ConditionedSignal {
    let filtered = bandpass(data, bps, cfg.lowcut_hz, cfg.highcut_hz);
    let differentiated = derivative(&filtered);
    let squared = square(&differentiated);
    let integrated = moving_window_integration(&squared, integration_window(bps, cfg));
    let energy = normalize(&integrated);
    ConditionedSignal {
        filtered,
        differentiated,
        squared,
        integrated,
        energy,
    }
}

/// Integration window length in samples (at least one).
pub fn integration_window(bps: f64, cfg: &EcgPipelineConfig) -> usize {
    ((cfg.integration_window_s * bps).round() as usize).max(1)
}

/// Samples by which an energy hump trails the QRS complex that caused it.
pub fn processing_delay(bps: f64, cfg: &EcgPipelineConfig) -> usize {
    let lowpass_lag = if cfg.highcut_hz > 0.0 && cfg.highcut_hz < bps * 0.5 {
        (bps / (2.0 * PI * cfg.highcut_hz)).round() as usize
    } else {
        0
    };
    let window = integration_window(bps, cfg);
    lowpass_lag
        .saturating_add(DERIVATIVE_LAG)
        .saturating_add((window - 1) / 2)
}

const DERIVATIVE_LAG: usize = 2;

pub fn bandpass(data: &[f64], bps: f64, low: f64, high: f64) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    let hp = if low > 0.0 {
        single_pole_highpass(data, bps, low)
    } else {
        data.to_vec()
    };
    if high <= 0.0 || high >= bps * 0.5 {
        hp
    } else {
        single_pole_lowpass(&hp, bps, high)
    }
}

fn single_pole_highpass(data: &[f64], bps: f64, cutoff: f64) -> Vec<f64> {
    let dt = 1.0 / bps;
    let rc = 1.0 / (2.0 * PI * cutoff.max(0.01));
    let alpha = rc / (rc + dt);
    let mut out = Vec::with_capacity(data.len());
    let mut prev_y = 0.0;
    let mut prev_x = data[0];
    for &x in data {
        let y = alpha * (prev_y + x - prev_x);
        out.push(y);
        prev_y = y;
        prev_x = x;
    }
    out
}

fn single_pole_lowpass(data: &[f64], bps: f64, cutoff: f64) -> Vec<f64> {
    let dt = 1.0 / bps;
    let rc = 1.0 / (2.0 * PI * cutoff.max(0.01));
    let alpha = dt / (rc + dt);
    let mut out = Vec::with_capacity(data.len());
    let mut prev = data[0];
    for &x in data {
        prev += alpha * (x - prev);
        out.push(prev);
    }
    out
}

/// Causal five-point derivative, `(2x[n] + x[n-1] - x[n-3] - 2x[n-4]) / 8`.
/// Samples before the start repeat the first sample.
pub fn derivative(data: &[f64]) -> Vec<f64> {
    let at = |i: usize, back: usize| data[i.saturating_sub(back)];
    (0..data.len())
        .map(|i| (2.0 * at(i, 0) + at(i, 1) - at(i, 3) - 2.0 * at(i, 4)) / 8.0)
        .collect()
}

pub fn square(data: &[f64]) -> Vec<f64> {
    data.iter().map(|x| x * x).collect()
}

/// Trailing moving average over `win` samples. Until the window fills, the
/// missing samples count as zero.
pub fn moving_window_integration(data: &[f64], win: usize) -> Vec<f64> {
    if win <= 1 {
        return data.to_vec();
    }
    let mut out = vec![0.0; data.len()];
    let mut acc = 0.0;
    for (i, &sample) in data.iter().enumerate() {
        acc += sample;
        if i >= win {
            acc -= data[i - win];
        }
        out[i] = acc / win as f64;
    }
    out
}

/// Rescale into `[0, 1]`. A flat (or non-finite) range maps to all zeros.
pub fn normalize(data: &[f64]) -> Vec<f64> {
    let (lo, hi) = data
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| {
            (lo.min(x), hi.max(x))
        });
    let range = hi - lo;
    if !(range > 0.0 && range.is_finite()) {
        return vec![0.0; data.len()];
    }
    data.iter().map(|x| (x - lo) / range).collect()
}
