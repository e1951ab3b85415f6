use super::{
    conditioning::{condition, ConditionedSignal},
    fiducials::{extract_rs_complexes, locate_r_peaks, FiducialWindows, RsComplex},
    peaks::{detect_peaks, PeakDetection},
};
use crate::{
    error::DetectionError,
    metrics::rhythm::{rhythm_from_events, RhythmMetrics},
    signal::{Events, Recording},
};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

/// Tunable constants of the conditioning and detection stages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EcgPipelineConfig {
    /// Lower cutoff for the single-pole high-pass filter (Hz).
    pub lowcut_hz: f64,
    /// Upper cutoff for the single-pole low-pass filter (Hz).
    pub highcut_hz: f64,
    /// Moving window integration length (seconds).
    pub integration_window_s: f64,
    /// Minimum physiological RR distance / refractory period (seconds).
    pub min_rr_s: f64,
    /// Smoothing weight applied to accepted QRS peaks.
    pub signal_peak_weight: f64,
    /// Smoothing weight applied to rejected noise peaks.
    pub noise_peak_weight: f64,
    /// Position of the threshold between noise and signal levels.
    pub threshold_weight: f64,
    /// Searchback triggers after this multiple of the recent mean RR; 0 disables it.
    pub searchback_factor: f64,
    /// Half width of the raw-signal R search window (seconds).
    pub r_search_s: f64,
    /// Maximum R to S distance (seconds).
    pub s_search_s: f64,
}

impl Default for EcgPipelineConfig {
    fn default() -> Self {
        Self {
            lowcut_hz: 5.0,
            highcut_hz: 15.0,
            integration_window_s: 0.150,
            min_rr_s: 0.200,
            signal_peak_weight: 0.125,
            noise_peak_weight: 0.125,
            threshold_weight: 0.25,
            searchback_factor: 1.66,
            r_search_s: 0.100,
            s_search_s: 0.060,
        }
    }
}

impl EcgPipelineConfig {
    pub fn validate(&self) -> Result<(), DetectionError> {
        let positive = [
            ("highcut_hz", self.highcut_hz),
            ("integration_window_s", self.integration_window_s),
            ("min_rr_s", self.min_rr_s),
            ("r_search_s", self.r_search_s),
            ("s_search_s", self.s_search_s),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(DetectionError::InvalidParameter { name, value });
            }
        }
        if !(self.lowcut_hz.is_finite() && self.lowcut_hz >= 0.0 && self.lowcut_hz < self.highcut_hz)
        {
            return Err(DetectionError::InvalidParameter {
                name: "lowcut_hz",
                value: self.lowcut_hz,
            });
        }
        let weights = [
            ("signal_peak_weight", self.signal_peak_weight),
            ("noise_peak_weight", self.noise_peak_weight),
        ];
        for (name, value) in weights {
            if !(value > 0.0 && value <= 1.0) {
                return Err(DetectionError::InvalidParameter { name, value });
            }
        }
        if !(0.0..=1.0).contains(&self.threshold_weight) {
            return Err(DetectionError::InvalidParameter {
                name: "threshold_weight",
                value: self.threshold_weight,
            });
        }
        if !(self.searchback_factor.is_finite() && self.searchback_factor >= 0.0) {
            return Err(DetectionError::InvalidParameter {
                name: "searchback_factor",
                value: self.searchback_factor,
            });
        }
        Ok(())
    }
}

/// Configuration of one detection run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionParams {
    /// Sampling rate (samples per second).
    pub bps: f64,
    /// Minimum normalised energy (0..1) for a peak to become a candidate.
    pub findpeaks_limit: f64,
    /// Also locate the S-point after every R-peak.
    pub extract_fiducials: bool,
    pub pipeline: EcgPipelineConfig,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            bps: 250.0,
            findpeaks_limit: 0.05,
            extract_fiducials: false,
            pipeline: EcgPipelineConfig::default(),
        }
    }
}

impl DetectionParams {
    pub fn validate(&self) -> Result<(), DetectionError> {
        if !(self.bps.is_finite() && self.bps > 0.0) {
            return Err(DetectionError::InvalidSamplingRate(self.bps));
        }
        if !(self.findpeaks_limit.is_finite() && self.findpeaks_limit > 0.0) {
            return Err(DetectionError::InvalidFindpeaksLimit(self.findpeaks_limit));
        }
        self.pipeline.validate()?;
        let cfg = &self.pipeline;
        let spans = [
            cfg.integration_window_s,
            cfg.min_rr_s,
            cfg.r_search_s,
            cfg.s_search_s,
            1.0 / (2.0 * std::f64::consts::PI * cfg.highcut_hz),
        ];
        if spans.iter().any(|s| s * self.bps > MAX_WINDOW_SAMPLES) {
            return Err(DetectionError::InvalidSamplingRate(self.bps));
        }
        Ok(())
    }
}

/// Upper bound on any window derived from the sampling rate.
const MAX_WINDOW_SAMPLES: f64 = 1e9;

/// Outcome of running the pipeline over one recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub bps: f64,
    pub sample_count: usize,
    /// R-peak indices into the raw signal, strictly increasing.
    pub qrs_peaks_indices: Vec<usize>,
    /// One entry per R-peak when fiducial extraction was requested.
    pub rs_complexes: Option<Vec<RsComplex>>,
    #[serde(flatten)]
    pub rhythm: RhythmMetrics,
}

impl DetectionResult {
    pub fn from_events(
        bps: f64,
        sample_count: usize,
        events: Events,
        rs_complexes: Option<Vec<RsComplex>>,
    ) -> Self {
        let rhythm = rhythm_from_events(&events, bps);
        Self {
            bps,
            sample_count,
            qrs_peaks_indices: events.indices,
            rs_complexes,
            rhythm,
        }
    }

    pub fn hr(&self) -> Option<f64> {
        self.rhythm.hr
    }

    pub fn sdnn(&self) -> Option<f64> {
        self.rhythm.sdnn
    }

    pub fn events(&self) -> Events {
        Events::from_indices(self.qrs_peaks_indices.clone())
    }
}

/// Intermediate outputs kept for diagnostics.
#[derive(Debug, Clone)]
pub struct StageTrace {
    pub conditioned: ConditionedSignal,
    pub peaks: PeakDetection,
    pub windows: FiducialWindows,
}

/// Detect R-peaks and compute rhythm metrics.
pub fn run_qrs_pipeline(
    recording: &Recording,
    params: &DetectionParams,
) -> Result<DetectionResult, DetectionError> {
    run_qrs_pipeline_traced(recording, params).map(|(result, _)| result)
}

/// R-peak indices only.
pub fn detect_r_peaks(
    recording: &Recording,
    params: &DetectionParams,
) -> Result<Events, DetectionError> {
    let params = DetectionParams {
        extract_fiducials: false,
        ..*params
    };
    run_qrs_pipeline(recording, &params).map(|result| result.events())
}

/// Same as [`run_qrs_pipeline`], also returning every stage output.
pub fn run_qrs_pipeline_traced(
    recording: &Recording,
    params: &DetectionParams,
) -> Result<(DetectionResult, StageTrace), DetectionError> {
    params.validate()?;
    let raw = recording.amplitude();
    let cfg = &params.pipeline;

    let conditioned = condition(raw, params.bps, cfg);
    debug!(
        "conditioned {} samples at {} samples/s, peak integrated energy {:.6}",
        conditioned.len(),
        params.bps,
        conditioned.integrated.iter().copied().fold(0.0, f64::max)
    );

    let peaks = detect_peaks(&conditioned.energy, params.findpeaks_limit, params.bps, cfg);
    let windows = FiducialWindows::new(params.bps, cfg);
    let r_peaks = locate_r_peaks(&peaks.qrs, raw, &windows);
    let rs_complexes = params
        .extract_fiducials
        .then(|| extract_rs_complexes(&r_peaks, raw, &windows));

    let result = DetectionResult::from_events(
        params.bps,
        recording.len(),
        Events::from_indices(r_peaks),
        rs_complexes,
    );
    match (result.hr(), result.sdnn()) {
        (Some(hr), Some(sdnn)) => info!(
            "{} beats, hr {:.1} bpm, sdnn {:.1} ms",
            result.qrs_peaks_indices.len(),
            hr,
            sdnn
        ),
        _ => warn!(
            "{} beat(s) detected in {} samples; heart rate undefined",
            result.qrs_peaks_indices.len(),
            recording.len()
        ),
    }

    Ok((
        result,
        StageTrace {
            conditioned,
            peaks,
            windows,
        },
    ))
}
