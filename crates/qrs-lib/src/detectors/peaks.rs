//! Candidate selection on the normalised energy signal and the adaptive
//! signal/noise threshold that decides which candidates are beats.

use super::ecg::EcgPipelineConfig;
use log::debug;
use serde::{Deserialize, Serialize};

/// Local maximum of the energy signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeakCandidate {
    pub index: usize,
    pub value: f64,
}

/// Candidates split into accepted QRS peaks and rejected noise peaks, both in
/// index order.
#[derive(Debug, Clone, Default)]
pub struct PeakDetection {
    pub qrs: Vec<PeakCandidate>,
    pub noise: Vec<PeakCandidate>,
}

/// Strict local maxima. A plateau counts once, at its middle sample, when the
/// samples on both sides of it are lower. The first and last samples are never
/// maxima.
pub fn local_maxima(data: &[f64]) -> Vec<usize> {
    let n = data.len();
    let mut peaks = Vec::new();
    let mut i = 1;
    while i + 1 < n {
        if data[i] > data[i - 1] {
            let mut end = i;
            while end + 1 < n && data[end + 1] == data[i] {
                end += 1;
            }
            if end + 1 < n && data[end + 1] < data[i] {
                peaks.push((i + end) / 2);
            }
            i = end + 1;
        } else {
            i += 1;
        }
    }
    peaks
}

/// Keep the larger of any two candidates closer than `distance` samples
/// (earlier index wins on equal values). Output is sorted by index.
pub fn enforce_refractory(candidates: &[PeakCandidate], distance: usize) -> Vec<PeakCandidate> {
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|&a, &b| {
        candidates[b]
            .value
            .total_cmp(&candidates[a].value)
            .then(candidates[a].index.cmp(&candidates[b].index))
    });
    let mut keep = vec![true; candidates.len()];
    for &k in &order {
        if !keep[k] {
            continue;
        }
        let center = candidates[k].index;
        for j in (0..k).rev() {
            if center - candidates[j].index >= distance {
                break;
            }
            keep[j] = false;
        }
        for j in k + 1..candidates.len() {
            if candidates[j].index - center >= distance {
                break;
            }
            keep[j] = false;
        }
    }
    candidates
        .iter()
        .zip(keep)
        .filter_map(|(c, kept)| kept.then_some(*c))
        .collect()
}

/// Local maxima above `limit`, thinned to one per refractory period.
pub fn find_candidates(energy: &[f64], limit: f64, distance: usize) -> Vec<PeakCandidate> {
    let maxima: Vec<PeakCandidate> = local_maxima(energy)
        .into_iter()
        .filter(|&index| energy[index] > limit)
        .map(|index| PeakCandidate {
            index,
            value: energy[index],
        })
        .collect();
    enforce_refractory(&maxima, distance.max(1))
}

/// Running signal and noise peak levels for one detection run.
#[derive(Debug, Clone)]
pub struct AdaptiveThreshold {
    signal_level: f64,
    noise_level: f64,
    signal_weight: f64,
    noise_weight: f64,
    threshold_weight: f64,
}

impl AdaptiveThreshold {
    pub fn new(signal_level: f64, noise_level: f64, cfg: &EcgPipelineConfig) -> Self {
        Self {
            signal_level,
            noise_level,
            signal_weight: cfg.signal_peak_weight,
            noise_weight: cfg.noise_peak_weight,
            threshold_weight: cfg.threshold_weight,
        }
    }

    /// Seed the levels from the whole recording: a quarter of the strongest
    /// candidate and half of the mean energy.
    pub fn seeded(energy: &[f64], candidates: &[PeakCandidate], cfg: &EcgPipelineConfig) -> Self {
        let strongest = candidates.iter().map(|c| c.value).fold(0.0, f64::max);
        let mean = if energy.is_empty() {
            0.0
        } else {
            energy.iter().sum::<f64>() / energy.len() as f64
        };
        Self::new(0.25 * strongest, 0.5 * mean, cfg)
    }

    pub fn threshold(&self) -> f64 {
        self.noise_level + self.threshold_weight * (self.signal_level - self.noise_level)
    }

    pub fn signal_level(&self) -> f64 {
        self.signal_level
    }

    pub fn noise_level(&self) -> f64 {
        self.noise_level
    }

    pub fn observe_qrs(&mut self, value: f64) {
        self.signal_level = self.signal_weight * value + (1.0 - self.signal_weight) * self.signal_level;
    }

    pub fn observe_noise(&mut self, value: f64) {
        self.noise_level = self.noise_weight * value + (1.0 - self.noise_weight) * self.noise_level;
    }

    /// A beat recovered by searchback pulls the signal level down faster.
    pub fn observe_searchback(&mut self, value: f64) {
        self.signal_level = 0.25 * value + 0.75 * self.signal_level;
    }
}

const RR_AVERAGE_BEATS: usize = 8;

/// Classify energy peaks into QRS and noise.
///
/// Candidates are visited in index order. One whose value exceeds the current
/// threshold becomes a beat; anything else updates the noise level. When the
/// time since the last beat grows past `searchback_factor` times the recent
/// mean RR interval, the strongest skipped candidate above half the threshold
/// is promoted to a beat.
pub fn detect_peaks(energy: &[f64], limit: f64, bps: f64, cfg: &EcgPipelineConfig) -> PeakDetection {
    let distance = ((cfg.min_rr_s * bps).round() as usize).max(1);
    let candidates = find_candidates(energy, limit, distance);
    debug!(
        "{} energy candidates above limit {} (refractory {} samples)",
        candidates.len(),
        limit,
        distance
    );

    let mut levels = AdaptiveThreshold::seeded(energy, &candidates, cfg);
    let mut detection = PeakDetection::default();
    let mut rr: Vec<usize> = Vec::new();

    for &candidate in &candidates {
        if cfg.searchback_factor > 0.0 {
            while let Some(rescued) =
                searchback(&detection, &rr, candidate.index, levels.threshold(), cfg)
            {
                if let Some(last) = detection.qrs.last() {
                    rr.push(rescued.index - last.index);
                }
                debug!("searchback recovered beat at {}", rescued.index);
                detection.noise.retain(|c| c.index != rescued.index);
                detection.qrs.push(rescued);
                levels.observe_searchback(rescued.value);
            }
        }

        if candidate.value > levels.threshold() {
            if let Some(last) = detection.qrs.last() {
                rr.push(candidate.index - last.index);
            }
            detection.qrs.push(candidate);
            levels.observe_qrs(candidate.value);
        } else {
            detection.noise.push(candidate);
            levels.observe_noise(candidate.value);
        }
    }

    debug!(
        "{} qrs peaks, {} noise peaks, final threshold {:.4}",
        detection.qrs.len(),
        detection.noise.len(),
        levels.threshold()
    );
    detection
}

fn searchback(
    detection: &PeakDetection,
    rr: &[usize],
    current: usize,
    threshold: f64,
    cfg: &EcgPipelineConfig,
) -> Option<PeakCandidate> {
    if detection.qrs.len() < 2 || rr.is_empty() {
        return None;
    }
    let last = detection.qrs.last()?.index;
    let recent = &rr[rr.len().saturating_sub(RR_AVERAGE_BEATS)..];
    let mean_rr = recent.iter().sum::<usize>() as f64 / recent.len() as f64;
    if ((current - last) as f64) <= cfg.searchback_factor * mean_rr {
        return None;
    }
    detection
        .noise
        .iter()
        .filter(|c| c.index > last && c.value > 0.5 * threshold)
        .copied()
        .reduce(|best, c| if c.value > best.value { c } else { best })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(index: usize, value: f64) -> PeakCandidate {
        PeakCandidate { index, value }
    }

    fn hump(len: usize, centers: &[(usize, f64)], width: f64) -> Vec<f64> {
        (0..len)
            .map(|i| {
                centers
                    .iter()
                    .map(|&(c, a)| a * (-0.5 * ((i as f64 - c as f64) / width).powi(2)).exp())
                    .sum()
            })
            .collect()
    }

    #[test]
    fn local_maxima_handles_plateaus_and_edges() {
        assert_eq!(local_maxima(&[0.0, 1.0, 0.0, 2.0, 2.0, 2.0, 1.0]), vec![1, 4]);
        assert!(local_maxima(&[3.0, 2.0, 1.0]).is_empty());
        assert!(local_maxima(&[1.0, 2.0, 2.0]).is_empty());
        assert!(local_maxima(&[0.0; 50]).is_empty());
        assert!(local_maxima(&[]).is_empty());
    }

    #[test]
    fn refractory_keeps_larger_neighbour() {
        let kept = enforce_refractory(&[cand(10, 0.4), cand(30, 0.9), cand(100, 0.5)], 50);
        assert_eq!(kept, vec![cand(30, 0.9), cand(100, 0.5)]);
    }

    #[test]
    fn refractory_tie_goes_to_earlier_index() {
        let kept = enforce_refractory(&[cand(10, 0.7), cand(40, 0.7)], 50);
        assert_eq!(kept, vec![cand(10, 0.7)]);
    }

    #[test]
    fn candidates_are_increasing_and_spaced() {
        let energy = hump(
            2000,
            &[(100, 1.0), (130, 0.6), (400, 0.8), (430, 0.9), (800, 0.02)],
            8.0,
        );
        let c = find_candidates(&energy, 0.05, 50);
        let idx: Vec<usize> = c.iter().map(|c| c.index).collect();
        assert_eq!(idx, vec![100, 430]);
        assert!(c.windows(2).all(|w| w[1].index - w[0].index >= 50));
    }

    #[test]
    fn flat_energy_has_no_peaks() {
        let det = detect_peaks(&vec![0.0; 1000], 0.001, 250.0, &EcgPipelineConfig::default());
        assert!(det.qrs.is_empty());
        assert!(det.noise.is_empty());
    }

    #[test]
    fn small_humps_between_beats_are_noise() {
        let mut centers = Vec::new();
        for k in 0..8 {
            let beat = 100 + k * 200;
            centers.push((beat, 1.0));
            centers.push((beat + 70, 0.05));
        }
        let energy = hump(1800, &centers, 6.0);
        let det = detect_peaks(&energy, 0.001, 250.0, &EcgPipelineConfig::default());
        let qrs: Vec<usize> = det.qrs.iter().map(|c| c.index).collect();
        assert_eq!(qrs, (0..8).map(|k| 100 + k * 200).collect::<Vec<_>>());
        assert_eq!(det.noise.len(), 8);
    }

    #[test]
    fn searchback_recovers_weak_beats() {
        let mut centers: Vec<(usize, f64)> = (0..3).map(|k| (100 + k * 200, 1.0)).collect();
        centers.extend((3..10).map(|k| (100 + k * 200, 0.12)));
        let energy = hump(2100, &centers, 6.0);
        let cfg = EcgPipelineConfig::default();

        let det = detect_peaks(&energy, 0.001, 250.0, &cfg);
        assert_eq!(det.qrs.len(), 10);
        assert!(det.qrs.windows(2).all(|w| w[0].index < w[1].index));
        assert!(det
            .noise
            .iter()
            .all(|n| det.qrs.iter().all(|q| q.index != n.index)));

        let without = EcgPipelineConfig {
            searchback_factor: 0.0,
            ..cfg
        };
        assert_eq!(detect_peaks(&energy, 0.001, 250.0, &without).qrs.len(), 3);
    }

    #[test]
    fn threshold_tracks_levels() {
        let cfg = EcgPipelineConfig::default();
        let mut t = AdaptiveThreshold::new(0.8, 0.0, &cfg);
        assert!((t.threshold() - 0.2).abs() < 1e-12);
        t.observe_noise(0.4);
        assert!((t.noise_level() - 0.05).abs() < 1e-12);
        t.observe_qrs(0.0);
        assert!((t.signal_level() - 0.7).abs() < 1e-12);
    }
}
