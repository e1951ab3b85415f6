use super::{conditioning::processing_delay, ecg::EcgPipelineConfig, peaks::PeakCandidate};
use serde::{Deserialize, Serialize};

/// R-peak and the S-point that follows it, as indices into the raw signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RsComplex {
    pub r_index: usize,
    pub r_value: f64,
    pub s_index: usize,
    pub s_value: f64,
}

/// Search windows (in samples) used to map energy peaks back onto the raw
/// signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiducialWindows {
    /// Lag of the energy signal behind the raw signal.
    pub delay: usize,
    /// Half width of the R search window around the delay-corrected index.
    pub r_half_window: usize,
    /// Maximum distance from R to S.
    pub s_window: usize,
    /// Minimum distance between consecutive R-peaks.
    pub refractory: usize,
}

impl FiducialWindows {
    pub fn new(bps: f64, cfg: &EcgPipelineConfig) -> Self {
        Self {
            delay: processing_delay(bps, cfg),
            r_half_window: ((cfg.r_search_s * bps).round() as usize).max(1),
            s_window: ((cfg.s_search_s * bps).round() as usize).max(1),
            refractory: ((cfg.min_rr_s * bps).round() as usize).max(1),
        }
    }
}

/// Raw-signal maximum near each delay-corrected QRS peak.
///
/// Each window starts at least one refractory period after the previous R, so
/// the output is strictly increasing and never closer than `min_rr_s`; a
/// candidate whose window ends up empty is dropped. The last sample is never
/// chosen, leaving room for an S-point.
pub fn locate_r_peaks(qrs: &[PeakCandidate], raw: &[f64], windows: &FiducialWindows) -> Vec<usize> {
    if raw.len() < 2 {
        return Vec::new();
    }
    let last_allowed = raw.len() - 2;
    let mut peaks: Vec<usize> = Vec::with_capacity(qrs.len());
    for candidate in qrs {
        let center = candidate.index.saturating_sub(windows.delay);
        let mut lo = center.saturating_sub(windows.r_half_window);
        if let Some(&prev) = peaks.last() {
            lo = lo.max(prev.saturating_add(windows.refractory));
        }
        let hi = center.saturating_add(windows.r_half_window).min(last_allowed);
        if lo > hi {
            continue;
        }
        peaks.push(argmax(raw, lo, hi));
    }
    peaks
}

/// Minimum of `raw` in `(r_index, r_index + s_window]`, truncated at the end
/// of the signal. `None` only when `r_index` is the last sample.
pub fn locate_s_point(raw: &[f64], r_index: usize, s_window: usize) -> Option<usize> {
    let lo = r_index.checked_add(1)?;
    let hi = r_index.saturating_add(s_window).min(raw.len().checked_sub(1)?);
    (lo <= hi).then(|| argmin(raw, lo, hi))
}

pub fn extract_rs_complexes(
    r_indices: &[usize],
    raw: &[f64],
    windows: &FiducialWindows,
) -> Vec<RsComplex> {
    r_indices
        .iter()
        .filter_map(|&r_index| {
            let s_index = locate_s_point(raw, r_index, windows.s_window)?;
            Some(RsComplex {
                r_index,
                r_value: raw[r_index],
                s_index,
                s_value: raw[s_index],
            })
        })
        .collect()
}

// Both scans keep the earliest index on ties.
fn argmax(data: &[f64], lo: usize, hi: usize) -> usize {
    (lo..=hi).fold(lo, |best, i| if data[i] > data[best] { i } else { best })
}

fn argmin(data: &[f64], lo: usize, hi: usize) -> usize {
    (lo..=hi).fold(lo, |best, i| if data[i] < data[best] { i } else { best })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn windows(delay: usize, r_half_window: usize, s_window: usize) -> FiducialWindows {
        FiducialWindows {
            delay,
            r_half_window,
            s_window,
            refractory: 1,
        }
    }

    fn cand(index: usize) -> PeakCandidate {
        PeakCandidate { index, value: 1.0 }
    }

    #[test]
    fn windows_scale_with_sampling_rate() {
        let cfg = EcgPipelineConfig::default();
        let at_250 = FiducialWindows::new(250.0, &cfg);
        assert_eq!((at_250.delay, at_250.r_half_window, at_250.s_window), (23, 25, 15));
        assert_eq!(at_250.refractory, 50);
        let at_500 = FiducialWindows::new(500.0, &cfg);
        assert_eq!((at_500.delay, at_500.r_half_window, at_500.s_window), (44, 50, 30));
        assert_eq!(at_500.refractory, 100);
    }

    #[test]
    fn finds_r_then_s_in_raw_signal() {
        let mut raw = vec![0.0; 100];
        raw[40] = 2.0;
        raw[41] = 1.0;
        raw[44] = -0.7;
        raw[47] = -0.2;
        let w = windows(10, 8, 6);
        let r = locate_r_peaks(&[cand(48)], &raw, &w);
        assert_eq!(r, vec![40]);
        let rs = extract_rs_complexes(&r, &raw, &w);
        assert_eq!(
            rs,
            vec![RsComplex {
                r_index: 40,
                r_value: 2.0,
                s_index: 44,
                s_value: -0.7
            }]
        );
    }

    #[test]
    fn overlapping_windows_stay_strictly_increasing() {
        let mut raw = vec![0.0; 60];
        raw[20] = 5.0;
        let r = locate_r_peaks(&[cand(18), cand(22)], &raw, &windows(0, 10, 5));
        assert_eq!(r.len(), 2);
        assert_eq!(r[0], 20);
        assert!(r[1] > r[0]);
    }

    #[test]
    fn r_peaks_respect_refractory_distance() {
        let mut raw = vec![0.0; 200];
        raw[50] = 3.0;
        raw[60] = 2.0;
        raw[150] = 2.5;
        let w = FiducialWindows {
            refractory: 40,
            ..windows(0, 12, 5)
        };
        let r = locate_r_peaks(&[cand(52), cand(62), cand(150)], &raw, &w);
        assert_eq!(r, vec![50, 150]);
    }

    #[test]
    fn truncated_s_window_returns_best_available() {
        let raw = [0.0, 0.1, 3.0, -0.4, -0.1];
        assert_eq!(locate_s_point(&raw, 2, 10), Some(3));
        assert_eq!(locate_s_point(&raw, 4, 10), None);
        let r = locate_r_peaks(&[cand(4)], &raw, &windows(0, 3, 2));
        assert_eq!(r, vec![2]);
        let rs = extract_rs_complexes(&r, &raw, &windows(0, 3, 20));
        assert!(rs.iter().all(|c| c.r_index < c.s_index && c.s_index <= c.r_index + 20));
    }

    #[test]
    fn r_search_never_picks_last_sample() {
        let raw = [0.0, 0.0, 0.0, 9.0];
        assert_eq!(locate_r_peaks(&[cand(3)], &raw, &windows(0, 2, 2)), vec![1]);
        assert!(locate_r_peaks(&[cand(0)], &[1.0], &windows(0, 2, 2)).is_empty());
    }

    #[test]
    fn oversized_windows_saturate_instead_of_overflowing() {
        let raw = [0.0, 2.0, 1.0, -1.0, 0.0, 3.0, 0.0, -2.0, 0.0];
        let w = FiducialWindows {
            refractory: usize::MAX,
            ..windows(0, usize::MAX, usize::MAX)
        };
        let r = locate_r_peaks(&[cand(1), cand(5)], &raw, &w);
        assert_eq!(r, vec![5]);
        assert_eq!(locate_s_point(&raw, 5, usize::MAX), Some(7));
        assert_eq!(locate_s_point(&raw, usize::MAX, 3), None);
    }
}
