use crate::signal::{Events, RRSeries};
use serde::{Deserialize, Serialize};

/// Heart rate and time-domain variability of one recording.
///
/// Metrics that need more beats than were detected are `None` (JSON `null`),
/// never zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RhythmMetrics {
    /// RR intervals in milliseconds.
    pub rr_ms: Vec<f64>,
    /// Mean heart rate in beats per minute.
    pub hr: Option<f64>,
    /// Population standard deviation of the RR intervals (ms).
    pub sdnn: Option<f64>,
    /// Root mean square of successive RR differences (ms).
    pub rmssd: Option<f64>,
}

pub fn rhythm_metrics(rr: &RRSeries) -> RhythmMetrics {
    let intervals = &rr.rr_ms;
    let n = intervals.len();
    let mean = (n > 0).then(|| intervals.iter().sum::<f64>() / n as f64);
    let hr = mean.filter(|&m| m > 0.0).map(|m| 60_000.0 / m);
    let sdnn = mean.map(|m| {
        (intervals.iter().map(|x| (x - m).powi(2)).sum::<f64>() / n as f64).sqrt()
    });
    let rmssd = (n > 1).then(|| {
        let sum: f64 = intervals.windows(2).map(|w| (w[1] - w[0]).powi(2)).sum();
        (sum / (n as f64 - 1.0)).sqrt()
    });
    RhythmMetrics {
        rr_ms: intervals.clone(),
        hr,
        sdnn,
        rmssd,
    }
}

pub fn rhythm_from_events(events: &Events, bps: f64) -> RhythmMetrics {
    rhythm_metrics(&RRSeries::from_events(events, bps))
}
