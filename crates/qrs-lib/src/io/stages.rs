//! Per-sample dump of every conditioning stage, for inspecting a run.

use crate::{
    detectors::ecg::{DetectionResult, StageTrace},
    signal::Recording,
};
use anyhow::{ensure, Context, Result};
use csv::WriterBuilder;
use serde::Serialize;
use std::{collections::HashSet, fs::File, io::Write, path::Path};

#[derive(Debug, Serialize)]
struct StageRow {
    time: f64,
    raw: f64,
    filtered: f64,
    differentiated: f64,
    squared: f64,
    integrated: f64,
    energy: f64,
    qrs_candidate: u8,
    noise_candidate: u8,
    r_peak: u8,
}

/// Write one CSV row per sample. `qrs_candidate` and `noise_candidate` flag
/// energy-signal indices; `r_peak` flags the reported raw-signal R-peaks.
pub fn write_stage_log<W: Write>(
    writer: W,
    recording: &Recording,
    trace: &StageTrace,
    result: &DetectionResult,
) -> Result<()> {
    let stages = &trace.conditioned;
    ensure!(
        stages.len() == recording.len(),
        "stage trace covers {} samples but the recording has {}",
        stages.len(),
        recording.len()
    );
    let qrs: HashSet<usize> = trace.peaks.qrs.iter().map(|c| c.index).collect();
    let noise: HashSet<usize> = trace.peaks.noise.iter().map(|c| c.index).collect();
    let r_peaks: HashSet<usize> = result.qrs_peaks_indices.iter().copied().collect();

    let mut out = WriterBuilder::new().from_writer(writer);
    for (i, sample) in recording.samples().enumerate() {
        out.serialize(StageRow {
            time: sample.time,
            raw: sample.amplitude,
            filtered: stages.filtered[i],
            differentiated: stages.differentiated[i],
            squared: stages.squared[i],
            integrated: stages.integrated[i],
            energy: stages.energy[i],
            qrs_candidate: qrs.contains(&i).into(),
            noise_candidate: noise.contains(&i).into(),
            r_peak: r_peaks.contains(&i).into(),
        })
        .with_context(|| format!("writing stage row {i}"))?;
    }
    out.flush().context("flushing stage log")?;
    Ok(())
}

pub fn write_stage_log_file(
    path: &Path,
    recording: &Recording,
    trace: &StageTrace,
    result: &DetectionResult,
) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    write_stage_log(file, recording, trace, result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::ecg::{run_qrs_pipeline_traced, DetectionParams};

    #[test]
    fn one_row_per_sample_with_flags() {
        let mut data = vec![0.0; 600];
        for beat in [150usize, 350, 550] {
            data[beat] = 1.0;
            data[beat + 1] = -0.3;
        }
        let rec = Recording::from_amplitudes(data).unwrap();
        let (result, trace) = run_qrs_pipeline_traced(&rec, &DetectionParams::default()).unwrap();

        let mut buf = Vec::new();
        write_stage_log(&mut buf, &rec, &trace, &result).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("time,raw,filtered,differentiated,squared,integrated,energy,qrs_candidate,noise_candidate,r_peak")
        );
        let rows: Vec<&str> = lines.collect();
        assert_eq!(rows.len(), rec.len());
        let flagged = rows.iter().filter(|r| r.ends_with(",1")).count();
        assert_eq!(flagged, result.qrs_peaks_indices.len());
    }

    #[test]
    fn writes_file() {
        let rec = Recording::from_amplitudes(vec![0.0; 50]).unwrap();
        let (result, trace) = run_qrs_pipeline_traced(&rec, &DetectionParams::default()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stages.csv");
        write_stage_log_file(&path, &rec, &trace, &result).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 51);
    }
}
