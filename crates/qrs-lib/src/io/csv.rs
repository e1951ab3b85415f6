use crate::signal::Recording;
use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord, Trim};
use std::{fs::File, io::Read, path::Path};

/// Where the two columns live in a delimited ECG export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvLayout {
    pub time_col: usize,
    pub amplitude_col: usize,
    pub delimiter: u8,
}

impl Default for CsvLayout {
    fn default() -> Self {
        Self {
            time_col: 0,
            amplitude_col: 1,
            delimiter: b',',
        }
    }
}

/// Parse a time/amplitude export. A first row in which neither selected field
/// is a number is taken as a header; `#` lines and blank lines are skipped.
pub fn parse_ecg_csv<R: Read>(reader: R, layout: &CsvLayout) -> Result<Recording> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .comment(Some(b'#'))
        .delimiter(layout.delimiter)
        .from_reader(reader);

    let mut time = Vec::new();
    let mut amplitude = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.context("reading record")?;
        let line = record.position().map_or(row as u64 + 1, |p| p.line());
        match parse_row(&record, layout) {
            Ok((t, a)) => {
                time.push(t);
                amplitude.push(a);
            }
            Err(_) if row == 0 && is_header(&record, layout) => continue,
            Err(err) => return Err(err.context(format!("line {line}"))),
        }
    }
    Recording::from_columns(time, amplitude).context("invalid ECG time series")
}

/// Read a time/amplitude export from disk.
pub fn read_ecg_csv(path: &Path, layout: &CsvLayout) -> Result<Recording> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    parse_ecg_csv(file, layout).with_context(|| format!("parsing {}", path.display()))
}

fn is_header(record: &StringRecord, layout: &CsvLayout) -> bool {
    [layout.time_col, layout.amplitude_col]
        .iter()
        .all(|&col| record.get(col).map_or(true, |raw| raw.parse::<f64>().is_err()))
}

fn parse_row(record: &StringRecord, layout: &CsvLayout) -> Result<(f64, f64)> {
    let field = |col: usize, what: &str| -> Result<f64> {
        let raw = record
            .get(col)
            .ok_or_else(|| anyhow::anyhow!("missing {} column {}", what, col))?;
        raw.parse::<f64>()
            .with_context(|| format!("{} is not a number: {:?}", what, raw))
    };
    Ok((field(layout.time_col, "time")?, field(layout.amplitude_col, "amplitude")?))
}
