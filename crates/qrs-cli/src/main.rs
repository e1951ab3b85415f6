use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::{debug, info};
use qrs_lib::{
    detectors::ecg::{run_qrs_pipeline_traced, DetectionParams},
    io::{
        csv::{parse_ecg_csv, read_ecg_csv, CsvLayout},
        stages::write_stage_log_file,
        text as text_io,
    },
    metrics::rhythm::rhythm_from_events,
    signal::{Events, Recording, TimeUnit},
};
use std::{
    io::{self, Read},
    path::{Path, PathBuf},
};

#[derive(Parser)]
#[command(
    name = "qrs",
    version,
    about = "Offline QRS detection with heart rate and SDNN"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum InputFormat {
    /// Delimited time/amplitude columns
    Csv,
    /// Whitespace separated amplitudes only
    Text,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum TimeUnitArg {
    #[value(name = "s")]
    Seconds,
    #[value(name = "ms")]
    Milliseconds,
}

impl From<TimeUnitArg> for TimeUnit {
    fn from(unit: TimeUnitArg) -> Self {
        match unit {
            TimeUnitArg::Seconds => TimeUnit::Seconds,
            TimeUnitArg::Milliseconds => TimeUnit::Milliseconds,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Detect QRS complexes and report R-peaks, heart rate and SDNN as JSON
    Detect {
        /// ECG file; text samples are read from stdin when omitted
        #[arg(long)]
        input: Option<PathBuf>,
        /// Input format; guessed from the file extension when omitted
        #[arg(long)]
        format: Option<InputFormat>,
        /// Sampling rate (samples per second)
        #[arg(long)]
        bps: Option<f64>,
        /// Unit of the CSV time column, used when deriving the sampling rate
        #[arg(long, default_value = "s")]
        time_unit: TimeUnitArg,
        /// Minimum normalised energy (0..1) of a candidate peak
        #[arg(long)]
        findpeaks_limit: Option<f64>,
        /// Also locate R and S points
        #[arg(long)]
        rs_points: bool,
        /// TOML file with detection parameters
        #[arg(long)]
        config: Option<PathBuf>,
        /// Write every pipeline stage to this CSV file
        #[arg(long)]
        log_data: Option<PathBuf>,
        #[arg(long, default_value_t = 0)]
        time_col: usize,
        #[arg(long, default_value_t = 1)]
        amplitude_col: usize,
        /// Field delimiter; a tab for `.tsv` files, a comma otherwise
        #[arg(long)]
        delimiter: Option<char>,
    },
    /// Heart rate and SDNN from newline-delimited R-peak sample indices
    Rhythm {
        #[arg(long)]
        bps: f64,
        #[arg(long)]
        input: Option<PathBuf>,
    },
}

/// Where the sampling rate of a run came from.
#[derive(Debug, Clone, Copy, PartialEq)]
enum RateSource {
    Flag,
    Config,
    Derived,
    Default,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Detect {
            input,
            format,
            bps,
            time_unit,
            findpeaks_limit,
            rs_points,
            config,
            log_data,
            time_col,
            amplitude_col,
            delimiter,
        } => {
            let delimiter = delimiter.unwrap_or_else(|| default_delimiter(input.as_deref()));
            let layout = CsvLayout {
                time_col,
                amplitude_col,
                delimiter: delimiter_byte(delimiter)?,
            };
            cmd_detect(
                input.as_deref(),
                format,
                bps,
                time_unit.into(),
                findpeaks_limit,
                rs_points,
                config.as_deref(),
                log_data.as_deref(),
                &layout,
            )?
        }
        Commands::Rhythm { bps, input } => cmd_rhythm(bps, input.as_deref())?,
    }
    Ok(())
}

fn delimiter_byte(delimiter: char) -> Result<u8> {
    if delimiter == '\t' || delimiter.is_ascii_graphic() {
        Ok(delimiter as u8)
    } else {
        bail!("delimiter must be a single printable ASCII character or a tab")
    }
}

fn default_delimiter(input: Option<&Path>) -> char {
    match input.and_then(|p| p.extension()).and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => '\t',
        _ => ',',
    }
}

fn read_stdin() -> Result<String> {
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

fn resolve_format(input: Option<&Path>, format: Option<InputFormat>) -> InputFormat {
    if let Some(format) = format {
        return format;
    }
    match input.and_then(|p| p.extension()).and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("csv") || ext.eq_ignore_ascii_case("tsv") => {
            InputFormat::Csv
        }
        _ => InputFormat::Text,
    }
}

fn load_recording(
    input: Option<&Path>,
    format: InputFormat,
    layout: &CsvLayout,
) -> Result<Recording> {
    match (format, input) {
        (InputFormat::Csv, Some(path)) => read_ecg_csv(path, layout),
        (InputFormat::Csv, None) => {
            let text = read_stdin()?;
            parse_ecg_csv(text.as_bytes(), layout)
        }
        (InputFormat::Text, input) => {
            let samples = match input {
                Some(path) => text_io::read_f64_series(path)?,
                None => text_io::parse_f64_series(&read_stdin()?)?,
            };
            Ok(Recording::from_amplitudes(samples)?)
        }
    }
}

/// Parameters from a TOML file, plus whether the file sets `bps` itself.
fn load_config(path: &Path) -> Result<(DetectionParams, bool)> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let table: toml::Table =
        toml::from_str(&text).with_context(|| format!("invalid config {}", path.display()))?;
    let declares_bps = table.contains_key("bps");
    let params: DetectionParams = toml::Value::Table(table)
        .try_into()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok((params, declares_bps))
}

/// Flag > config file > CSV time column > built-in default.
fn resolve_sampling_rate(
    flag: Option<f64>,
    config_bps: Option<f64>,
    recording: &Recording,
    format: InputFormat,
    unit: TimeUnit,
) -> Result<(f64, RateSource)> {
    if let Some(bps) = flag {
        return Ok((bps, RateSource::Flag));
    }
    if let Some(bps) = config_bps {
        return Ok((bps, RateSource::Config));
    }
    if format == InputFormat::Csv {
        let bps = recording
            .derive_sampling_rate(unit)
            .context("no --bps given and the time column does not determine one")?;
        return Ok((bps, RateSource::Derived));
    }
    Ok((DetectionParams::default().bps, RateSource::Default))
}

#[allow(clippy::too_many_arguments)]
fn cmd_detect(
    input: Option<&Path>,
    format: Option<InputFormat>,
    bps: Option<f64>,
    time_unit: TimeUnit,
    findpeaks_limit: Option<f64>,
    rs_points: bool,
    config: Option<&Path>,
    log_data: Option<&Path>,
    layout: &CsvLayout,
) -> Result<()> {
    let format = resolve_format(input, format);
    let recording = load_recording(input, format, layout)?;

    let (mut params, config_bps) = match config {
        Some(path) => {
            let (params, declares_bps) = load_config(path)?;
            (params, declares_bps.then_some(params.bps))
        }
        None => (DetectionParams::default(), None),
    };
    let (bps, source) = resolve_sampling_rate(bps, config_bps, &recording, format, time_unit)?;
    debug!("sampling rate {} from {:?}", bps, source);
    if format == InputFormat::Csv && matches!(source, RateSource::Flag | RateSource::Config) {
        recording.check_sampling_rate(bps, time_unit)?;
    }
    params.bps = bps;
    if let Some(limit) = findpeaks_limit {
        params.findpeaks_limit = limit;
    }
    params.extract_fiducials |= rs_points;

    let (result, trace) = run_qrs_pipeline_traced(&recording, &params)?;
    if let Some(path) = log_data {
        write_stage_log_file(path, &recording, &trace, &result)?;
        info!("stage log written to {}", path.display());
    }
    println!("{}", serde_json::to_string(&result)?);
    Ok(())
}

fn cmd_rhythm(bps: f64, input: Option<&Path>) -> Result<()> {
    if !(bps.is_finite() && bps > 0.0) {
        bail!("sampling rate must be positive and finite, got {}", bps);
    }
    let indices = match input {
        Some(path) => text_io::read_event_indices(path)?,
        None => text_io::parse_event_indices(&read_stdin()?)?,
    };
    let metrics = rhythm_from_events(&Events::from_indices(indices), bps);
    println!("{}", serde_json::to_string(&metrics)?);
    Ok(())
}
