use anyhow::{Context, Result};
use std::path::Path;

/// Parse whitespace/newline separated floating point samples, ignoring blank
/// and `#` comment lines.
pub fn parse_f64_series(text: &str) -> Result<Vec<f64>> {
    let mut out = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        for token in trimmed.split_whitespace() {
            let val: f64 = token
                .parse()
                .with_context(|| format!("line {} is not f64: {}", idx + 1, token))?;
            out.push(val);
        }
    }
    if out.is_empty() {
        anyhow::bail!("no numeric samples found");
    }
    Ok(out)
}

/// Read a newline-delimited floating point series from disk.
pub fn read_f64_series(path: &Path) -> Result<Vec<f64>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_f64_series(&text)
}

/// Parse newline-delimited sample indices (usize) into an Events-friendly list.
pub fn parse_event_indices(text: &str) -> Result<Vec<usize>> {
    let mut out = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let val: usize = trimmed
            .parse()
            .with_context(|| format!("line {} is not an integer index: {}", idx + 1, trimmed))?;
        out.push(val);
    }
    if out.windows(2).any(|w| w[1] <= w[0]) {
        anyhow::bail!("beat indices must be strictly increasing");
    }
    Ok(out)
}

/// Read event indices from a file.
pub fn read_event_indices(path: &Path) -> Result<Vec<usize>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_event_indices(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_loadtxt_style_series() {
        let text = "# lead II\n0.12\n-0.5\n\n1e-3 2.5\n";
        assert_eq!(parse_f64_series(text).unwrap(), vec![0.12, -0.5, 1e-3, 2.5]);
    }

    #[test]
    fn reports_offending_line() {
        let err = parse_f64_series("1.0\nabc\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
        assert!(parse_f64_series("# only a comment\n").is_err());
    }

    #[test]
    fn event_indices_must_increase() {
        assert_eq!(parse_event_indices("10\n250\n").unwrap(), vec![10, 250]);
        assert!(parse_event_indices("10\n10\n").is_err());
        assert!(parse_event_indices("").unwrap().is_empty());
    }
}
