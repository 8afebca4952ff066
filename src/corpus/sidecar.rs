//! `tagfile.txt` sidecar parsing (spec §4.2, §6): line-oriented `key =
//! value` pairs. Whitespace is stripped, a trailing unit suffix `s` is
//! stripped from numeric values, and any field that still fails to parse as
//! a real number defaults to `0.0` with a warning -- never a fatal error
//! (spec §7).

use std::collections::HashMap;
use std::path::Path;

use tracing::warn;

use crate::error::Result;

/// All recognized experimental-parameter keys, read into a small map keyed
/// by their exact sidecar label.
#[derive(Debug, Clone, Default)]
pub struct Sidecar {
    pub acquisition_date: String,
    pub fluence: f64,
    pub current: f64,
    pub exposure: f64,
    pub energy: f64,
}

fn clean_value(raw: &str) -> String {
    let mut value = raw.replace(' ', "");
    if value.ends_with('s') {
        value.pop();
    }
    value.trim_end_matches('\n').trim().to_string()
}

fn parse_numeric_field(raw: &str, key: &str) -> f64 {
    let cleaned = clean_value(raw);
    cleaned.parse::<f64>().unwrap_or_else(|_| {
        warn!(field = key, value = %cleaned, "sidecar field failed to parse as a number, defaulting to 0.0");
        0.0
    })
}

/// Parses `tagfile.txt` at `path`. Missing keys are simply absent from the
/// resulting map (callers default them to `0.0`/empty string themselves);
/// this mirrors the original's line-scan-and-break behavior without
/// requiring every key to be present.
pub fn parse_sidecar(path: &Path) -> Result<Sidecar> {
    let contents = std::fs::read_to_string(path)?;
    let mut raw_fields: HashMap<String, String> = HashMap::new();

    for line in contents.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        raw_fields.insert(key.trim().to_string(), value.to_string());
    }

    let acquisition_date = raw_fields
        .get("Acquisition date")
        .map(|v| clean_value(v))
        .unwrap_or_default();

    Ok(Sidecar {
        acquisition_date,
        fluence: raw_fields
            .get("Fluence")
            .map(|v| parse_numeric_field(v, "Fluence"))
            .unwrap_or(0.0),
        current: raw_fields
            .get("Current")
            .map(|v| parse_numeric_field(v, "Current"))
            .unwrap_or(0.0),
        exposure: raw_fields
            .get("Exposure")
            .map(|v| parse_numeric_field(v, "Exposure"))
            .unwrap_or(0.0),
        energy: raw_fields
            .get("Energy")
            .map(|v| parse_numeric_field(v, "Energy"))
            .unwrap_or(0.0),
    })
}
