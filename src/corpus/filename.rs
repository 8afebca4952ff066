//! Filename classification for the raw corpus (spec §4.2): each `.tif`/
//! `.tiff` in the raw directory is classified by pattern into one of four
//! roles. Built on `regex`, which several scientific-imaging crates in the
//! pack reach for to parse exactly this kind of structured filename.

use once_cell::sync::Lazy;
use regex::Regex;

/// What one filename in the raw directory contributes to the corpus index.
#[derive(Debug, Clone, PartialEq)]
pub enum FileRole {
    /// `data.timedelay.<signed-decimal>.nscan.<02d>.pumpon.tif`
    Data { time_delay: String, scan: u32 },
    /// `data.nscan.<d+>.pumpoff.tif`
    PumpoffData { scan: u32 },
    /// `background.*.pumpon.tif`
    PumponBackground,
    /// `background.*.pumpoff.tif`
    PumpoffBackground,
    /// Anything else with a `.tif`/`.tiff` extension; ignored by the index.
    Unrecognized,
}

static DATA_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^data\.timedelay\.([+-]?\d+\.\d+)\.nscan\.(\d+)\.pumpon\.tiff?$").unwrap()
});
static PUMPOFF_DATA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^data\.nscan\.(\d+)\.pumpoff\.tiff?$").unwrap());
static PUMPON_BG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^background\..*\.pumpon\.tiff?$").unwrap());
static PUMPOFF_BG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^background\..*\.pumpoff\.tiff?$").unwrap());

/// Classifies a single filename (no directory component).
pub fn classify(filename: &str) -> FileRole {
    if let Some(caps) = DATA_RE.captures(filename) {
        return FileRole::Data {
            time_delay: caps[1].to_string(),
            scan: caps[2].parse().unwrap(),
        };
    }
    if let Some(caps) = PUMPOFF_DATA_RE.captures(filename) {
        return FileRole::PumpoffData {
            scan: caps[1].parse().unwrap(),
        };
    }
    if PUMPON_BG_RE.is_match(filename) {
        return FileRole::PumponBackground;
    }
    if PUMPOFF_BG_RE.is_match(filename) {
        return FileRole::PumpoffBackground;
    }
    FileRole::Unrecognized
}

/// Canonical data filename for `(timedelay, scan)`, matching spec §4.2's
/// `data.timedelay.<signed-decimal>.nscan.<02d>.pumpon.tif` template and
/// `raw_data`'s sign/zero-pad conventions.
pub fn data_filename(time_delay: f64, scan: u32) -> String {
    let sign = if time_delay < 0.0 { "" } else { "+" };
    format!("data.timedelay.{sign}{time_delay:.2}.nscan.{scan:02}.pumpon.tif")
}

/// Extracts the acquisition date from a raw corpus directory name: the
/// first run of dot-separated numeric fields, with the trailing dot
/// stripped. Falls back to `"0.0.0.0.0"` if the directory name doesn't
/// start with one (spec §4.2).
pub fn acquisition_date_from_dirname(dirname: &str) -> String {
    static DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+(?:\.\d+)+)\.?").unwrap());
    DATE_RE
        .captures(dirname)
        .map(|caps| caps[1].to_string())
        .unwrap_or_else(|| "0.0.0.0.0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_data_frame() {
        let role = classify("data.timedelay.+1.00.nscan.04.pumpon.tif");
        assert_eq!(
            role,
            FileRole::Data {
                time_delay: "+1.00".to_string(),
                scan: 4
            }
        );
    }

    #[test]
    fn classifies_negative_time_delay() {
        let role = classify("data.timedelay.-5.50.nscan.01.pumpon.tif");
        assert_eq!(
            role,
            FileRole::Data {
                time_delay: "-5.50".to_string(),
                scan: 1
            }
        );
    }

    #[test]
    fn classifies_pumpoff_data() {
        assert_eq!(
            classify("data.nscan.12.pumpoff.tif"),
            FileRole::PumpoffData { scan: 12 }
        );
    }

    #[test]
    fn classifies_backgrounds() {
        assert_eq!(
            classify("background.1.pumpon.tif"),
            FileRole::PumponBackground
        );
        assert_eq!(
            classify("background.1.pumpoff.tif"),
            FileRole::PumpoffBackground
        );
    }

    #[test]
    fn unrecognized_files_are_ignored() {
        assert_eq!(classify("tagfile.txt.tif"), FileRole::Unrecognized);
    }

    #[test]
    fn data_filename_round_trips_zero_padding_and_sign() {
        assert_eq!(
            data_filename(1.0, 4),
            "data.timedelay.+1.00.nscan.04.pumpon.tif"
        );
        assert_eq!(
            data_filename(-5.5, 1),
            "data.timedelay.-5.50.nscan.01.pumpon.tif"
        );
    }

    #[test]
    fn acquisition_date_parses_directory_name() {
        assert_eq!(
            acquisition_date_from_dirname("2016.10.18.11.10.VO2_vb_16.2mJ"),
            "2016.10.18.11.10"
        );
        assert_eq!(acquisition_date_from_dirname("not_a_date_dir"), "0.0.0.0.0");
    }
}
