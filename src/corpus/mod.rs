//! Raw corpus index (spec §4.2, §3): a read-only view of a raw-data
//! directory. Parses every `.tif`/`.tiff` filename to recover the set of
//! time delays and scans present, reads `tagfile.txt` for the experimental
//! scalars, and exposes lookup/background-averaging helpers on top of
//! `image_io`.
//!
//! The teacher's "cached property" idiom (§9) is collapsed into eager
//! parsing at `open()` time -- raw corpora here are small enough (a few
//! hundred filenames) that there's no benefit to memoizing lazily, and an
//! eagerly-validated corpus can report `CorpusMalformed` up front rather
//! than on first access.

mod filename;
mod sidecar;

pub use filename::{classify, data_filename, FileRole};

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use ndarray::Array2;

use crate::error::{ReduceError, Result};
use crate::geometry::Resolution;
use crate::image_io;

/// A read-only, immutable view of a raw-data directory, built once at
/// `open()` and never mutated (spec §3 lifecycle: "created on open,
/// immutable; destroyed on close").
#[derive(Debug, Clone)]
pub struct RawCorpus {
    directory: PathBuf,
    resolution: Resolution,
    time_points: Vec<f64>,
    time_points_str: Vec<String>,
    scans: Vec<u32>,
    acquisition_date: String,
    fluence: f64,
    current: f64,
    exposure: f64,
    energy: f64,
}

impl RawCorpus {
    /// Opens and indexes a raw corpus directory.
    pub fn open<P: AsRef<Path>>(directory: P) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        if !directory.is_dir() {
            return Err(ReduceError::CorpusMalformed(format!(
                "{} is not a directory",
                directory.display()
            )));
        }

        let mut time_points_str: BTreeSet<String> = BTreeSet::new();
        let mut scans: BTreeSet<u32> = BTreeSet::new();
        let mut first_data_file: Option<PathBuf> = None;

        for entry in std::fs::read_dir(&directory)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !(name.ends_with(".tif") || name.ends_with(".tiff")) {
                continue;
            }

            match filename::classify(name) {
                FileRole::Data { time_delay, scan } => {
                    time_points_str.insert(time_delay);
                    scans.insert(scan);
                    if first_data_file.is_none() {
                        first_data_file = Some(entry.path());
                    }
                }
                FileRole::PumpoffData { scan } => {
                    scans.insert(scan);
                }
                FileRole::PumponBackground
                | FileRole::PumpoffBackground
                | FileRole::Unrecognized => {}
            }
        }

        if time_points_str.is_empty() {
            return Err(ReduceError::CorpusMalformed(format!(
                "no data.timedelay.* frames found under {}",
                directory.display()
            )));
        }

        let mut time_points_str: Vec<String> = time_points_str.into_iter().collect();
        time_points_str.sort_by(|a, b| {
            a.parse::<f64>()
                .unwrap()
                .partial_cmp(&b.parse::<f64>().unwrap())
                .unwrap()
        });
        let time_points: Vec<f64> = time_points_str
            .iter()
            .map(|s| s.parse::<f64>().unwrap())
            .collect();
        let scans: Vec<u32> = scans.into_iter().collect();

        let resolution = {
            let path = first_data_file.expect("time_points non-empty implies a data file exists");
            let frame = image_io::read(&path)?;
            let (h, w) = frame.dim();
            Resolution::new(h, w)
        };

        let acquisition_date =
            filename::acquisition_date_from_dirname(
                directory
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or(""),
            );

        let sidecar_path = directory.join("tagfile.txt");
        let sidecar = if sidecar_path.is_file() {
            sidecar::parse_sidecar(&sidecar_path)?
        } else {
            sidecar::Sidecar::default()
        };

        Ok(RawCorpus {
            directory,
            resolution,
            time_points,
            time_points_str,
            scans,
            acquisition_date,
            fluence: sidecar.fluence,
            current: sidecar.current,
            exposure: sidecar.exposure,
            energy: sidecar.energy,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn time_points(&self) -> &[f64] {
        &self.time_points
    }

    pub fn time_points_str(&self) -> &[String] {
        &self.time_points_str
    }

    pub fn scans(&self) -> &[u32] {
        &self.scans
    }

    pub fn acquisition_date(&self) -> &str {
        &self.acquisition_date
    }

    pub fn fluence(&self) -> f64 {
        self.fluence
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn exposure(&self) -> f64 {
        self.exposure
    }

    pub fn energy(&self) -> f64 {
        self.energy
    }

    /// Reads the raw pump-on frame for `(timedelay, scan)` (spec §4.2
    /// `raw_data`). Fails with `ImageNotFound` if the constructed filename
    /// doesn't exist.
    pub fn raw_data(&self, timedelay: f64, scan: u32) -> Result<Array2<u16>> {
        let path = self.directory.join(data_filename(timedelay, scan));
        image_io::read(&path)
    }

    /// Reads the pump-off frame for one scan, `data.nscan.<scan>.pumpoff.tif`.
    pub fn raw_pumpoff(&self, scan: u32) -> Result<Array2<u16>> {
        let path = self.directory.join(format!("data.nscan.{scan}.pumpoff.tif"));
        image_io::read(&path)
    }

    /// Average of every `background.*.pumpon.tif` file, or `None` if none
    /// exist (the driver then persists an all-zero background, per spec
    /// §4.8 step 2).
    pub fn pumpon_background(&self) -> Option<Array2<f64>> {
        image_io::average_tiff(&self.directory, "background.*.pumpon.tif", None).ok()
    }

    pub fn pumpoff_background(&self) -> Option<Array2<f64>> {
        image_io::average_tiff(&self.directory, "background.*.pumpoff.tif", None).ok()
    }
}
