//! Image I/O (spec §4.1): decodes 16-bit detector frames from classic TIFF
//! or the MIB raw-binary layout, and the handful of array helpers
//! (casting, background-subtracted averaging) this crate needs on top of
//! them. Purely an I/O concern, same separation the teacher draws between
//! `tiff`/`data`.

mod mib;
mod tiff;

pub use mib::{imib_read, mib_header, mib_read, MibData, MibDtype, MibFrames, MibHeader};
pub use tiff::{read_tiff, write_tiff};

use std::path::Path;

use ndarray::{Array2, ArrayView2};

use crate::error::{ReduceError, Result};

/// Decodes a single detector frame, dispatching on file extension: `.tif`
/// and `.tiff` go through the classic-TIFF reader, `.mib` through the MIB
/// reader (erroring if the file holds more than one frame, since `read`'s
/// contract per spec §4.1 is "a frame", not "a frame or a cube" -- use
/// `mib_read` directly for multi-frame files).
pub fn read<P: AsRef<Path>>(path: P) -> Result<Array2<u16>> {
    let path = path.as_ref();
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("tif") | Some("tiff") => read_tiff(path),
        Some("mib") => match mib_read(path)? {
            MibData::Frame(frame) => Ok(frame),
            MibData::Cube(_) => Err(ReduceError::DecodeError(
                "expected a single-frame MIB file, found multiple frames".into(),
            )),
        },
        _ => Err(ReduceError::DecodeError(format!(
            "unrecognized image extension: {}",
            path.display()
        ))),
    }
}

/// Saturating cast of a signed or floating accumulator back down to
/// unsigned 16-bit, per spec §4.1 `cast_to_16_bits`.
pub fn cast_to_16_bits(frame: ArrayView2<f64>) -> Array2<u16> {
    frame.mapv(|v| v.round().clamp(0.0, u16::MAX as f64) as u16)
}

/// Mean of every TIFF file in `dir` matching `glob_pattern`, optionally
/// subtracting `background` from each file before averaging (spec §4.1
/// `average_tiff`). Fails with `ImageNotFound` if the glob matches nothing.
pub fn average_tiff(
    dir: &Path,
    glob_pattern: &str,
    background: Option<&Array2<u16>>,
) -> Result<Array2<f64>> {
    let pattern = dir.join(glob_pattern);
    let pattern_str = pattern.to_string_lossy().into_owned();
    let mut matches: Vec<_> = glob::glob(&pattern_str)
        .map_err(|err| ReduceError::DecodeError(err.to_string()))?
        .filter_map(|entry| entry.ok())
        .collect();
    matches.sort();

    if matches.is_empty() {
        return Err(ReduceError::ImageNotFound(pattern));
    }

    let mut sum: Option<Array2<f64>> = None;
    let count = matches.len() as f64;
    for path in &matches {
        let frame = read_tiff(path)?;
        let mut as_f64 = frame.mapv(|v| v as f64);
        if let Some(bg) = background {
            as_f64 = as_f64 - bg.mapv(|v| v as f64);
        }
        sum = Some(match sum {
            Some(acc) => acc + as_f64,
            None => as_f64,
        });
    }

    Ok(sum.unwrap() / count)
}
