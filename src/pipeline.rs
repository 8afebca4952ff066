//! Pipeline driver (spec §4.8): orchestrates the per-delay loop over a raw
//! corpus, writes the persistent store, reports progress, and finalizes
//! powder angular averaging. The inner per-delay combine work is
//! embarrassingly parallel (spec §5); this module bounds that fan-out with a
//! dedicated `rayon` thread pool sized by `ReduceOptions::workers` and keeps
//! store writes themselves strictly sequential and sorted, since the store
//! is a single-writer resource.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ndarray::Array2;
use rayon::prelude::*;

use crate::angular::angular_average;
use crate::centerfind::{DEFAULT_RING_WIDTH, DEFAULT_WINDOW};
use crate::combine::{build_pumpoff_cube, combine_time_delay, CombineResult};
use crate::corpus::RawCorpus;
use crate::error::{ReduceError, Result};
use crate::geometry::{BeamBlock, Center};
use crate::image_io::cast_to_16_bits;
use crate::store::{Compression, GlobalMetadata, OpenMode, ProcessedStore, SampleType};

/// Cooperative cancellation token (spec §5): checked between delays, never
/// inside one, so a delay that's started always finishes and is fully
/// persisted before the driver honors a cancellation request.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Conservative default fan-out (spec §5: "default to one worker on systems
/// with < 8 GB RAM"). The pack carries no memory-introspection crate, so
/// rather than guess at available RAM this crate defaults to the safest
/// value and leaves sizing up to the caller (the `reduce` CLI exposes
/// `--workers`); see DESIGN.md.
pub fn default_workers() -> usize {
    1
}

/// Tunable reduction parameters; spec §4.8's `process` signature collapsed
/// into one struct, since `corpus`/output path/`callback`/cancellation token
/// all have their own parameter slots below.
pub struct ReduceOptions {
    pub center: Center,
    pub radius: f64,
    pub beam_block: BeamBlock,
    pub sample_type: SampleType,
    pub compression: Compression,
    /// `cc` in spec vocabulary: whether to drift-correct each frame via the
    /// center finder before stacking it.
    pub drift_correct: bool,
    pub window: i64,
    pub ring_width: f64,
    pub workers: usize,
}

impl Default for ReduceOptions {
    fn default() -> Self {
        ReduceOptions {
            center: Center::new(0.0, 0.0),
            radius: 50.0,
            beam_block: BeamBlock::NONE,
            sample_type: SampleType::SingleCrystal,
            compression: Compression::Lzf,
            drift_correct: false,
            window: DEFAULT_WINDOW,
            ring_width: DEFAULT_RING_WIDTH,
            workers: default_workers(),
        }
    }
}

/// Runs the full reduction pipeline (spec §4.8).
///
/// 1. Opens the store write-new and copies all metadata and flags.
/// 2. Writes the pump-off cube and the two average backgrounds (all-zero if
///    no background files were found).
/// 3. Combines and persists each time delay in sorted order (spec §5: time
///    delays are processed and persisted in their sorted order), invoking
///    `callback` with a monotonically non-decreasing percentage after each
///    one.
/// 4. If `sample_type` is powder, reopens the store read-write and computes
///    the angular average for every delay, only after every 2D delay has
///    already been committed (spec §5).
/// 5. Calls `callback(100)` and returns the output path.
///
/// A cancellation request observed between delays leaves the partial store
/// closed with `incomplete = true` and returns `ReduceError::Cancelled`; a
/// failure opening or writing the store aborts with `StoreError`. All other
/// per-delay failures downgrade that delay (it's written as all-`NaN` with
/// `valid = false`) and processing continues.
pub fn process<P: AsRef<Path>>(
    corpus: &RawCorpus,
    out_path: P,
    options: &ReduceOptions,
    mut callback: impl FnMut(u8),
    cancellation: &CancellationToken,
) -> Result<PathBuf> {
    let out_path = out_path.as_ref().to_path_buf();
    tracing::info!(path = %out_path.display(), "opening store for write-new");

    let meta = GlobalMetadata::from_corpus(corpus, options.center, options.beam_block, options.sample_type);
    let store = ProcessedStore::create_new(&out_path, &meta)?;

    let resolution = corpus.resolution();

    let pumpoff_cube = build_pumpoff_cube(resolution, corpus.scans(), |scan| corpus.raw_pumpoff(scan))?;
    store.write_pumpoff_cube(&pumpoff_cube, options.compression)?;

    let pumpon_background_f64 = corpus.pumpon_background().unwrap_or_else(|| Array2::zeros(resolution.shape()));
    let pumpon_background_u16 = cast_to_16_bits(pumpon_background_f64.view());
    store.write_background("background_pumpon", &pumpon_background_u16, options.compression)?;

    let pumpoff_background_u16 = corpus
        .pumpoff_background()
        .map(|bg| cast_to_16_bits(bg.view()))
        .unwrap_or_else(|| Array2::zeros(resolution.shape()));
    store.write_background("background_pumpoff", &pumpoff_background_u16, options.compression)?;

    let scans = corpus.scans().to_vec();
    let time_points = corpus.time_points().to_vec();
    let time_points_str = corpus.time_points_str().to_vec();
    let n = time_points.len();

    let indexed: Vec<(usize, f64, String)> = time_points
        .iter()
        .copied()
        .zip(time_points_str.iter().cloned())
        .enumerate()
        .map(|(i, (t, key))| (i, t, key))
        .collect();

    let chunk_size = options.workers.max(1);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(chunk_size)
        .build()
        .map_err(|err| ReduceError::StoreError(err.to_string()))?;

    for chunk in indexed.chunks(chunk_size) {
        let results: Vec<(usize, String, Result<CombineResult>)> = pool.install(|| {
            chunk
                .par_iter()
                .map(|item| {
                    let (i, t, key) = (item.0, item.1, item.2.clone());
                    let result = combine_time_delay(
                        resolution,
                        &scans,
                        |scan| corpus.raw_data(t, scan),
                        &pumpon_background_f64,
                        options.beam_block,
                        options.center,
                        options.radius,
                        options.drift_correct,
                        options.window,
                        options.ring_width,
                    );
                    (i, key, result)
                })
                .collect()
        });

        for (i, key, result) in results {
            if cancellation.is_cancelled() {
                tracing::warn!("cancellation requested, leaving partial store marked incomplete");
                store.mark_incomplete()?;
                return Err(ReduceError::Cancelled);
            }

            match result {
                Ok(combined) => {
                    if combined.missing_scans > 0 {
                        tracing::warn!(
                            timedelay = key,
                            missing = combined.missing_scans,
                            "some scans missing for this delay"
                        );
                    }
                    let intensity = combined.intensity.mapv(|v| v as f32);
                    store.write_intensity(&key, &intensity, true, options.compression)?;
                }
                Err(ReduceError::NoFramesForDelay(msg)) => {
                    tracing::warn!(timedelay = key, "{msg}; writing NaN frame");
                    let nan_frame = Array2::<f32>::from_elem(resolution.shape(), f32::NAN);
                    store.write_intensity(&key, &nan_frame, false, options.compression)?;
                }
                Err(other) => return Err(other),
            }

            let percent = ((100 * i) / n.max(1)) as u8;
            callback(percent);
        }
    }

    if options.sample_type.is_powder() {
        drop(store);
        tracing::info!("reopening store read-write for powder angular averaging");
        let store = ProcessedStore::open(&out_path, OpenMode::ReadWrite)?;
        for key in &time_points_str {
            if !store.is_delay_valid(key)? {
                tracing::warn!(timedelay = key, "skipping angular average for invalid delay");
                continue;
            }
            let intensity = store.read_intensity(key)?.mapv(|v| v as f64);
            let averaged = angular_average(intensity.view(), options.center, options.beam_block);
            store.write_powder(
                key,
                &averaged.radii,
                &averaged.intensities,
                &averaged.errors,
                options.compression,
            )?;
        }
    }

    callback(100);
    tracing::info!(path = %out_path.display(), "reduction complete");
    Ok(out_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_io::write_tiff;
    use crate::store::OpenMode;
    use approx::assert_abs_diff_eq;
    use tempfile::tempdir;

    fn make_tiny_corpus(root: &Path) {
        let frame = Array2::<u16>::from_elem((8, 8), 1);
        for scan in [1u32, 2] {
            for t in ["-1.00", "+0.00", "+1.00"] {
                write_tiff(
                    root.join(format!("data.timedelay.{t}.nscan.{scan:02}.pumpon.tif")),
                    &frame,
                )
                .unwrap();
            }
        }
    }

    #[test]
    fn tiny_corpus_reduces_to_flat_frames() {
        let raw_dir = tempdir().unwrap();
        make_tiny_corpus(raw_dir.path());
        let corpus = RawCorpus::open(raw_dir.path()).unwrap();

        let out_dir = tempdir().unwrap();
        let out_path = out_dir.path().join("out.h5");

        let options = ReduceOptions {
            sample_type: SampleType::SingleCrystal,
            workers: 1,
            ..ReduceOptions::default()
        };

        let mut percents = Vec::new();
        let result = process(&corpus, &out_path, &options, |p| percents.push(p), &CancellationToken::new()).unwrap();
        assert_eq!(result, out_path);
        assert_eq!(percents, vec![0, 33, 66, 100]);

        let store = ProcessedStore::open(&out_path, OpenMode::Read).unwrap();
        for key in ["-1.00", "+0.00", "+1.00"] {
            let frame = store.read_intensity(key).unwrap();
            for &v in frame.iter() {
                assert_abs_diff_eq!(v, 1.0, epsilon = 1e-6);
            }
        }
        let pumpon_bg = store.read_background("background_pumpon").unwrap();
        assert!(pumpon_bg.iter().all(|&v| v == 0));
    }

    #[test]
    fn missing_frame_is_warned_and_delay_still_written() {
        let raw_dir = tempdir().unwrap();
        make_tiny_corpus(raw_dir.path());
        // Remove one frame to simulate the missing-frame seed scenario.
        std::fs::remove_file(raw_dir.path().join("data.timedelay.+0.00.nscan.02.pumpon.tif")).unwrap();
        let corpus = RawCorpus::open(raw_dir.path()).unwrap();

        let out_dir = tempdir().unwrap();
        let out_path = out_dir.path().join("out.h5");
        let options = ReduceOptions {
            sample_type: SampleType::SingleCrystal,
            workers: 1,
            ..ReduceOptions::default()
        };
        process(&corpus, &out_path, &options, |_| {}, &CancellationToken::new()).unwrap();

        let store = ProcessedStore::open(&out_path, OpenMode::Read).unwrap();
        let frame = store.read_intensity("+0.00").unwrap();
        for &v in frame.iter() {
            assert_abs_diff_eq!(v, 1.0, epsilon = 1e-6);
        }
        assert!(store.is_delay_valid("+0.00").unwrap());
    }

    #[test]
    fn cancellation_marks_store_incomplete() {
        let raw_dir = tempdir().unwrap();
        make_tiny_corpus(raw_dir.path());
        let corpus = RawCorpus::open(raw_dir.path()).unwrap();

        let out_dir = tempdir().unwrap();
        let out_path = out_dir.path().join("out.h5");
        let options = ReduceOptions {
            sample_type: SampleType::SingleCrystal,
            workers: 1,
            ..ReduceOptions::default()
        };
        let token = CancellationToken::new();
        token.cancel();
        let err = process(&corpus, &out_path, &options, |_| {}, &token).unwrap_err();
        assert!(matches!(err, ReduceError::Cancelled));

        let store = ProcessedStore::open(&out_path, OpenMode::Read).unwrap();
        assert!(store.is_incomplete().unwrap());
    }

    #[test]
    fn powder_sample_writes_angular_average() {
        let raw_dir = tempdir().unwrap();
        make_tiny_corpus(raw_dir.path());
        let corpus = RawCorpus::open(raw_dir.path()).unwrap();

        let out_dir = tempdir().unwrap();
        let out_path = out_dir.path().join("out.h5");
        let options = ReduceOptions {
            sample_type: SampleType::Powder,
            center: Center::new(4.0, 4.0),
            workers: 1,
            ..ReduceOptions::default()
        };
        process(&corpus, &out_path, &options, |_| {}, &CancellationToken::new()).unwrap();

        let store = ProcessedStore::open(&out_path, OpenMode::Read).unwrap();
        let (radius, intensity, error) = store.read_powder("+0.00").unwrap();
        assert_eq!(radius.len(), intensity.len());
        assert_eq!(radius.len(), error.len());
    }
}
