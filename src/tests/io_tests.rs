//! End-to-end coverage of the public crate surface: index a synthetic raw
//! corpus, run the full reduction pipeline against it, and read the result
//! back out of the persisted store. Exercises only what `ued_reduce`
//! exports, so these tests would still catch a regression that the
//! module-local unit tests miss by construction (a public re-export that
//! stops working, for instance).

use approx::assert_abs_diff_eq;
use ndarray::Array2;
use tempfile::tempdir;

use ued_reduce::image_io::write_tiff;
use ued_reduce::store::OpenMode;
use ued_reduce::{
    process, BeamBlock, CancellationToken, Center, ProcessedStore, RawCorpus, ReduceOptions,
    SampleType,
};

fn write_frame(dir: &std::path::Path, name: &str, value: u16) {
    let frame = Array2::<u16>::from_elem((8, 8), value);
    write_tiff(dir.join(name), &frame).unwrap();
}

fn write_tagfile(dir: &std::path::Path) {
    std::fs::write(
        dir.join("tagfile.txt"),
        "Acquisition date = 2016.10.18.11.10\nFluence = 16.2\nCurrent = 0.5\nExposure = 5s\nEnergy = 90\n",
    )
    .unwrap();
}

#[test]
fn tiny_single_crystal_corpus_reduces_to_flat_frames() {
    let raw_dir = tempdir().unwrap();
    write_tagfile(raw_dir.path());
    for scan in [1u32, 2] {
        for t in ["-1.00", "+0.00", "+1.00"] {
            write_frame(
                raw_dir.path(),
                &format!("data.timedelay.{t}.nscan.{scan:02}.pumpon.tif"),
                1,
            );
        }
    }

    let corpus = RawCorpus::open(raw_dir.path()).unwrap();
    assert_eq!(corpus.fluence(), 16.2);
    assert_eq!(corpus.acquisition_date(), "2016.10.18.11.10");

    let out_dir = tempdir().unwrap();
    let out_path = out_dir.path().join("out.h5");
    let options = ReduceOptions {
        sample_type: SampleType::SingleCrystal,
        beam_block: BeamBlock::NONE,
        workers: 1,
        ..ReduceOptions::default()
    };

    let result = process(&corpus, &out_path, &options, |_| {}, &CancellationToken::new()).unwrap();
    assert_eq!(result, out_path);

    let store = ProcessedStore::open(&out_path, OpenMode::Read).unwrap();
    let meta = store.read_global_metadata().unwrap();
    assert_eq!(meta.fluence, 16.2);
    assert_eq!(meta.sample_type, SampleType::SingleCrystal);
    assert!(!store.is_incomplete().unwrap());

    for key in ["-1.00", "+0.00", "+1.00"] {
        let frame = store.read_intensity(key).unwrap();
        for &v in frame.iter() {
            assert_abs_diff_eq!(v, 1.0, epsilon = 1e-6);
        }
        assert!(store.is_delay_valid(key).unwrap());
    }
}

#[test]
fn missing_frame_is_skipped_but_reduction_completes_with_progress_reported() {
    let raw_dir = tempdir().unwrap();
    for scan in [1u32, 2] {
        for t in ["-1.00", "+0.00", "+1.00"] {
            write_frame(
                raw_dir.path(),
                &format!("data.timedelay.{t}.nscan.{scan:02}.pumpon.tif"),
                3,
            );
        }
    }
    // Drop one scan's frame at one delay: the delay still reduces from its
    // one surviving scan instead of failing outright.
    std::fs::remove_file(raw_dir.path().join("data.timedelay.+0.00.nscan.02.pumpon.tif")).unwrap();

    let corpus = RawCorpus::open(raw_dir.path()).unwrap();
    let out_dir = tempdir().unwrap();
    let out_path = out_dir.path().join("out.h5");
    let options = ReduceOptions {
        sample_type: SampleType::SingleCrystal,
        workers: 1,
        ..ReduceOptions::default()
    };

    let mut percents = Vec::new();
    process(&corpus, &out_path, &options, |p| percents.push(p), &CancellationToken::new()).unwrap();
    assert_eq!(percents, vec![0, 33, 66, 100]);

    let store = ProcessedStore::open(&out_path, OpenMode::Read).unwrap();
    let frame = store.read_intensity("+0.00").unwrap();
    for &v in frame.iter() {
        assert_abs_diff_eq!(v, 3.0, epsilon = 1e-6);
    }
    assert!(store.is_delay_valid("+0.00").unwrap());
}

#[test]
fn powder_sample_produces_a_readable_angular_average_end_to_end() {
    let raw_dir = tempdir().unwrap();
    for scan in [1u32, 2, 3] {
        for t in ["-1.00", "+0.00", "+1.00"] {
            write_frame(
                raw_dir.path(),
                &format!("data.timedelay.{t}.nscan.{scan:02}.pumpon.tif"),
                5,
            );
        }
    }

    let corpus = RawCorpus::open(raw_dir.path()).unwrap();
    let out_dir = tempdir().unwrap();
    let out_path = out_dir.path().join("out.h5");
    let options = ReduceOptions {
        sample_type: SampleType::Powder,
        center: Center::new(4.0, 4.0),
        workers: 2,
        ..ReduceOptions::default()
    };

    process(&corpus, &out_path, &options, |_| {}, &CancellationToken::new()).unwrap();

    let store = ProcessedStore::open(&out_path, OpenMode::Read).unwrap();
    for key in ["-1.00", "+0.00", "+1.00"] {
        let (radius, intensity, error) = store.read_powder(key).unwrap();
        assert!(!radius.is_empty());
        assert_eq!(radius.len(), intensity.len());
        assert_eq!(radius.len(), error.len());
    }
}

#[test]
fn cancelling_before_any_delay_leaves_the_store_marked_incomplete() {
    let raw_dir = tempdir().unwrap();
    for t in ["-1.00", "+0.00"] {
        write_frame(raw_dir.path(), &format!("data.timedelay.{t}.nscan.01.pumpon.tif"), 1);
    }

    let corpus = RawCorpus::open(raw_dir.path()).unwrap();
    let out_dir = tempdir().unwrap();
    let out_path = out_dir.path().join("out.h5");
    let options = ReduceOptions {
        sample_type: SampleType::SingleCrystal,
        workers: 1,
        ..ReduceOptions::default()
    };

    let cancellation = CancellationToken::new();
    cancellation.cancel();
    let err = process(&corpus, &out_path, &options, |_| {}, &cancellation).unwrap_err();
    assert!(matches!(err, ued_reduce::ReduceError::Cancelled));

    let store = ProcessedStore::open(&out_path, OpenMode::Read).unwrap();
    assert!(store.is_incomplete().unwrap());
}
