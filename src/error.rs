//! Crate-wide error type. Mirrors the teacher's hand-rolled
//! `CorrosiffError`/`FramesError` family: one enum per concern, `From` impls
//! at the seams, manual `Display`.

use std::path::PathBuf;

/// Errors produced anywhere in the reduction pipeline.
///
/// Each variant corresponds to one of the error kinds named in spec §7.
/// Recoverable conditions (a single missing frame, a sidecar field that
/// fails to parse) never reach this type -- they're logged and absorbed by
/// the caller. This enum is for what actually propagates.
#[derive(Debug)]
pub enum ReduceError {
    ImageNotFound(PathBuf),
    DecodeError(String),
    CorpusMalformed(String),
    CenterNotFound,
    NoFramesForDelay(String),
    StoreError(String),
    Cancelled,
    IOError(std::io::Error),
}

impl From<std::io::Error> for ReduceError {
    fn from(err: std::io::Error) -> Self {
        ReduceError::IOError(err)
    }
}

impl From<binrw::Error> for ReduceError {
    fn from(err: binrw::Error) -> Self {
        ReduceError::DecodeError(err.to_string())
    }
}

impl From<hdf5::Error> for ReduceError {
    fn from(err: hdf5::Error) -> Self {
        ReduceError::StoreError(err.to_string())
    }
}

impl std::error::Error for ReduceError {}

impl std::fmt::Display for ReduceError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ReduceError::ImageNotFound(path) => {
                write!(f, "image not found: {}", path.display())
            }
            ReduceError::DecodeError(msg) => write!(f, "decode error: {msg}"),
            ReduceError::CorpusMalformed(msg) => write!(f, "malformed raw corpus: {msg}"),
            ReduceError::CenterNotFound => write!(f, "center finder found no valid pixels"),
            ReduceError::NoFramesForDelay(t) => {
                write!(f, "no surviving scans for time delay {t}")
            }
            ReduceError::StoreError(msg) => write!(f, "store error: {msg}"),
            ReduceError::Cancelled => write!(f, "processing cancelled"),
            ReduceError::IOError(err) => write!(f, "IO error: {err}"),
        }
    }
}

pub type Result<T> = std::result::Result<T, ReduceError>;
