//! # ued-reduce
//!
//! `ued_reduce` is the raw-data reduction pipeline for time-resolved
//! electron diffraction exposures: it turns a directory of detector frames
//! indexed by pump-probe time delay and scan into a single persistent,
//! queryable processed dataset, deriving a powder angular average per delay
//! when the sample calls for one.
//!
//! Most uses go through [`corpus::RawCorpus`] to index a raw directory and
//! [`pipeline::process`] to reduce it into a [`store::ProcessedStore`]. The
//! lower-level modules ([`image_io`], [`geometry`], [`centerfind`],
//! [`angular`], [`combine`]) are exposed for the interactive viewers and
//! calculators this crate's GUI consumers build on top of them, per spec §6.

pub mod angular;
pub mod centerfind;
pub mod combine;
pub mod corpus;
pub mod error;
pub mod geometry;
pub mod image_io;
pub mod masked;
pub mod pipeline;
pub mod store;

pub use corpus::RawCorpus;
pub use error::{ReduceError, Result};
pub use geometry::{BeamBlock, Center, Resolution};
pub use pipeline::{process, CancellationToken, ReduceOptions};
pub use store::{Compression, GlobalMetadata, OpenMode, ProcessedStore, SampleType};
