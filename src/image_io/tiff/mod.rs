//! Classic-TIFF I/O for detector frames (spec §4.1, §6). Purely an I/O
//! concern -- does not know about masking, centers, or scans -- mirroring
//! the teacher's own separation of `tiff` from the data/imaging layers.

mod ifd;
mod reader;
mod tags;
mod writer;

pub use reader::read_tiff;
pub use writer::write_tiff;
