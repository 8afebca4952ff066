use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use binrw::BinRead;
use ndarray::Array2;

use crate::error::{ReduceError, Result};

use super::ifd::TiffIfd;

/// Reads a single-frame, single-strip, uncompressed, unsigned 16-bit
/// grayscale classic TIFF -- the dialect detector frames are written in
/// (spec §4.1). Only little-endian (`II`) byte order is supported, which
/// covers every detector export this pipeline has been asked to read; a
/// big-endian file is reported as a `DecodeError` rather than silently
/// mis-parsed.
pub fn read_tiff<P: AsRef<Path>>(path: P) -> Result<Array2<u16>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|_| ReduceError::ImageNotFound(path.to_path_buf()))?;
    let mut reader = BufReader::new(file);

    let mut byte_order = [0u8; 2];
    reader.read_exact(&mut byte_order)?;
    if &byte_order != b"II" {
        return Err(ReduceError::DecodeError(
            "only little-endian (II) classic TIFF is supported".into(),
        ));
    }

    let mut magic_bytes = [0u8; 2];
    reader.read_exact(&mut magic_bytes)?;
    let magic = u16::from_le_bytes(magic_bytes);
    if magic != 42 {
        return Err(ReduceError::DecodeError(format!(
            "not a classic TIFF (magic {magic})"
        )));
    }

    let mut offset_bytes = [0u8; 4];
    reader.read_exact(&mut offset_bytes)?;
    let ifd_offset = u32::from_le_bytes(offset_bytes);

    reader.seek(SeekFrom::Start(ifd_offset as u64))?;
    let ifd =
        TiffIfd::read(&mut reader).map_err(|err| ReduceError::DecodeError(err.to_string()))?;

    let width = ifd
        .width()
        .ok_or_else(|| ReduceError::DecodeError("missing ImageWidth tag".into()))? as usize;
    let height = ifd
        .height()
        .ok_or_else(|| ReduceError::DecodeError("missing ImageLength tag".into()))? as usize;
    let bits = ifd.bits_per_sample().unwrap_or(16);
    if bits != 16 {
        return Err(ReduceError::DecodeError(format!(
            "expected 16-bit samples, found {bits}"
        )));
    }
    let strip_offset = ifd
        .strip_offset()
        .ok_or_else(|| ReduceError::DecodeError("missing StripOffsets tag".into()))?;

    let expected_bytes = width * height * 2;
    if let Some(strip_bytes) = ifd.strip_byte_count() {
        if strip_bytes as usize != expected_bytes {
            return Err(ReduceError::DecodeError(format!(
                "strip byte count {strip_bytes} does not match {width}x{height} u16 samples"
            )));
        }
    }

    reader.seek(SeekFrom::Start(strip_offset as u64))?;
    let mut raw = vec![0u8; expected_bytes];
    reader
        .read_exact(&mut raw)
        .map_err(|_| ReduceError::DecodeError("truncated pixel data".into()))?;

    let mut samples = Vec::with_capacity(width * height);
    for chunk in raw.chunks_exact(2) {
        samples.push(u16::from_le_bytes([chunk[0], chunk[1]]));
    }

    Array2::from_shape_vec((height, width), samples)
        .map_err(|err| ReduceError::DecodeError(err.to_string()))
}
