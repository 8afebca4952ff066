use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use ndarray::Array2;

use crate::error::Result;

/// Writes a single-frame, single-strip, uncompressed, unsigned 16-bit
/// grayscale classic TIFF. Used by the test fixtures (a real raw corpus is
/// always produced by detector software, never by this crate) and by
/// anything that wants to export an averaged frame for inspection in a
/// generic TIFF viewer.
pub fn write_tiff<P: AsRef<Path>>(path: P, frame: &Array2<u16>) -> Result<()> {
    let (height, width) = frame.dim();
    let mut out = BufWriter::new(File::create(path)?);

    // Header: byte order, magic, first IFD offset (right after the header).
    out.write_all(b"II")?;
    out.write_all(&42u16.to_le_bytes())?;
    out.write_all(&8u32.to_le_bytes())?;

    const NUM_TAGS: u16 = 8;
    let ifd_size = 2 + NUM_TAGS as u32 * 12 + 4;
    let pixel_data_offset = 8 + ifd_size;

    out.write_all(&NUM_TAGS.to_le_bytes())?;
    write_tag(&mut out, 256, 4, 1, width as u32)?; // ImageWidth
    write_tag(&mut out, 257, 4, 1, height as u32)?; // ImageLength
    write_tag(&mut out, 258, 3, 1, 16)?; // BitsPerSample
    write_tag(&mut out, 259, 3, 1, 1)?; // Compression: none
    write_tag(&mut out, 262, 3, 1, 1)?; // PhotometricInterpretation: BlackIsZero
    write_tag(&mut out, 273, 4, 1, pixel_data_offset)?; // StripOffsets
    write_tag(&mut out, 277, 3, 1, 1)?; // SamplesPerPixel
    write_tag(&mut out, 279, 4, 1, (width * height * 2) as u32)?; // StripByteCounts
    out.write_all(&0u32.to_le_bytes())?; // next IFD

    for value in frame.iter() {
        out.write_all(&value.to_le_bytes())?;
    }
    out.flush()?;
    Ok(())
}

fn write_tag(
    out: &mut impl Write,
    tag: u16,
    field_type: u16,
    count: u32,
    value: u32,
) -> Result<()> {
    out.write_all(&tag.to_le_bytes())?;
    out.write_all(&field_type.to_le_bytes())?;
    out.write_all(&count.to_le_bytes())?;
    out.write_all(&value.to_le_bytes())?;
    Ok(())
}
