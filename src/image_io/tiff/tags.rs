//! Tag identifiers for the small subset of classic (non-Big) TIFF used by
//! detector frames: a single strip of uncompressed, unsigned, 16-bit
//! grayscale samples. Generalizes the teacher's `TiffTagID`/`Tag` split
//! (`tiff::tags`) to the one dialect this crate actually needs to read and
//! write.

use binrw::BinRead;

#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead)]
#[br(repr = u16)]
pub enum TiffTagId {
    ImageWidth = 256,
    ImageLength = 257,
    BitsPerSample = 258,
    Compression = 259,
    PhotometricInterpretation = 262,
    StripOffsets = 273,
    SamplesPerPixel = 277,
    RowsPerStrip = 278,
    StripByteCounts = 279,
    SampleFormat = 339,
}

/// A single IFD entry: `(tag, field_type, count, value_or_offset)`. Classic
/// TIFF always stores entries as 12 bytes regardless of the tag's real
/// payload size; small values (fits in 4 bytes) are stored inline in
/// `value_or_offset`, larger ones are stored at that file offset.
#[derive(Debug, Clone, Copy, BinRead)]
#[br(little)]
pub struct TiffTagEntry {
    pub tag: u16,
    pub field_type: u16,
    pub count: u32,
    pub value_or_offset: u32,
}

impl TiffTagEntry {
    /// Interprets `value_or_offset` as a plain inline scalar. Only valid for
    /// `SHORT`/`LONG` single-value entries, which is all this crate reads.
    pub fn as_u32(&self) -> u32 {
        match self.field_type {
            3 => self.value_or_offset & 0xFFFF, // SHORT: low 16 bits, little-endian layout
            4 => self.value_or_offset,          // LONG
            _ => self.value_or_offset,
        }
    }

    pub fn tag_id(&self) -> Option<TiffTagId> {
        match self.tag {
            256 => Some(TiffTagId::ImageWidth),
            257 => Some(TiffTagId::ImageLength),
            258 => Some(TiffTagId::BitsPerSample),
            259 => Some(TiffTagId::Compression),
            262 => Some(TiffTagId::PhotometricInterpretation),
            273 => Some(TiffTagId::StripOffsets),
            277 => Some(TiffTagId::SamplesPerPixel),
            278 => Some(TiffTagId::RowsPerStrip),
            279 => Some(TiffTagId::StripByteCounts),
            339 => Some(TiffTagId::SampleFormat),
            _ => None,
        }
    }
}
