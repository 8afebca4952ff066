//! Image File Directory parsing, generalizing the teacher's `tiff::ifd::IFD`
//! trait (which split `TiffIFD`/`BigTiffIFD` by pointer width) down to the
//! single classic-TIFF dialect this crate reads and writes.

use binrw::BinRead;

use super::tags::TiffTagEntry;

#[derive(Debug, Clone, BinRead)]
#[br(little)]
pub struct TiffIfd {
    pub num_tags: u16,
    #[br(count = num_tags)]
    pub tags: Vec<TiffTagEntry>,
    pub next_ifd: u32,
}

impl TiffIfd {
    pub fn get(&self, tag: u16) -> Option<&TiffTagEntry> {
        self.tags.iter().find(|t| t.tag == tag)
    }

    pub fn width(&self) -> Option<u32> {
        self.get(256).map(|t| t.as_u32())
    }

    pub fn height(&self) -> Option<u32> {
        self.get(257).map(|t| t.as_u32())
    }

    pub fn bits_per_sample(&self) -> Option<u32> {
        self.get(258).map(|t| t.as_u32())
    }

    pub fn strip_offset(&self) -> Option<u32> {
        self.get(273).map(|t| t.as_u32())
    }

    pub fn strip_byte_count(&self) -> Option<u32> {
        self.get(279).map(|t| t.as_u32())
    }
}
