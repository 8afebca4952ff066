//! MIB binary format (spec §4.1, §6): an ASCII, comma-separated preamble of
//! fixed declared length followed by one or more big-endian pixel payloads.
//! Hand-parsed rather than with `binrw` (unlike the TIFF reader's IFD
//! structs): the preamble is a comma-separated text token stream, not a
//! fixed binary layout `binrw` derives cleanly, so the header is split on
//! `,` and the payload decoded with plain `u16::from_be_bytes`/
//! `chunks_exact`.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use ndarray::{Array2, Array3};

use crate::error::{ReduceError, Result};

/// The dtype token in a MIB header. Only unsigned big-endian integers are
/// named in spec §6 ("a dtype token like `U16`"); `U8`/`U32` are read the
/// same way the real Merlin/Medipix firmware would emit them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MibDtype {
    U8,
    U16,
    U32,
}

impl MibDtype {
    fn byte_width(self) -> usize {
        match self {
            MibDtype::U8 => 1,
            MibDtype::U16 => 2,
            MibDtype::U32 => 4,
        }
    }

    fn parse(token: &str) -> Result<Self> {
        match token.trim() {
            "U08" | "U8" => Ok(MibDtype::U8),
            "U16" => Ok(MibDtype::U16),
            "U32" => Ok(MibDtype::U32),
            other => Err(ReduceError::DecodeError(format!(
                "unsupported MIB dtype token {other:?}"
            ))),
        }
    }
}

/// Parsed ASCII preamble of one MIB frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MibHeader {
    pub id: String,
    pub seq_num: u32,
    /// Declared total length, in bytes, of this frame's header -- the
    /// payload for this frame starts exactly `offset` bytes into its block.
    pub offset: usize,
    pub nchips: u32,
    /// `(height, width)`, row-major, matching `Resolution`'s convention.
    pub shape: (usize, usize),
    pub dtype: MibDtype,
}

impl MibHeader {
    fn frame_payload_bytes(&self) -> usize {
        self.shape.0 * self.shape.1 * self.dtype.byte_width()
    }

    fn block_bytes(&self) -> usize {
        self.offset + self.frame_payload_bytes()
    }
}

/// Parses the ASCII preamble of the first frame in a MIB file.
///
/// Real MIB headers are comma-separated tokens padded with trailing commas
/// until the total header reaches `offset` bytes (the offset field
/// describes its own length). We read a generous chunk up front, split on
/// `,`, and only trust the first seven tokens: `ID, seq_num, offset, nchips,
/// width, height, dtype`.
pub fn mib_header<P: AsRef<Path>>(path: P) -> Result<MibHeader> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(|_| ReduceError::ImageNotFound(path.to_path_buf()))?;
    let mut probe = vec![0u8; 512.min(file.metadata()?.len() as usize)];
    file.read_exact(&mut probe)?;
    parse_header_tokens(&probe, path)
}

fn parse_header_tokens(bytes: &[u8], path: &Path) -> Result<MibHeader> {
    let text = String::from_utf8_lossy(bytes);
    let tokens: Vec<&str> = text.split(',').collect();
    if tokens.len() < 7 {
        return Err(ReduceError::DecodeError(format!(
            "MIB header in {} has too few tokens",
            path.display()
        )));
    }

    let id = tokens[0].trim().to_string();
    let seq_num: u32 = tokens[1]
        .trim()
        .parse()
        .map_err(|_| ReduceError::DecodeError("invalid MIB seq_num".into()))?;
    let offset: usize = tokens[2]
        .trim()
        .parse()
        .map_err(|_| ReduceError::DecodeError("invalid MIB offset".into()))?;
    let nchips: u32 = tokens[3]
        .trim()
        .parse()
        .map_err(|_| ReduceError::DecodeError("invalid MIB nchips".into()))?;
    let width: usize = tokens[4]
        .trim()
        .parse()
        .map_err(|_| ReduceError::DecodeError("invalid MIB width".into()))?;
    let height: usize = tokens[5]
        .trim()
        .parse()
        .map_err(|_| ReduceError::DecodeError("invalid MIB height".into()))?;
    let dtype = MibDtype::parse(tokens[6])?;

    Ok(MibHeader {
        id,
        seq_num,
        offset,
        nchips,
        shape: (height, width),
        dtype,
    })
}

fn read_be_payload(bytes: &[u8], dtype: MibDtype, shape: (usize, usize)) -> Array2<u16> {
    let (height, width) = shape;
    let mut samples = Vec::with_capacity(height * width);
    match dtype {
        MibDtype::U8 => samples.extend(bytes.iter().map(|&b| b as u16)),
        MibDtype::U16 => {
            for chunk in bytes.chunks_exact(2) {
                samples.push(u16::from_be_bytes([chunk[0], chunk[1]]));
            }
        }
        MibDtype::U32 => {
            for chunk in bytes.chunks_exact(4) {
                let v = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                samples.push(v.min(u16::MAX as u32) as u16);
            }
        }
    }
    Array2::from_shape_vec(shape, samples).expect("payload length matches shape")
}

/// Lazy, forward-only iterator over the frames of a MIB file, reading one
/// header + payload block at a time without buffering the whole stream
/// (spec §4.1 `imib_read`).
pub struct MibFrames {
    reader: BufReader<File>,
    path: PathBuf,
    file_len: u64,
}

impl MibFrames {
    fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|_| ReduceError::ImageNotFound(path.to_path_buf()))?;
        let file_len = file.metadata()?.len();
        Ok(MibFrames {
            reader: BufReader::new(file),
            path: path.to_path_buf(),
            file_len,
        })
    }
}

impl Iterator for MibFrames {
    type Item = Result<Array2<u16>>;

    fn next(&mut self) -> Option<Self::Item> {
        let pos = match self.reader.stream_position() {
            Ok(p) => p,
            Err(err) => return Some(Err(err.into())),
        };
        if pos >= self.file_len {
            return None;
        }

        let probe_len = 512.min((self.file_len - pos) as usize);
        let mut probe = vec![0u8; probe_len];
        if let Err(err) = self.reader.read_exact(&mut probe) {
            return Some(Err(err.into()));
        }
        let header = match parse_header_tokens(&probe, &self.path) {
            Ok(h) => h,
            Err(err) => return Some(Err(err)),
        };

        // Rewind to the start of this block and seek past the real header.
        if let Err(err) = self.reader.seek(SeekFrom::Current(-(probe_len as i64))) {
            return Some(Err(err.into()));
        }
        if let Err(err) = self.reader.seek(SeekFrom::Current(header.offset as i64)) {
            return Some(Err(err.into()));
        }

        let payload_bytes = header.frame_payload_bytes();
        let mut payload = vec![0u8; payload_bytes];
        if let Err(err) = self.reader.read_exact(&mut payload) {
            return Some(Err(ReduceError::DecodeError(format!(
                "truncated MIB payload: {err}"
            ))));
        }

        Some(Ok(read_be_payload(&payload, header.dtype, header.shape)))
    }
}

pub fn imib_read<P: AsRef<Path>>(path: P) -> Result<MibFrames> {
    MibFrames::open(path.as_ref())
}

/// A MIB file's contents: one frame, or a stack if more than one frame is
/// present (spec §4.1 `mib_read`).
pub enum MibData {
    Frame(Array2<u16>),
    Cube(Array3<u16>),
}

/// Eagerly reads every frame in a MIB file. Returns `Frame` for a
/// single-frame file, `Cube` (shape `(height, width, nframes)`) otherwise.
pub fn mib_read<P: AsRef<Path>>(path: P) -> Result<MibData> {
    let path = path.as_ref();
    let header = mib_header(path)?;
    let file_len = std::fs::metadata(path)?.len();
    let block_bytes = header.block_bytes() as u64;
    if block_bytes == 0 {
        return Err(ReduceError::DecodeError("empty MIB frame block".into()));
    }
    let nframes = (file_len / block_bytes).max(1) as usize;

    let mut frames = Vec::with_capacity(nframes);
    for frame in imib_read(path)? {
        frames.push(frame?);
    }

    match frames.len() {
        0 => Err(ReduceError::DecodeError("MIB file contains no frames".into())),
        1 => Ok(MibData::Frame(frames.into_iter().next().unwrap())),
        _ => {
            let (height, width) = header.shape;
            let mut cube = Array3::<u16>::zeros((height, width, frames.len()));
            for (k, frame) in frames.into_iter().enumerate() {
                cube.index_axis_mut(ndarray::Axis(2), k).assign(&frame);
            }
            Ok(MibData::Cube(cube))
        }
    }
}
