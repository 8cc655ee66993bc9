//! Append-only, growable on-disk patch dataset.
//!
//! A [`PatchDataset`] is a single `.npy` file holding an array of shape
//! `(N, height, width, channels)`. `N` is not known while writing, so raw
//! samples are appended to a `<name>.part` sidecar next to the target. On
//! close the final array is emitted through `npyz` with the real shape and
//! the sidecar is removed.
//!
//! # States
//!
//! ```text
//! create() ──▶ Uninitialized ──append()──▶ Initialized(shape, dtype) ──┐
//!                    │                        ▲        │               │
//!                    │                        └append()┘               │
//!                    └──────────close() / drop─────────┴──▶ Closed ◀───┘
//! ```
//!
//! # Growth
//!
//! Sidecar space is reserved `chunk_len` elements at a time, so appending
//! `N` patches performs `N / chunk_len` resizes. Each patch is written to
//! the sidecar once and copied to the target once.

use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use npyz::{NpyWriter, WriterBuilder};
use tracing::{debug, warn};

use crate::error::DatasetError;
use crate::patch::{Patch, SampleType};

/// Default number of elements reserved per growth step.
pub const DEFAULT_CHUNK_LEN: usize = 64;

/// Bytes copied from the sidecar per batch when finalizing.
const COPY_BUF_LEN: usize = 1 << 20;

/// Shape and sample type shared by every element of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementSpec {
    /// `[height, width, channels]`
    pub shape: [usize; 3],
    pub sample_type: SampleType,
}

impl ElementSpec {
    pub fn of(patch: &Patch) -> Self {
        Self {
            shape: patch.shape(),
            sample_type: patch.sample_type(),
        }
    }

    /// Size of one element in bytes.
    pub fn byte_len(&self) -> usize {
        self.shape.iter().product::<usize>() * self.sample_type.size()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DatasetState {
    Uninitialized,
    Initialized(ElementSpec),
    Closed,
}

/// Writer for a growable patch dataset.
///
/// The file is exclusively owned by one writer; [`PatchDataset::create`]
/// refuses to open an existing path.
pub struct PatchDataset {
    path: PathBuf,
    part_path: PathBuf,
    output: Option<File>,
    writer: BufWriter<File>,
    state: DatasetState,
    len: usize,
    reserved: usize,
    chunk_len: usize,
    empty_hint: Option<ElementSpec>,
}

/// `<path>.part`
fn part_path_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".part");
    PathBuf::from(name)
}

impl PatchDataset {
    /// Create a new, empty dataset at `path`.
    ///
    /// # Errors
    ///
    /// - [`DatasetError::AlreadyExists`] if `path` exists
    /// - [`DatasetError::Io`] if the file or its sidecar cannot be created
    pub fn create(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let path = path.as_ref().to_path_buf();
        let output = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => DatasetError::AlreadyExists(path.clone()),
                _ => DatasetError::io(&path, e),
            })?;

        let part_path = part_path_for(&path);
        let part = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&part_path)
            .map_err(|e| DatasetError::io(&part_path, e))?;

        debug!(path = %path.display(), "Created patch dataset");
        Ok(Self {
            path,
            part_path,
            output: Some(output),
            writer: BufWriter::new(part),
            state: DatasetState::Uninitialized,
            len: 0,
            reserved: 0,
            chunk_len: DEFAULT_CHUNK_LEN,
            empty_hint: None,
        })
    }

    /// Set how many elements are reserved per growth step (minimum 1).
    pub fn with_chunk_len(mut self, chunk_len: usize) -> Self {
        self.chunk_len = chunk_len.max(1);
        self
    }

    /// Element shape to record if the dataset is closed without any patch.
    ///
    /// Ignored once the first patch has fixed the shape.
    pub fn set_empty_hint(&mut self, spec: ElementSpec) {
        self.empty_hint = Some(spec);
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of patches appended so far.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_closed(&self) -> bool {
        self.state == DatasetState::Closed
    }

    /// Element layout, fixed by the first appended patch.
    pub fn element_spec(&self) -> Option<ElementSpec> {
        match self.state {
            DatasetState::Initialized(spec) => Some(spec),
            _ => None,
        }
    }

    /// Append one patch at the end of the dataset.
    ///
    /// The first patch fixes the element shape and sample type. A later patch
    /// that differs is rejected with [`DatasetError::ShapeMismatch`] and the
    /// patches already written are left untouched.
    pub fn append(&mut self, patch: &Patch) -> Result<(), DatasetError> {
        let actual = ElementSpec::of(patch);
        let spec = match self.state {
            DatasetState::Closed => return Err(DatasetError::Closed),
            DatasetState::Uninitialized => {
                debug!(
                    shape = ?actual.shape,
                    dtype = %actual.sample_type,
                    "Dataset element shape fixed by first patch"
                );
                self.state = DatasetState::Initialized(actual);
                actual
            }
            DatasetState::Initialized(spec) => spec,
        };

        if spec != actual {
            return Err(DatasetError::ShapeMismatch {
                expected_shape: spec.shape,
                expected_dtype: spec.sample_type,
                actual_shape: actual.shape,
                actual_dtype: actual.sample_type,
            });
        }

        if self.len == self.reserved {
            self.reserve_chunk(spec)?;
        }

        self.writer
            .write_all(patch.as_bytes())
            .map_err(|e| DatasetError::io(&self.part_path, e))?;
        self.len += 1;
        Ok(())
    }

    fn reserve_chunk(&mut self, spec: ElementSpec) -> Result<(), DatasetError> {
        let reserved = self.reserved + self.chunk_len;
        let size = (reserved * spec.byte_len()) as u64;
        self.writer
            .get_ref()
            .set_len(size)
            .map_err(|e| DatasetError::io(&self.part_path, e))?;
        self.reserved = reserved;
        Ok(())
    }

    /// Emit the final array, remove the sidecar and flush to disk.
    ///
    /// Closing an empty dataset produces a valid file with zero elements.
    /// Closing twice is a no-op.
    pub fn close(&mut self) -> Result<(), DatasetError> {
        let (sample_type, shape) = match self.state {
            DatasetState::Closed => return Ok(()),
            DatasetState::Initialized(spec) => (
                spec.sample_type,
                vec![self.len, spec.shape[0], spec.shape[1], spec.shape[2]],
            ),
            DatasetState::Uninitialized => match self.empty_hint {
                Some(hint) => (
                    hint.sample_type,
                    vec![0, hint.shape[0], hint.shape[1], hint.shape[2]],
                ),
                None => (SampleType::U8, vec![0]),
            },
        };
        self.state = DatasetState::Closed;

        self.writer
            .flush()
            .map_err(|e| DatasetError::io(&self.part_path, e))?;
        let output = self.output.take().ok_or(DatasetError::Closed)?;

        let shape: Vec<u64> = shape.iter().map(|&d| d as u64).collect();
        let samples = shape.iter().product::<u64>() as usize;
        let part = self.writer.get_mut();
        part.seek(SeekFrom::Start(0))
            .map_err(|e| DatasetError::io(&self.part_path, e))?;
        let mut source = BufReader::new(part);
        let mut sink = BufWriter::new(output);

        let written = match sample_type {
            SampleType::U8 => {
                copy_samples(&mut source, &mut sink, &shape, samples, |b: &[u8]| b[0])
            }
            SampleType::U16 => copy_samples(&mut source, &mut sink, &shape, samples, |b: &[u8]| {
                u16::from_le_bytes([b[0], b[1]])
            }),
            SampleType::F32 => copy_samples(&mut source, &mut sink, &shape, samples, |b: &[u8]| {
                f32::from_le_bytes([b[0], b[1], b[2], b[3]])
            }),
        };
        written
            .and_then(|()| sink.flush())
            .and_then(|()| sink.get_ref().sync_all())
            .map_err(|e| DatasetError::io(&self.path, e))?;

        std::fs::remove_file(&self.part_path)
            .map_err(|e| DatasetError::io(&self.part_path, e))?;

        debug!(path = %self.path.display(), patches = self.len, "Closed patch dataset");
        Ok(())
    }
}

/// Stream `samples` little-endian values from `source` into a C-order
/// `.npy` array of `shape` written to `sink`.
fn copy_samples<T, R, W>(
    source: &mut R,
    sink: &mut W,
    shape: &[u64],
    samples: usize,
    decode: fn(&[u8]) -> T,
) -> io::Result<()>
where
    T: npyz::AutoSerialize,
    R: Read,
    W: Write,
{
    let mut writer: NpyWriter<T, &mut W> = npyz::WriteOptions::new()
        .default_dtype()
        .shape(shape)
        .writer(sink)
        .begin_nd()?;

    let size = std::mem::size_of::<T>();
    let mut buf = vec![0u8; COPY_BUF_LEN - COPY_BUF_LEN % size];
    let mut remaining = samples * size;
    while remaining > 0 {
        let n = remaining.min(buf.len());
        source.read_exact(&mut buf[..n])?;
        writer.extend(buf[..n].chunks_exact(size).map(decode))?;
        remaining -= n;
    }
    writer.finish()
}

impl Drop for PatchDataset {
    fn drop(&mut self) {
        if self.is_closed() {
            return;
        }
        if let Err(e) = self.close() {
            warn!(path = %self.path.display(), "Failed to finalize dataset on drop: {}", e);
        }
    }
}
