//! Read access to patch datasets, used by `inspect` and the tests.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use npyz::{DType, NpyFile, Order};

use crate::error::DatasetError;
use crate::patch::{Patch, SampleType};

use super::dataset::ElementSpec;

/// Random-access reader over a `.npy` patch dataset.
pub struct DatasetReader {
    path: PathBuf,
    shape: Vec<usize>,
    sample_type: SampleType,
    /// Offset of the first data byte
    data_offset: u64,
}

impl DatasetReader {
    /// Open a dataset and validate its header.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| DatasetError::io(&path, e))?;
        let file_len = file
            .metadata()
            .map_err(|e| DatasetError::io(&path, e))?
            .len();
        let npy = NpyFile::new(BufReader::new(file))
            .map_err(|e| DatasetError::InvalidFormat(e.to_string()))?;

        if matches!(npy.order(), Order::Fortran) {
            return Err(DatasetError::InvalidFormat(
                "Fortran-ordered arrays are not supported".to_string(),
            ));
        }
        let sample_type = match npy.dtype() {
            DType::Plain(descr) => {
                let descr = descr.to_string();
                SampleType::from_npy_descr(&descr).ok_or_else(|| {
                    DatasetError::InvalidFormat(format!("unsupported dtype '{}'", descr))
                })?
            }
            other => {
                return Err(DatasetError::InvalidFormat(format!(
                    "unsupported dtype {:?}",
                    other
                )))
            }
        };
        let shape: Vec<usize> = npy.shape().iter().map(|&d| d as usize).collect();
        if shape.len() != 4 && shape != [0usize] {
            return Err(DatasetError::InvalidFormat(format!(
                "expected a 4-D patch array, got shape {:?}",
                shape
            )));
        }

        // The data section ends the file, so its start follows from the size.
        let data_len = (shape.iter().product::<usize>() * sample_type.size()) as u64;
        let data_offset = file_len.checked_sub(data_len).ok_or_else(|| {
            DatasetError::InvalidFormat(format!(
                "file holds {} bytes, shape {:?} needs {} bytes of data",
                file_len, shape, data_len
            ))
        })?;

        Ok(Self {
            path,
            shape,
            sample_type,
            data_offset,
        })
    }

    /// Full array shape, `[N, height, width, channels]` (or `[0]` for an
    /// empty dataset written without a shape hint).
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn sample_type(&self) -> SampleType {
        self.sample_type
    }

    /// Number of patches.
    pub fn len(&self) -> usize {
        self.shape[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element layout, `None` for a shapeless empty dataset.
    pub fn element_spec(&self) -> Option<ElementSpec> {
        match self.shape.as_slice() {
            [_, h, w, c] => Some(ElementSpec {
                shape: [*h, *w, *c],
                sample_type: self.sample_type,
            }),
            _ => None,
        }
    }

    /// Read patch `index`.
    pub fn read_patch(&self, index: usize) -> Result<Patch, DatasetError> {
        let spec = self.element_spec().filter(|_| index < self.len()).ok_or_else(|| {
            DatasetError::InvalidFormat(format!(
                "patch index {} out of range for {} patches",
                index,
                self.len()
            ))
        })?;

        let io = |e| DatasetError::io(&self.path, e);
        let mut file = File::open(&self.path).map_err(io)?;
        let element_bytes = spec.byte_len();
        file.seek(SeekFrom::Start(
            self.data_offset + (index * element_bytes) as u64,
        ))
        .map_err(io)?;
        let mut data = vec![0u8; element_bytes];
        file.read_exact(&mut data).map_err(io)?;

        let [height, width, channels] = spec.shape;
        Patch::new(height, width, channels, spec.sample_type, data)
            .map_err(|e| DatasetError::InvalidFormat(e.to_string()))
    }

    /// Iterate over all patches in order.
    pub fn patches(&self) -> impl Iterator<Item = Result<Patch, DatasetError>> + '_ {
        (0..self.len()).map(move |index| self.read_patch(index))
    }
}
