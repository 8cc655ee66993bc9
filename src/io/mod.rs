//! Patch dataset storage.
//!
//! - [`PatchDataset`]: append-only writer that finalizes a `.npy` file on close
//! - [`DatasetReader`]: random-access reader for finished datasets

mod dataset;
mod reader;

pub use dataset::{ElementSpec, PatchDataset, DEFAULT_CHUNK_LEN};
pub use reader::DatasetReader;
