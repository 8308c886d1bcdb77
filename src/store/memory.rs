//! An in-memory tensor store with a JSON representation.
//!
//! This is not a storage format in its own right. It exists so that small
//! datasets can be written down as fixtures, inspected from the CLI, and
//! exercised in tests without the real store.
//!
//! Samples are kept as dynamic-rank `f64` arrays and cast on read.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use ndarray::{Array2, Array3, ArrayD, Axis, Ix2, Ix3};
use serde::{Deserialize, Serialize};

use super::{Htype, TensorInfo, TensorStore};
use crate::bbox::ImageShape;
use crate::error::DetbridgeError;

/// A dataset held entirely in memory.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InMemoryStore {
    /// Tensors in declaration order.
    pub tensors: Vec<StoredTensor>,
}

/// One named tensor and its samples.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredTensor {
    pub name: String,
    pub htype: Htype,
    #[serde(default)]
    pub info: TensorInfo,
    #[serde(default)]
    pub samples: Vec<ArrayD<f64>>,
}

impl StoredTensor {
    pub fn new(name: impl Into<String>, htype: Htype) -> Self {
        Self {
            name: name.into(),
            htype,
            info: TensorInfo::default(),
            samples: Vec::new(),
        }
    }

    /// Sets the tensor info.
    pub fn with_info(mut self, info: TensorInfo) -> Self {
        self.info = info;
        self
    }

    /// Appends a sample.
    pub fn push_sample(&mut self, sample: ArrayD<f64>) {
        self.samples.push(sample);
    }

    /// Appends a sample, builder style.
    pub fn with_sample<D: ndarray::Dimension>(mut self, sample: ndarray::Array<f64, D>) -> Self {
        self.samples.push(sample.into_dyn());
        self
    }
}

impl InMemoryStore {
    /// Adds a tensor.
    pub fn with_tensor(mut self, tensor: StoredTensor) -> Self {
        self.tensors.push(tensor);
        self
    }

    fn tensor(&self, name: &str) -> Result<&StoredTensor, DetbridgeError> {
        self.tensors
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| DetbridgeError::UnknownTensor(name.to_string()))
    }

    fn sample(&self, name: &str, index: usize) -> Result<&ArrayD<f64>, DetbridgeError> {
        let tensor = self.tensor(name)?;
        tensor
            .samples
            .get(index)
            .ok_or_else(|| DetbridgeError::SampleOutOfRange {
                tensor: name.to_string(),
                index,
                len: tensor.samples.len(),
            })
    }
}

fn shape_error(tensor: &str, index: usize, message: impl Into<String>) -> DetbridgeError {
    DetbridgeError::TensorShape {
        tensor: tensor.to_string(),
        index,
        message: message.into(),
    }
}

/// Adds a trailing axis to 2-D samples so they read as (H, W, 1).
fn as_rank3(
    sample: &ArrayD<f64>,
    tensor: &str,
    index: usize,
) -> Result<Array3<f64>, DetbridgeError> {
    let sample = match sample.ndim() {
        2 => sample.clone().insert_axis(Axis(2)),
        3 => sample.clone(),
        n => return Err(shape_error(tensor, index, format!("expected rank 2 or 3, got rank {n}"))),
    };
    sample
        .into_dimensionality::<Ix3>()
        .map_err(|e| shape_error(tensor, index, e.to_string()))
}

impl TensorStore for InMemoryStore {
    fn len(&self) -> usize {
        self.tensors
            .iter()
            .map(|t| t.samples.len())
            .min()
            .unwrap_or(0)
    }

    fn tensor_names(&self) -> Vec<&str> {
        self.tensors.iter().map(|t| t.name.as_str()).collect()
    }

    fn htype(&self, tensor: &str) -> Option<Htype> {
        self.tensor(tensor).ok().map(|t| t.htype)
    }

    fn info(&self, tensor: &str) -> Option<&TensorInfo> {
        self.tensor(tensor).ok().map(|t| &t.info)
    }

    fn image(&self, tensor: &str, index: usize) -> Result<Array3<u8>, DetbridgeError> {
        let sample = self.sample(tensor, index)?;
        Ok(as_rank3(sample, tensor, index)?.mapv(|v| v as u8))
    }

    fn boxes(&self, tensor: &str, index: usize) -> Result<Array2<f64>, DetbridgeError> {
        let sample = self.sample(tensor, index)?;
        match sample.ndim() {
            // An image without annotations is often stored as an empty vector.
            1 if sample.is_empty() => Ok(Array2::zeros((0, 4))),
            2 => sample
                .clone()
                .into_dimensionality::<Ix2>()
                .map_err(|e| shape_error(tensor, index, e.to_string())),
            n => Err(shape_error(tensor, index, format!("expected rank 2, got rank {n}"))),
        }
    }

    fn labels(&self, tensor: &str, index: usize) -> Result<Vec<u32>, DetbridgeError> {
        let sample = self.sample(tensor, index)?;
        sample
            .iter()
            .map(|&v| {
                if v >= 0.0 && v.fract() == 0.0 && v <= u32::MAX as f64 {
                    Ok(v as u32)
                } else {
                    Err(shape_error(
                        tensor,
                        index,
                        format!("label value {v} is not a non-negative integer"),
                    ))
                }
            })
            .collect()
    }

    fn mask(&self, tensor: &str, index: usize) -> Result<Array3<bool>, DetbridgeError> {
        let sample = self.sample(tensor, index)?;
        Ok(as_rank3(sample, tensor, index)?.mapv(|v| v != 0.0))
    }

    fn image_shape(&self, tensor: &str, index: usize) -> Result<ImageShape, DetbridgeError> {
        let sample = self.sample(tensor, index)?;
        ImageShape::from_dims(sample.shape())
    }
}

/// Reads a store from a JSON file.
///
/// # Errors
/// Returns an error if the file cannot be read or parsed.
pub fn read_store_json(path: &Path) -> Result<InMemoryStore, DetbridgeError> {
    let file = File::open(path).map_err(DetbridgeError::Io)?;
    let reader = BufReader::new(file);

    serde_json::from_reader(reader).map_err(|source| DetbridgeError::StoreJsonParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes a store to a JSON file.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn write_store_json(path: &Path, store: &InMemoryStore) -> Result<(), DetbridgeError> {
    let file = File::create(path).map_err(DetbridgeError::Io)?;
    let writer = BufWriter::new(file);

    serde_json::to_writer_pretty(writer, store).map_err(|source| DetbridgeError::StoreJsonWrite {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads a store from a JSON string.
pub fn from_json_str(json: &str) -> Result<InMemoryStore, serde_json::Error> {
    serde_json::from_str(json)
}

/// Reads a store from JSON bytes.
pub fn from_json_slice(bytes: &[u8]) -> Result<InMemoryStore, serde_json::Error> {
    serde_json::from_slice(bytes)
}

/// Writes a store to a JSON string.
pub fn to_json_string(store: &InMemoryStore) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(store)
}
