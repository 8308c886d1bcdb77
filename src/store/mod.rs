//! The seam between detbridge and the tensor store that owns the data.
//!
//! Datasets are collections of named tensors, each tagged with an htype
//! ("image", "bbox", ...) and some free-form info. Storage, caching and
//! streaming all belong to the store; detbridge only reads samples through
//! [`TensorStore`].

mod memory;

pub use memory::{
    from_json_slice, from_json_str, read_store_json, to_json_string, write_store_json,
    InMemoryStore, StoredTensor,
};

use std::fmt;

use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};

use crate::bbox::{FormatDescriptor, ImageShape};
use crate::error::DetbridgeError;

/// The semantic type of a tensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Htype {
    #[serde(rename = "image")]
    Image,
    #[serde(rename = "bbox")]
    BBox,
    #[serde(rename = "class_label")]
    ClassLabel,
    #[serde(rename = "binary_mask")]
    BinaryMask,
    /// Any htype detbridge does not interpret.
    #[serde(other, rename = "generic")]
    Other,
}

impl Htype {
    pub fn as_str(&self) -> &'static str {
        match self {
            Htype::Image => "image",
            Htype::BBox => "bbox",
            Htype::ClassLabel => "class_label",
            Htype::BinaryMask => "binary_mask",
            Htype::Other => "generic",
        }
    }
}

impl fmt::Display for Htype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata stored alongside a tensor.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TensorInfo {
    /// Box encoding metadata (box tensors only).
    #[serde(default, skip_serializing_if = "FormatDescriptor::is_empty")]
    pub coords: FormatDescriptor,

    /// Class names indexed by label value (label tensors only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub class_names: Vec<String>,
}

/// Read access to a dataset of named tensors.
///
/// Sample reads return owned arrays; implementations are free to decode or
/// copy on every call.
pub trait TensorStore {
    /// Number of samples in the dataset.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tensor names in declaration order.
    fn tensor_names(&self) -> Vec<&str>;

    fn contains(&self, tensor: &str) -> bool {
        self.tensor_names().contains(&tensor)
    }

    fn htype(&self, tensor: &str) -> Option<Htype>;

    fn info(&self, tensor: &str) -> Option<&TensorInfo>;

    /// Reads an image sample as (height, width, channels).
    fn image(&self, tensor: &str, index: usize) -> Result<Array3<u8>, DetbridgeError>;

    /// Reads a box sample as (N, 4).
    fn boxes(&self, tensor: &str, index: usize) -> Result<Array2<f64>, DetbridgeError>;

    /// Reads a label sample as a flat list.
    fn labels(&self, tensor: &str, index: usize) -> Result<Vec<u32>, DetbridgeError>;

    /// Reads a mask sample as (height, width, N).
    fn mask(&self, tensor: &str, index: usize) -> Result<Array3<bool>, DetbridgeError>;

    /// Reads only the shape of an image sample.
    fn image_shape(&self, tensor: &str, index: usize) -> Result<ImageShape, DetbridgeError> {
        let image = self.image(tensor, index)?;
        ImageShape::from_dims(image.shape())
    }
}

/// Finds the first tensor with the given htype, in declaration order.
///
/// Logs a warning when nothing matches, and when several tensors match
/// (the first one wins).
pub fn find_tensor_with_htype<S: TensorStore + ?Sized>(store: &S, htype: Htype) -> Option<String> {
    let matches: Vec<&str> = store
        .tensor_names()
        .into_iter()
        .filter(|name| store.htype(name) == Some(htype))
        .collect();

    let Some(first) = matches.first() else {
        tracing::warn!("No tensor found with htype='{}'", htype);
        return None;
    };

    if matches.len() > 1 {
        tracing::warn!(
            "Multiple tensors with htype='{}' found. choosing '{}'.",
            htype,
            first
        );
    }

    Some(first.to_string())
}
