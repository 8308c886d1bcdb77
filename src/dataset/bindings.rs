//! Which tensors play which role in a detection dataset.

use serde::{Deserialize, Serialize};

use crate::error::DetbridgeError;
use crate::store::{find_tensor_with_htype, Htype, TensorStore};

/// Name of the tensor picked up for crowd flags when none is configured.
pub const ISCROWDS_TENSOR: &str = "iscrowds";

/// Tensor names as requested by the caller or the training config.
///
/// Field names follow the training framework's record keys. Any name left
/// out is discovered by htype.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorNames {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub img: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gt_bboxes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gt_labels: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gt_masks: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iscrowds: Option<String>,
}

impl TensorNames {
    /// Fills every name missing here from `fallback`.
    pub fn or(self, fallback: &TensorNames) -> TensorNames {
        TensorNames {
            img: self.img.or_else(|| fallback.img.clone()),
            gt_bboxes: self.gt_bboxes.or_else(|| fallback.gt_bboxes.clone()),
            gt_labels: self.gt_labels.or_else(|| fallback.gt_labels.clone()),
            gt_masks: self.gt_masks.or_else(|| fallback.gt_masks.clone()),
            iscrowds: self.iscrowds.or_else(|| fallback.iscrowds.clone()),
        }
    }
}

/// Resolved tensor names, all known to exist in the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TensorBindings {
    pub images: String,
    pub boxes: String,
    pub labels: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub masks: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iscrowds: Option<String>,
}

impl TensorBindings {
    /// Resolves requested names against a store.
    ///
    /// Images, boxes and labels are required. Masks and crowd flags are
    /// optional; a tensor named `iscrowds` is used for the latter when no
    /// name was given.
    pub fn resolve<S: TensorStore + ?Sized>(
        store: &S,
        names: &TensorNames,
    ) -> Result<Self, DetbridgeError> {
        let images = required(store, names.img.as_deref(), Htype::Image, "images")?;
        let boxes = required(store, names.gt_bboxes.as_deref(), Htype::BBox, "boxes")?;
        let labels = required(store, names.gt_labels.as_deref(), Htype::ClassLabel, "labels")?;
        let masks = optional(store, names.gt_masks.as_deref(), Htype::BinaryMask)?;

        let iscrowds = match names.iscrowds.as_deref() {
            Some(name) => Some(existing(store, name)?),
            None if store.contains(ISCROWDS_TENSOR) => {
                tracing::warn!(
                    "Iscrowds was not specified, searching for iscrowds tensor in the dataset."
                );
                Some(ISCROWDS_TENSOR.to_string())
            }
            None => {
                tracing::warn!("iscrowds tensor was not found, setting its value to 0.");
                None
            }
        };

        Ok(Self {
            images,
            boxes,
            labels,
            masks,
            iscrowds,
        })
    }

    /// Tensors a loader has to fetch, in fetch order.
    pub fn loader_tensors(&self) -> Vec<String> {
        let mut tensors = vec![self.images.clone(), self.labels.clone(), self.boxes.clone()];
        if let Some(masks) = &self.masks {
            tensors.push(masks.clone());
        }
        tensors
    }
}

fn existing<S: TensorStore + ?Sized>(store: &S, name: &str) -> Result<String, DetbridgeError> {
    if store.contains(name) {
        Ok(name.to_string())
    } else {
        Err(DetbridgeError::UnknownTensor(name.to_string()))
    }
}

fn optional<S: TensorStore + ?Sized>(
    store: &S,
    requested: Option<&str>,
    htype: Htype,
) -> Result<Option<String>, DetbridgeError> {
    match requested {
        Some(name) => existing(store, name).map(Some),
        None => Ok(find_tensor_with_htype(store, htype)),
    }
}

fn required<S: TensorStore + ?Sized>(
    store: &S,
    requested: Option<&str>,
    htype: Htype,
    role: &'static str,
) -> Result<String, DetbridgeError> {
    optional(store, requested, htype)?.ok_or_else(|| DetbridgeError::MissingTensor {
        role,
        htype: htype.to_string(),
    })
}
