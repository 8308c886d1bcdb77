//! Detection dataset adapter.
//!
//! [`DetectionDataset`] reads the annotation side of a tensor store once
//! (image shapes, boxes, labels, class names) and answers the questions a
//! training framework asks of its dataset object: annotations per image in
//! Pascal VOC pixel format, category ids, size filtering and instance
//! counts.

mod bindings;
mod report;

pub use bindings::{TensorBindings, TensorNames, ISCROWDS_TENSOR};
pub use report::InstanceCountReport;

use std::fmt;

use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};

use crate::bbox::{convert_to_pascal_format, FormatDescriptor, ImageShape};
use crate::error::DetbridgeError;
use crate::store::TensorStore;

/// Whether a dataset feeds training or validation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetMode {
    #[default]
    Train,
    Val,
}

impl fmt::Display for DatasetMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetMode::Train => write!(f, "Train"),
            DatasetMode::Val => write!(f, "Val"),
        }
    }
}

/// Which evaluation protocol reports results.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricsFormat {
    #[default]
    #[serde(rename = "PascalVOC")]
    PascalVoc,
    #[serde(rename = "COCO")]
    Coco,
}

/// Options for building a [`DetectionDataset`].
#[derive(Clone, Debug, Default)]
pub struct DatasetOptions {
    pub mode: DatasetMode,
    pub metrics_format: MetricsFormat,
    /// Requests dropping images without annotations. Not supported; a
    /// warning is logged when set.
    pub filter_empty_gt: bool,
}

/// Ground truth for one image, in Pascal VOC pixel format.
#[derive(Clone, Debug, PartialEq)]
pub struct AnnotationInfo {
    pub bboxes: Array2<f64>,
    pub labels: Vec<u32>,
}

/// The annotation view of a tensor-store dataset.
#[derive(Clone, Debug)]
pub struct DetectionDataset {
    bindings: TensorBindings,
    descriptor: FormatDescriptor,
    classes: Vec<String>,
    image_shapes: Vec<ImageShape>,
    boxes: Vec<Array2<f64>>,
    labels: Vec<Vec<u32>>,
    iscrowds: Option<Vec<Vec<u32>>>,
    masks: Option<Vec<Array3<bool>>>,
    options: DatasetOptions,
}

impl DetectionDataset {
    /// Reads shapes, boxes, labels and metadata from `store`.
    ///
    /// Masks are only read when results will go to a COCO evaluator.
    pub fn from_store<S: TensorStore + ?Sized>(
        store: &S,
        bindings: TensorBindings,
        options: DatasetOptions,
    ) -> Result<Self, DetbridgeError> {
        let len = store.len();

        let descriptor = store
            .info(&bindings.boxes)
            .map(|info| info.coords.clone())
            .unwrap_or_default();
        let classes = store
            .info(&bindings.labels)
            .map(|info| info.class_names.clone())
            .unwrap_or_default();

        let image_shapes = (0..len)
            .map(|i| store.image_shape(&bindings.images, i))
            .collect::<Result<Vec<_>, _>>()?;
        let boxes = (0..len)
            .map(|i| store.boxes(&bindings.boxes, i))
            .collect::<Result<Vec<_>, _>>()?;
        let labels = (0..len)
            .map(|i| store.labels(&bindings.labels, i))
            .collect::<Result<Vec<_>, _>>()?;
        let iscrowds = bindings
            .iscrowds
            .as_deref()
            .map(|tensor| {
                (0..len)
                    .map(|i| store.labels(tensor, i))
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?;

        let uses_coco = options.metrics_format == MetricsFormat::Coco
            && options.mode == DatasetMode::Val;
        let masks = match (&bindings.masks, uses_coco) {
            (Some(tensor), true) => Some(
                (0..len)
                    .map(|i| store.mask(tensor, i))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            _ => None,
        };

        tracing::debug!(
            images = len,
            classes = classes.len(),
            boxes = %bindings.boxes,
            "loaded detection dataset"
        );

        Ok(Self {
            bindings,
            descriptor,
            classes,
            image_shapes,
            boxes,
            labels,
            iscrowds,
            masks,
            options,
        })
    }

    pub fn len(&self) -> usize {
        self.image_shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image_shapes.is_empty()
    }

    pub fn bindings(&self) -> &TensorBindings {
        &self.bindings
    }

    /// Class names, indexed by label value.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// The box tensor's coordinate metadata.
    pub fn format_descriptor(&self) -> &FormatDescriptor {
        &self.descriptor
    }

    pub fn mode(&self) -> DatasetMode {
        self.options.mode
    }

    pub fn metrics_format(&self) -> MetricsFormat {
        self.options.metrics_format
    }

    /// True when evaluation is handed to the COCO evaluator.
    pub fn uses_coco_evaluator(&self) -> bool {
        self.options.metrics_format == MetricsFormat::Coco && self.options.mode == DatasetMode::Val
    }

    fn check_index(&self, idx: usize) -> Result<(), DetbridgeError> {
        if idx < self.len() {
            Ok(())
        } else {
            Err(DetbridgeError::SampleOutOfRange {
                tensor: self.bindings.boxes.clone(),
                index: idx,
                len: self.len(),
            })
        }
    }

    pub fn image_shape(&self, idx: usize) -> Result<ImageShape, DetbridgeError> {
        self.check_index(idx)?;
        Ok(self.image_shapes[idx])
    }

    /// Raw stored boxes for one image, before conversion.
    pub fn raw_boxes(&self, idx: usize) -> Result<&Array2<f64>, DetbridgeError> {
        self.check_index(idx)?;
        Ok(&self.boxes[idx])
    }

    /// Crowd flags for one image, when a crowd tensor is bound.
    pub fn iscrowds(&self, idx: usize) -> Option<&[u32]> {
        self.iscrowds
            .as_ref()
            .and_then(|flags| flags.get(idx))
            .map(Vec::as_slice)
    }

    /// Masks for every image, only loaded for COCO validation.
    pub fn masks(&self) -> Option<&[Array3<bool>]> {
        self.masks.as_deref()
    }

    /// Ground truth for one image with boxes in Pascal VOC pixel format.
    pub fn ann_info(&self, idx: usize) -> Result<AnnotationInfo, DetbridgeError> {
        self.check_index(idx)?;
        let bboxes = convert_to_pascal_format(
            self.boxes[idx].view(),
            &self.descriptor,
            self.image_shapes[idx],
        )?;
        Ok(AnnotationInfo {
            bboxes,
            labels: self.labels[idx].clone(),
        })
    }

    /// Ground truth for every image.
    pub fn annotations(&self) -> Result<Vec<AnnotationInfo>, DetbridgeError> {
        (0..self.len()).map(|idx| self.ann_info(idx)).collect()
    }

    /// Category ids present in one image, one per annotation.
    pub fn cat_ids(&self, idx: usize) -> Result<Vec<u32>, DetbridgeError> {
        self.check_index(idx)?;
        Ok(self.labels[idx].clone())
    }

    /// Indices of images whose shorter side is at least `min_size` pixels.
    pub fn filter_images(&self, min_size: usize) -> Vec<usize> {
        if self.options.filter_empty_gt {
            tracing::warn!("DetectionDataset does not support filtering empty gt images.");
        }
        self.image_shapes
            .iter()
            .enumerate()
            .filter(|(_, shape)| shape.min_side() >= min_size)
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Counts annotations per class, plus images with none.
    pub fn instance_counts(&self) -> InstanceCountReport {
        let mut counts = vec![0usize; self.classes.len()];
        let mut background = 0;
        let mut out_of_range = 0;

        for labels in &self.labels {
            if labels.is_empty() {
                background += 1;
                continue;
            }
            for &label in labels {
                match counts.get_mut(label as usize) {
                    Some(count) => *count += 1,
                    None => out_of_range += 1,
                }
            }
        }

        InstanceCountReport {
            split: self.options.mode.to_string(),
            images: self.len(),
            classes: self.classes.clone(),
            counts,
            background,
            out_of_range,
        }
    }
}
