//! Construction of per-sample training records.
//!
//! A [`TrainingRecord`] carries the fields a detection training pipeline
//! expects to find on a freshly loaded sample. Building one is the last
//! step on our side; everything after [`RecordPipeline::run`] (resizing,
//! augmentation, tensor formatting) belongs to the framework.

use ndarray::{concatenate, s, Array2, Array3, Axis};

use crate::bbox::{convert_to_pascal_format, FormatDescriptor, ImageShape};
use crate::error::DetbridgeError;

/// Field name of the image in a record.
pub const IMG_FIELD: &str = "img";
/// Field name of the boxes in a record.
pub const BBOX_FIELD: &str = "gt_bboxes";

/// One sample as read from the store.
#[derive(Clone, Debug)]
pub struct Sample {
    /// Image as (height, width, channels), RGB channel order.
    pub image: Array3<u8>,
    /// Boxes as (N, 4) in the box tensor's stored encoding.
    pub boxes: Array2<f64>,
    pub labels: Vec<u32>,
    /// Instance masks as (height, width, N).
    pub masks: Option<Array3<bool>>,
}

/// Instance masks laid out one per plane.
#[derive(Clone, Debug, PartialEq)]
pub struct BitmapMasks {
    /// Masks as (N, height, width).
    pub masks: Array3<u8>,
    pub height: usize,
    pub width: usize,
}

impl BitmapMasks {
    pub fn len(&self) -> usize {
        self.masks.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A sample shaped for the training pipeline.
#[derive(Clone, Debug)]
pub struct TrainingRecord {
    /// Image as (height, width, 3), BGR channel order.
    pub img: Array3<u8>,
    pub img_fields: Vec<String>,
    pub filename: Option<String>,
    pub ori_filename: Option<String>,
    pub img_shape: ImageShape,
    pub ori_shape: ImageShape,
    pub gt_masks: Option<BitmapMasks>,
    /// Boxes as (N, 4) Pascal VOC pixel corners.
    pub gt_bboxes: Array2<f64>,
    pub gt_labels: Vec<u32>,
    pub bbox_fields: Vec<String>,
    pub mix_results: bool,
}

/// The framework's per-sample processing, applied after record construction.
pub trait RecordPipeline {
    fn run(&self, record: TrainingRecord) -> Result<TrainingRecord, DetbridgeError>;
}

impl<F> RecordPipeline for F
where
    F: Fn(TrainingRecord) -> Result<TrainingRecord, DetbridgeError>,
{
    fn run(&self, record: TrainingRecord) -> Result<TrainingRecord, DetbridgeError> {
        self(record)
    }
}

/// A pipeline that returns records untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityPipeline;

impl RecordPipeline for IdentityPipeline {
    fn run(&self, record: TrainingRecord) -> Result<TrainingRecord, DetbridgeError> {
        Ok(record)
    }
}

/// Turns a stored sample into a training record and runs `pipeline` on it.
///
/// Boxes are normalized against the stored image shape. The image is
/// flipped to BGR and single-channel images are widened to three channels.
/// Masks are moved to (N, height, width).
pub fn transform_sample<P: RecordPipeline + ?Sized>(
    sample: Sample,
    descriptor: &FormatDescriptor,
    pipeline: &P,
) -> Result<TrainingRecord, DetbridgeError> {
    let stored_shape = ImageShape::from_dims(sample.image.shape())?;
    let gt_bboxes = convert_to_pascal_format(sample.boxes.view(), descriptor, stored_shape)?;

    let img = to_bgr3(sample.image)?;
    let shape = ImageShape::from_dims(img.shape())?;

    let gt_masks = sample.masks.map(|masks| BitmapMasks {
        masks: masks
            .permuted_axes([2, 0, 1])
            .mapv(u8::from)
            .as_standard_layout()
            .into_owned(),
        height: shape.height,
        width: shape.width,
    });

    let record = TrainingRecord {
        img,
        img_fields: vec![IMG_FIELD.to_string()],
        filename: None,
        ori_filename: None,
        img_shape: shape,
        ori_shape: shape,
        gt_masks,
        gt_bboxes,
        gt_labels: sample.labels,
        bbox_fields: vec![BBOX_FIELD.to_string()],
        mix_results: true,
    };

    pipeline.run(record)
}

/// Reverses channel order and repeats a lone channel three times.
fn to_bgr3(image: Array3<u8>) -> Result<Array3<u8>, DetbridgeError> {
    let flipped = image.slice(s![.., .., ..;-1]);
    if flipped.len_of(Axis(2)) == 1 {
        concatenate(Axis(2), &[flipped, flipped, flipped]).map_err(|_| {
            DetbridgeError::InvalidImageShape {
                dims: image.shape().to_vec(),
            }
        })
    } else {
        Ok(flipped.as_standard_layout().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array};

    fn rgb_sample() -> Sample {
        let mut image = Array3::<u8>::zeros((2, 3, 3));
        image.slice_mut(s![.., .., 0]).fill(10);
        image.slice_mut(s![.., .., 1]).fill(20);
        image.slice_mut(s![.., .., 2]).fill(30);
        Sample {
            image,
            boxes: array![[0.0, 0.0, 1.0, 1.0]],
            labels: vec![4],
            masks: None,
        }
    }

    fn ltwh() -> FormatDescriptor {
        FormatDescriptor::empty().with_mode("LTWH").with_type("pixel")
    }

    #[test]
    fn test_record_fields() {
        let record = transform_sample(rgb_sample(), &ltwh(), &IdentityPipeline).unwrap();
        assert_eq!(record.img_fields, vec!["img"]);
        assert_eq!(record.bbox_fields, vec!["gt_bboxes"]);
        assert!(record.mix_results);
        assert_eq!(record.filename, None);
        assert_eq!(record.gt_labels, vec![4]);
        assert_eq!(record.gt_bboxes, array![[0.0, 0.0, 1.0, 1.0]]);
        assert_eq!(record.img_shape, ImageShape::new(2, 3).with_channels(3));
        assert_eq!(record.ori_shape, record.img_shape);
    }

    #[test]
    fn test_rgb_becomes_bgr() {
        let record = transform_sample(rgb_sample(), &ltwh(), &IdentityPipeline).unwrap();
        assert_eq!(record.img[[0, 0, 0]], 30);
        assert_eq!(record.img[[1, 2, 1]], 20);
        assert_eq!(record.img[[1, 2, 2]], 10);
    }

    #[test]
    fn test_grayscale_repeats_channel() {
        let sample = Sample {
            image: Array::from_elem((4, 5, 1), 7u8),
            boxes: Array2::zeros((0, 4)),
            labels: vec![],
            masks: None,
        };
        let record = transform_sample(sample, &ltwh(), &IdentityPipeline).unwrap();
        assert_eq!(record.img.dim(), (4, 5, 3));
        assert!(record.img.iter().all(|&v| v == 7));
        assert_eq!(record.img_shape.channels, Some(3));
    }

    #[test]
    fn test_masks_move_to_front() {
        let mut masks = Array3::<bool>::from_elem((2, 3, 2), false);
        masks[[1, 2, 0]] = true;
        masks[[0, 1, 1]] = true;
        let sample = Sample {
            masks: Some(masks),
            ..rgb_sample()
        };
        let record = transform_sample(sample, &ltwh(), &IdentityPipeline).unwrap();
        let gt_masks = record.gt_masks.expect("masks present");
        assert_eq!(gt_masks.masks.dim(), (2, 2, 3));
        assert_eq!(gt_masks.len(), 2);
        assert_eq!(gt_masks.masks[[0, 1, 2]], 1);
        assert_eq!(gt_masks.masks[[1, 0, 1]], 1);
        assert_eq!(gt_masks.masks.sum(), 2);
        assert_eq!((gt_masks.height, gt_masks.width), (2, 3));
    }

    #[test]
    fn test_pipeline_runs_last() {
        let pipeline = |mut record: TrainingRecord| -> Result<TrainingRecord, DetbridgeError> {
            record.filename = Some("seen".into());
            Ok(record)
        };
        let record = transform_sample(rgb_sample(), &ltwh(), &pipeline).unwrap();
        assert_eq!(record.filename.as_deref(), Some("seen"));
    }

    #[test]
    fn test_box_errors_propagate() {
        let sample = Sample {
            boxes: array![[0.0, 0.0, 1.0]],
            ..rgb_sample()
        };
        assert!(matches!(
            transform_sample(sample, &ltwh(), &IdentityPipeline),
            Err(DetbridgeError::InvalidBoundingBoxShape { .. })
        ));
    }
}
