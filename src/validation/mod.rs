//! Dataset validation.
//!
//! Checks a [`DetectionDataset`] for problems that would break or quietly
//! skew training:
//! - metadata (missing coordinate encoding, class names)
//! - image dimensions
//! - annotations after conversion to corner format (label counts and
//!   ranges, box geometry against the image)

mod report;

pub use report::{IssueCode, IssueContext, Severity, ValidationIssue, ValidationReport};

use std::collections::HashMap;

use ndarray::ArrayView1;

use crate::dataset::DetectionDataset;

/// How far a box may stick out of the image before it is reported.
const BOUNDS_TOLERANCE: f64 = 0.5;

/// Options for validation behavior.
#[derive(Clone, Debug, Default)]
pub struct ValidateOptions {
    /// If true, treat warnings as errors.
    pub strict: bool,
}

/// Validates a dataset and returns a report of all issues found.
pub fn validate_dataset(dataset: &DetectionDataset, _opts: &ValidateOptions) -> ValidationReport {
    let mut report = ValidationReport::new();

    if dataset.format_descriptor().is_empty() {
        report.add(ValidationIssue::warning(
            IssueCode::FormatInferred,
            format!(
                "Tensor '{}' has no coordinate metadata; box format is inferred from values",
                dataset.bindings().boxes
            ),
            IssueContext::Dataset,
        ));
    }

    validate_classes(dataset, &mut report);

    for idx in 0..dataset.len() {
        if validate_image(dataset, idx, &mut report) {
            validate_annotations(dataset, idx, &mut report);
        }
    }

    tracing::debug!(
        errors = report.error_count(),
        warnings = report.warning_count(),
        "validated dataset"
    );

    report
}

fn validate_classes(dataset: &DetectionDataset, report: &mut ValidationReport) {
    let mut seen: HashMap<&str, usize> = HashMap::new();

    for (label, name) in dataset.classes().iter().enumerate() {
        if name.is_empty() {
            report.add(ValidationIssue::warning(
                IssueCode::EmptyClassName,
                "Empty class name",
                IssueContext::Class { label },
            ));
        } else if let Some(first) = seen.get(name.as_str()) {
            report.add(ValidationIssue::warning(
                IssueCode::DuplicateClassName,
                format!("Duplicate class name '{}' (also used by class {})", name, first),
                IssueContext::Class { label },
            ));
        } else {
            seen.insert(name, label);
        }
    }
}

/// Returns false when annotations of this image cannot be checked.
fn validate_image(dataset: &DetectionDataset, idx: usize, report: &mut ValidationReport) -> bool {
    let Ok(shape) = dataset.image_shape(idx) else {
        return false;
    };

    if shape.width == 0 || shape.height == 0 {
        report.add(ValidationIssue::error(
            IssueCode::InvalidImageDimensions,
            format!(
                "Invalid dimensions {}x{} (must be positive)",
                shape.width, shape.height
            ),
            IssueContext::Image { index: idx },
        ));
        return false;
    }

    true
}

fn validate_annotations(dataset: &DetectionDataset, idx: usize, report: &mut ValidationReport) {
    let info = match dataset.ann_info(idx) {
        Ok(info) => info,
        Err(err) => {
            report.add(ValidationIssue::error(
                IssueCode::ConversionFailed,
                err.to_string(),
                IssueContext::Image { index: idx },
            ));
            return;
        }
    };

    if info.bboxes.nrows() != info.labels.len() {
        report.add(ValidationIssue::error(
            IssueCode::LabelCountMismatch,
            format!(
                "{} box(es) but {} label(s)",
                info.bboxes.nrows(),
                info.labels.len()
            ),
            IssueContext::Image { index: idx },
        ));
    }

    let classes = dataset.classes().len();
    if classes > 0 {
        for (index, &label) in info.labels.iter().enumerate() {
            if label as usize >= classes {
                report.add(ValidationIssue::error(
                    IssueCode::LabelOutOfRange,
                    format!("Label {} has no class name ({} classes)", label, classes),
                    IssueContext::Annotation { image: idx, index },
                ));
            }
        }
    }

    // Shape was checked by the caller.
    let Ok(shape) = dataset.image_shape(idx) else {
        return;
    };
    let (w, h) = (shape.width_f64(), shape.height_f64());

    for (index, bbox) in info.bboxes.rows().into_iter().enumerate() {
        let context = IssueContext::Annotation { image: idx, index };
        check_bbox(bbox, w, h, context, report);
    }
}

fn check_bbox(
    bbox: ArrayView1<'_, f64>,
    width: f64,
    height: f64,
    context: IssueContext,
    report: &mut ValidationReport,
) {
    let (x1, y1, x2, y2) = (bbox[0], bbox[1], bbox[2], bbox[3]);

    if !bbox.iter().all(|v| v.is_finite()) {
        report.add(ValidationIssue::error(
            IssueCode::BBoxNotFinite,
            format!("Non-finite coordinates ({}, {}, {}, {})", x1, y1, x2, y2),
            context,
        ));
        return;
    }

    if x1 > x2 || y1 > y2 {
        report.add(ValidationIssue::error(
            IssueCode::InvalidBBoxOrdering,
            format!(
                "Invalid ordering: min ({}, {}) should be <= max ({}, {})",
                x1, y1, x2, y2
            ),
            context.clone(),
        ));
    }

    let area = (x2 - x1) * (y2 - y1);
    if x2 <= x1 || y2 <= y1 {
        report.add(ValidationIssue::warning(
            IssueCode::InvalidBBoxArea,
            format!("Zero or negative area: {:.2}", area),
            context.clone(),
        ));
    }

    if x1 < -BOUNDS_TOLERANCE
        || y1 < -BOUNDS_TOLERANCE
        || x2 > width + BOUNDS_TOLERANCE
        || y2 > height + BOUNDS_TOLERANCE
    {
        report.add(ValidationIssue::error(
            IssueCode::BBoxOutOfBounds,
            format!(
                "Bounding box ({:.1}, {:.1}, {:.1}, {:.1}) extends outside image bounds (0, 0, {}, {})",
                x1, y1, x2, y2, width, height
            ),
            context,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbox::FormatDescriptor;
    use crate::dataset::{DatasetOptions, TensorBindings, TensorNames};
    use crate::store::{Htype, InMemoryStore, StoredTensor, TensorInfo};
    use ndarray::{arr1, array, Array, Array1, Array2};

    fn store(
        coords: FormatDescriptor,
        classes: &[&str],
        image: (usize, usize),
        boxes: Array2<f64>,
        labels: Array1<f64>,
    ) -> InMemoryStore {
        InMemoryStore::default()
            .with_tensor(
                StoredTensor::new("images", Htype::Image)
                    .with_sample(Array::<f64, _>::zeros((image.0, image.1, 3))),
            )
            .with_tensor(
                StoredTensor::new("boxes", Htype::BBox)
                    .with_info(TensorInfo {
                        coords,
                        ..Default::default()
                    })
                    .with_sample(boxes),
            )
            .with_tensor(
                StoredTensor::new("labels", Htype::ClassLabel)
                    .with_info(TensorInfo {
                        class_names: classes.iter().map(|c| c.to_string()).collect(),
                        ..Default::default()
                    })
                    .with_sample(labels),
            )
    }

    fn ltrb() -> FormatDescriptor {
        FormatDescriptor::empty().with_mode("LTRB").with_type("pixel")
    }

    fn validate(store: InMemoryStore) -> ValidationReport {
        let bindings = TensorBindings::resolve(&store, &TensorNames::default()).unwrap();
        let dataset = DetectionDataset::from_store(&store, bindings, DatasetOptions::default())
            .unwrap();
        validate_dataset(&dataset, &ValidateOptions::default())
    }

    #[test]
    fn test_valid_dataset() {
        let report = validate(store(
            ltrb(),
            &["person"],
            (480, 640),
            array![[10.0, 20.0, 100.0, 200.0]],
            arr1(&[0.0]),
        ));
        assert!(
            report.is_clean(),
            "Expected no issues, got: {:?}",
            report.issues
        );
    }

    #[test]
    fn test_missing_coords_warns() {
        let report = validate(store(
            FormatDescriptor::empty(),
            &["person"],
            (480, 640),
            array![[10.0, 20.0, 30.0, 40.0]],
            arr1(&[0.0]),
        ));
        assert!(report.is_ok());
        assert!(report.has(IssueCode::FormatInferred));
    }

    #[test]
    fn test_class_names() {
        let report = validate(store(
            ltrb(),
            &["cat", "", "cat"],
            (10, 10),
            Array2::zeros((0, 4)),
            Array1::zeros(0),
        ));
        assert_eq!(report.warning_count(), 2);
        assert!(report.has(IssueCode::EmptyClassName));
        assert!(report.has(IssueCode::DuplicateClassName));
    }

    #[test]
    fn test_invalid_image_dimensions() {
        let report = validate(store(
            ltrb(),
            &["person"],
            (0, 640),
            array![[10.0, 20.0, 100.0, 200.0]],
            arr1(&[0.0]),
        ));
        assert_eq!(report.error_count(), 1);
        assert!(report.has(IssueCode::InvalidImageDimensions));
    }

    #[test]
    fn test_label_checks() {
        let report = validate(store(
            ltrb(),
            &["person"],
            (100, 100),
            array![[1.0, 1.0, 5.0, 5.0]],
            arr1(&[0.0, 3.0]),
        ));
        assert!(report.has(IssueCode::LabelCountMismatch));
        assert!(report.has(IssueCode::LabelOutOfRange));
    }

    #[test]
    fn test_bbox_geometry() {
        let report = validate(store(
            ltrb(),
            &["person"],
            (100, 100),
            array![
                [50.0, 20.0, 10.0, 60.0],
                [90.0, 90.0, 120.0, 95.0],
                [f64::NAN, 0.0, 1.0, 1.0],
                [5.0, 5.0, 5.0, 9.0]
            ],
            arr1(&[0.0, 0.0, 0.0, 0.0]),
        ));
        assert!(report.has(IssueCode::InvalidBBoxOrdering));
        assert!(report.has(IssueCode::BBoxOutOfBounds));
        assert!(report.has(IssueCode::BBoxNotFinite));
        assert!(report.has(IssueCode::InvalidBBoxArea));
        assert_eq!(report.error_count(), 3);
    }

    #[test]
    fn test_small_overhang_tolerated() {
        let report = validate(store(
            ltrb(),
            &["person"],
            (100, 100),
            array![[-0.4, 0.0, 100.4, 100.0]],
            arr1(&[0.0]),
        ));
        assert!(report.is_clean());
    }

    #[test]
    fn test_conversion_failure_reported() {
        let report = validate(store(
            FormatDescriptor::empty().with_mode("XYXY").with_type("pixel"),
            &["person"],
            (100, 100),
            array![[1.0, 1.0, 5.0, 5.0]],
            arr1(&[0.0]),
        ));
        assert!(report.has(IssueCode::ConversionFailed));
    }
}
