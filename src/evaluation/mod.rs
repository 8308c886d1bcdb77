//! Evaluation of detection results against a [`DetectionDataset`].
//!
//! The metric computations (matching detections to ground truth, AP
//! integration, COCO evaluation) are supplied by a [`DetectionMetrics`]
//! implementation. This module feeds it converted ground truth and names
//! the values it returns.

mod report;

pub use report::EvalResults;

use std::fmt;
use std::str::FromStr;

use ndarray::{Array2, Axis};

use crate::config::MetricSpec;
use crate::dataset::{AnnotationInfo, DetectionDataset};
use crate::error::DetbridgeError;

/// Detections for one image, one (N, 5) array per class
/// (x1, y1, x2, y2, score).
pub type ClassDetections = Vec<Array2<f64>>;

/// Metrics computed from ground truth held by the dataset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Metric {
    #[default]
    MeanAp,
    Recall,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::MeanAp => "mAP",
            Metric::Recall => "recall",
        }
    }

    /// Picks the metric from a config entry. Exactly one name is accepted.
    pub fn from_spec(spec: &MetricSpec) -> Result<Self, DetbridgeError> {
        match spec {
            MetricSpec::One(name) => name.parse(),
            MetricSpec::Many(names) => match names.as_slice() {
                [name] => name.parse(),
                _ => Err(DetbridgeError::UnsupportedMetric(format!(
                    "expected a single metric, got [{}]",
                    names.join(", ")
                ))),
            },
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = DetbridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mAP" => Ok(Metric::MeanAp),
            "recall" => Ok(Metric::Recall),
            other => Err(DetbridgeError::UnsupportedMetric(other.to_string())),
        }
    }
}

/// Options for [`evaluate`].
#[derive(Clone, Debug, PartialEq)]
pub struct EvalOptions {
    pub metric: Metric,
    pub iou_thrs: Vec<f64>,
    /// Proposal counts for recall.
    pub proposal_nums: Vec<usize>,
    /// Object area ranges for mAP, as (min, max) pairs.
    pub scale_ranges: Option<Vec<(f64, f64)>>,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            metric: Metric::MeanAp,
            iou_thrs: vec![0.5],
            proposal_nums: vec![100, 300, 1000],
            scale_ranges: None,
        }
    }
}

/// The metric computations behind [`evaluate`].
pub trait DetectionMetrics {
    /// Mean average precision over classes at one IoU threshold.
    fn eval_map(
        &self,
        results: &[ClassDetections],
        annotations: &[AnnotationInfo],
        iou_thr: f64,
        scale_ranges: Option<&[(f64, f64)]>,
        classes: &[String],
    ) -> Result<f64, DetbridgeError>;

    /// Recall table with one row per proposal count and one column per
    /// IoU threshold.
    fn eval_recalls(
        &self,
        gt_bboxes: &[Array2<f64>],
        results: &[ClassDetections],
        proposal_nums: &[usize],
        iou_thrs: &[f64],
    ) -> Result<Array2<f64>, DetbridgeError>;

    /// Evaluation through the COCO protocol.
    fn evaluate_coco(
        &self,
        dataset: &DetectionDataset,
        results: &[ClassDetections],
        opts: &EvalOptions,
    ) -> Result<EvalResults, DetbridgeError> {
        let _ = (dataset, results, opts);
        Err(DetbridgeError::UnsupportedMetric(
            "COCO evaluation is not available".to_string(),
        ))
    }
}

/// Evaluates `results`, one entry per dataset image.
///
/// COCO validation datasets go through [`DetectionMetrics::evaluate_coco`].
/// Otherwise mAP yields `AP<thr>` per IoU threshold plus `mAP`, and recall
/// yields `recall@<num>@<iou>` per cell plus `AR@<num>` when more than one
/// IoU threshold was requested.
pub fn evaluate<M: DetectionMetrics + ?Sized>(
    dataset: &DetectionDataset,
    results: &[ClassDetections],
    opts: &EvalOptions,
    metrics: &M,
) -> Result<EvalResults, DetbridgeError> {
    if results.len() != dataset.len() {
        return Err(DetbridgeError::ResultCountMismatch {
            expected: dataset.len(),
            actual: results.len(),
        });
    }

    if dataset.uses_coco_evaluator() {
        return metrics.evaluate_coco(dataset, results, opts);
    }

    let annotations = dataset.annotations()?;
    match opts.metric {
        Metric::MeanAp => mean_ap(dataset, results, &annotations, opts, metrics),
        Metric::Recall => recall(results, &annotations, opts, metrics),
    }
}

fn mean_ap<M: DetectionMetrics + ?Sized>(
    dataset: &DetectionDataset,
    results: &[ClassDetections],
    annotations: &[AnnotationInfo],
    opts: &EvalOptions,
    metrics: &M,
) -> Result<EvalResults, DetbridgeError> {
    if opts.iou_thrs.is_empty() {
        return Err(DetbridgeError::EvaluationFailed {
            message: "mAP needs at least one IoU threshold".to_string(),
        });
    }

    let mut eval_results = EvalResults::new();
    let mut mean_aps = Vec::with_capacity(opts.iou_thrs.len());
    for &iou_thr in &opts.iou_thrs {
        tracing::info!(iou_thr, "evaluating mAP");
        let mean_ap = metrics.eval_map(
            results,
            annotations,
            iou_thr,
            opts.scale_ranges.as_deref(),
            dataset.classes(),
        )?;
        mean_aps.push(mean_ap);
        eval_results.insert(ap_key(iou_thr), round3(mean_ap));
    }
    eval_results.insert("mAP", mean_aps.iter().sum::<f64>() / mean_aps.len() as f64);
    Ok(eval_results)
}

fn recall<M: DetectionMetrics + ?Sized>(
    results: &[ClassDetections],
    annotations: &[AnnotationInfo],
    opts: &EvalOptions,
    metrics: &M,
) -> Result<EvalResults, DetbridgeError> {
    let gt_bboxes: Vec<Array2<f64>> = annotations.iter().map(|a| a.bboxes.clone()).collect();
    let recalls = metrics.eval_recalls(&gt_bboxes, results, &opts.proposal_nums, &opts.iou_thrs)?;

    let expected = (opts.proposal_nums.len(), opts.iou_thrs.len());
    if recalls.dim() != expected {
        return Err(DetbridgeError::EvaluationFailed {
            message: format!(
                "recall table has shape {:?}, expected {:?}",
                recalls.dim(),
                expected
            ),
        });
    }

    let mut eval_results = EvalResults::new();
    for (i, num) in opts.proposal_nums.iter().enumerate() {
        for (j, &iou) in opts.iou_thrs.iter().enumerate() {
            eval_results.insert(format!("recall@{num}@{}", fmt_iou(iou)), recalls[[i, j]]);
        }
    }
    if recalls.ncols() > 1 {
        if let Some(ar) = recalls.mean_axis(Axis(1)) {
            for (num, value) in opts.proposal_nums.iter().zip(ar.iter()) {
                eval_results.insert(format!("AR@{num}"), *value);
            }
        }
    }
    Ok(eval_results)
}

fn ap_key(iou_thr: f64) -> String {
    format!("AP{:02}", (iou_thr * 100.0) as i64)
}

// Halves go to the even neighbour, so 0.0625 reports as 0.062.
fn round3(value: f64) -> f64 {
    (value * 1000.0).round_ties_even() / 1000.0
}

// Whole thresholds keep one decimal, so 1.0 prints as "1.0".
fn fmt_iou(iou: f64) -> String {
    if iou.fract() == 0.0 {
        format!("{iou:.1}")
    } else {
        iou.to_string()
    }
}
