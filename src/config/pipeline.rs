//! Training pipeline step lists.
//!
//! Steps are opaque to detbridge apart from their `type`; parameters are
//! carried through untouched for the framework to build.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Steps that load data from files. The tensor store supplies both.
pub const FILE_LOADING_STEPS: [&str; 2] = ["LoadImageFromFile", "LoadAnnotations"];

const IMAGE_TO_TENSOR: &str = "ImageToTensor";
const DEFAULT_FORMAT_BUNDLE: &str = "DefaultFormatBundle";
const MULTI_SCALE_FLIP_AUG: &str = "MultiScaleFlipAug";

/// One pipeline step as written in the config.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineStep {
    #[serde(rename = "type")]
    pub step_type: String,
    #[serde(flatten)]
    pub params: BTreeMap<String, Value>,
}

impl PipelineStep {
    pub fn new(step_type: impl Into<String>) -> Self {
        Self {
            step_type: step_type.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }
}

/// Drops the file-loading steps from a pipeline.
pub fn prepare_pipeline(steps: &[PipelineStep]) -> Vec<PipelineStep> {
    steps
        .iter()
        .filter(|step| {
            let keep = !FILE_LOADING_STEPS.contains(&step.step_type.as_str());
            if !keep {
                tracing::debug!(step = %step.step_type, "dropping file loading step");
            }
            keep
        })
        .cloned()
        .collect()
}

/// Replaces `ImageToTensor` with `DefaultFormatBundle`, which can batch.
///
/// Steps nested in a `MultiScaleFlipAug` are rewritten as well.
pub fn replace_image_to_tensor(steps: &[PipelineStep]) -> Vec<PipelineStep> {
    steps.iter().map(replace_step).collect()
}

fn replace_step(step: &PipelineStep) -> PipelineStep {
    if step.step_type == IMAGE_TO_TENSOR {
        tracing::warn!(
            "\"ImageToTensor\" pipeline is replaced by \"DefaultFormatBundle\" for batch inference."
        );
        return PipelineStep::new(DEFAULT_FORMAT_BUNDLE);
    }

    if step.step_type == MULTI_SCALE_FLIP_AUG {
        if let Some(nested) = step
            .params
            .get("transforms")
            .and_then(|v| serde_json::from_value::<Vec<PipelineStep>>(v.clone()).ok())
        {
            let replaced = replace_image_to_tensor(&nested);
            if let Ok(value) = serde_json::to_value(replaced) {
                let mut step = step.clone();
                step.params.insert("transforms".to_string(), value);
                return step;
            }
        }
    }

    step.clone()
}
