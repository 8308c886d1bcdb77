//! Training plan.
//!
//! [`TrainPlan::from_config`] resolves the decisions made before a training
//! run starts: which loader implementation to use, which tensors feed it,
//! loader settings for both splits, how validation is scheduled and which
//! checkpoint to start from. The run itself is driven by the framework.

pub mod checkpoint;

pub use checkpoint::find_latest_checkpoint;

use std::path::PathBuf;

use serde::Serialize;

use crate::config::{
    replace_image_to_tensor, train_loader_settings, val_loader_settings, DataloaderImpl,
    LoaderSettings, MetricSpec, PipelineStep, TrainConfig,
};
use crate::dataset::{MetricsFormat, TensorNames};
use crate::error::DetbridgeError;
use crate::loader::LoaderPlan;
use crate::store::TensorStore;

/// Caller-side options for planning a run.
#[derive(Clone, Debug, Default)]
pub struct TrainOptions {
    pub distributed: bool,
    /// Also plan a validation loader.
    pub validate: bool,
    /// Loader implementation; overrides `deeplake_dataloader`.
    pub dataloader: Option<String>,
    /// Whether the native loader can be used on this machine.
    pub native_available: bool,
    /// Tensor names; each one set here overrides `deeplake_tensors`.
    pub tensors: TensorNames,
}

/// Where the model weights come from at start.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "path", rename_all = "snake_case")]
pub enum CheckpointAction {
    /// Restore weights, optimizer state and counters.
    Resume(PathBuf),
    /// Restore weights only.
    Load(PathBuf),
}

/// The validation half of a plan.
#[derive(Clone, Debug, Serialize)]
pub struct ValidationPlan {
    pub loader: LoaderSettings,
    pub pipeline: Vec<PipelineStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<MetricSpec>,
    pub by_epoch: bool,
}

/// Everything decided before training starts.
#[derive(Clone, Debug, Serialize)]
pub struct TrainPlan {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset_path: Option<String>,
    pub dataloader: DataloaderImpl,
    pub tensors: TensorNames,
    pub train_loader: LoaderSettings,
    pub train_pipeline: Vec<PipelineStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationPlan>,
    pub metrics_format: MetricsFormat,
    pub runner_type: String,
    pub eval_by_epoch: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<CheckpointAction>,
}

impl TrainPlan {
    /// Resolves a plan from a loaded config.
    ///
    /// # Errors
    /// Fails on an unknown loader implementation or when the work
    /// directory cannot be scanned for checkpoints.
    pub fn from_config(cfg: &TrainConfig, opts: &TrainOptions) -> Result<Self, DetbridgeError> {
        let dataloader = DataloaderImpl::resolve(
            opts.dataloader.as_deref(),
            cfg.deeplake_dataloader.as_deref(),
            opts.native_available,
        )?;
        let tensors = opts.tensors.clone().or(&cfg.deeplake_tensors);
        let train_loader = train_loader_settings(cfg, opts.distributed);

        let validation = opts.validate.then(|| {
            let loader = val_loader_settings(cfg, opts.distributed);
            let pipeline = if loader.samples_per_gpu > 1 {
                replace_image_to_tensor(&cfg.test_pipeline)
            } else {
                cfg.test_pipeline.clone()
            };
            ValidationPlan {
                loader,
                pipeline,
                interval: cfg.evaluation.interval,
                metric: cfg.evaluation.metric.clone(),
                by_epoch: cfg.eval_by_epoch(),
            }
        });

        let plan = Self {
            dataset_path: cfg.deeplake_path.clone(),
            dataloader,
            tensors,
            train_loader,
            train_pipeline: cfg.train_pipeline.clone(),
            validation,
            metrics_format: cfg.metrics_format(),
            runner_type: cfg.runner_type().to_string(),
            eval_by_epoch: cfg.eval_by_epoch(),
            checkpoint: resolve_checkpoint(cfg)?,
        };

        tracing::info!(
            dataloader = %plan.dataloader,
            runner = %plan.runner_type,
            validate = plan.validation.is_some(),
            "resolved training plan"
        );

        Ok(plan)
    }

    /// Plans the training loader against `store`.
    pub fn train_loader_plan<S: TensorStore + ?Sized>(
        &self,
        store: &S,
    ) -> Result<LoaderPlan, DetbridgeError> {
        LoaderPlan::build(
            store,
            &self.tensors,
            &self.train_loader,
            self.dataloader,
            &self.train_pipeline,
        )
    }

    /// Plans the validation loader against `store`, when validating.
    pub fn val_loader_plan<S: TensorStore + ?Sized>(
        &self,
        store: &S,
    ) -> Result<Option<LoaderPlan>, DetbridgeError> {
        self.validation
            .as_ref()
            .map(|val| {
                LoaderPlan::build(store, &self.tensors, &val.loader, self.dataloader, &val.pipeline)
            })
            .transpose()
    }
}

fn resolve_checkpoint(cfg: &TrainConfig) -> Result<Option<CheckpointAction>, DetbridgeError> {
    if let Some(path) = &cfg.resume_from {
        return Ok(Some(CheckpointAction::Resume(path.clone())));
    }

    if cfg.auto_resume {
        if let Some(work_dir) = &cfg.work_dir {
            if let Some(path) = find_latest_checkpoint(work_dir)? {
                tracing::info!(path = %path.display(), "auto resuming from checkpoint");
                return Ok(Some(CheckpointAction::Resume(path)));
            }
        }
    }

    Ok(cfg.load_from.clone().map(CheckpointAction::Load))
}
