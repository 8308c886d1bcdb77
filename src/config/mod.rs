//! Training configuration.
//!
//! The config is the framework's usual training config with a few
//! dataset-store keys added (`deeplake_path`, `deeplake_dataloader`,
//! `deeplake_tensors`). Only the keys detbridge acts on are modelled;
//! everything else is ignored on load.

pub mod pipeline;

pub use pipeline::{prepare_pipeline, replace_image_to_tensor, PipelineStep};

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dataset::{DatasetMode, MetricsFormat, TensorNames};
use crate::error::DetbridgeError;

/// Runner type assumed when the config has none.
pub const DEFAULT_RUNNER: &str = "EpochBasedRunner";
/// The runner type that counts iterations instead of epochs.
pub const ITER_RUNNER: &str = "IterBasedRunner";

const DEFAULT_TRAIN_SAMPLES_PER_GPU: usize = 256;
const DEFAULT_TRAIN_WORKERS_PER_GPU: usize = 8;

/// The training config, as loaded from YAML or JSON.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Dataset location, resolved by the store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deeplake_path: Option<String>,

    /// Loader implementation: "auto", "c++"/"cpp" or "python".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deeplake_dataloader: Option<String>,

    #[serde(default)]
    pub deeplake_tensors: TensorNames,

    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub evaluation: EvaluationConfig,

    #[serde(default)]
    pub train_pipeline: Vec<PipelineStep>,

    #[serde(default)]
    pub test_pipeline: Vec<PipelineStep>,

    #[serde(default)]
    pub gpu_ids: Vec<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runner: Option<RunnerConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_from: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_from: Option<PathBuf>,

    #[serde(default)]
    pub auto_resume: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

/// The `data` section.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub samples_per_gpu: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers_per_gpu: Option<usize>,
    #[serde(default)]
    pub train_dataloader: LoaderOverrides,
    #[serde(default)]
    pub val_dataloader: LoaderOverrides,
}

/// Per-loader settings that override the defaults.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LoaderOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub samples_per_gpu: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers_per_gpu: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shuffle: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_workers: Option<bool>,
}

/// The `evaluation` section.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_format: Option<MetricsFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<MetricSpec>,
}

/// A metric name, or a list of them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricSpec {
    One(String),
    Many(Vec<String>),
}

/// The `runner` section.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    #[serde(rename = "type")]
    pub runner_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_epochs: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iters: Option<u32>,
}

impl TrainConfig {
    /// Parses a YAML config.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Parses a JSON config.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn metrics_format(&self) -> MetricsFormat {
        self.evaluation.metrics_format.unwrap_or_default()
    }

    pub fn runner_type(&self) -> &str {
        self.runner
            .as_ref()
            .map(|r| r.runner_type.as_str())
            .unwrap_or(DEFAULT_RUNNER)
    }

    /// True unless the runner counts iterations.
    pub fn eval_by_epoch(&self) -> bool {
        self.runner_type() != ITER_RUNNER
    }
}

/// Loads a config file, picking the parser by extension.
///
/// # Errors
/// Returns an error if the file cannot be read, has an unknown extension,
/// or does not parse.
pub fn load_config(path: &Path) -> Result<TrainConfig, DetbridgeError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    let parse_error = |message: String| DetbridgeError::ConfigParse {
        path: path.to_path_buf(),
        message,
    };

    match ext.as_deref() {
        Some("yaml") | Some("yml") => {
            let text = fs::read_to_string(path).map_err(DetbridgeError::Io)?;
            TrainConfig::from_yaml_str(&text).map_err(|e| parse_error(e.to_string()))
        }
        Some("json") => {
            let text = fs::read_to_string(path).map_err(DetbridgeError::Io)?;
            TrainConfig::from_json_str(&text).map_err(|e| parse_error(e.to_string()))
        }
        _ => Err(DetbridgeError::UnsupportedFormat(format!(
            "config '{}' (supported: .yaml, .yml, .json)",
            path.display()
        ))),
    }
}

/// Which loader implementation feeds training.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum DataloaderImpl {
    /// The store's native loader.
    #[serde(rename = "c++")]
    Native,
    #[serde(rename = "python")]
    Python,
}

impl DataloaderImpl {
    /// Resolves an implementation name.
    ///
    /// An explicit choice wins over the configured one; with neither the
    /// name is `"auto"`, which picks the native loader when available.
    pub fn resolve(
        explicit: Option<&str>,
        configured: Option<&str>,
        native_available: bool,
    ) -> Result<Self, DetbridgeError> {
        let name = explicit.or(configured).unwrap_or("auto").to_ascii_lowercase();
        match name.as_str() {
            "auto" if native_available => Ok(DataloaderImpl::Native),
            "auto" => Ok(DataloaderImpl::Python),
            "c++" | "cpp" => Ok(DataloaderImpl::Native),
            "python" => Ok(DataloaderImpl::Python),
            _ => Err(DetbridgeError::InvalidDataloaderImpl(name)),
        }
    }
}

impl fmt::Display for DataloaderImpl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataloaderImpl::Native => write!(f, "c++"),
            DataloaderImpl::Python => write!(f, "python"),
        }
    }
}

/// Fully resolved settings for one data loader.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LoaderSettings {
    pub samples_per_gpu: usize,
    pub workers_per_gpu: usize,
    pub shuffle: bool,
    pub dist: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub persistent_workers: bool,
    pub num_gpus: usize,
    pub runner_type: String,
    pub mode: DatasetMode,
    pub metrics_format: MetricsFormat,
}

impl LoaderSettings {
    fn with_overrides(mut self, overrides: &LoaderOverrides) -> Self {
        if let Some(v) = overrides.samples_per_gpu {
            self.samples_per_gpu = v;
        }
        if let Some(v) = overrides.workers_per_gpu {
            self.workers_per_gpu = v;
        }
        if let Some(v) = overrides.shuffle {
            self.shuffle = v;
        }
        if let Some(v) = overrides.persistent_workers {
            self.persistent_workers = v;
        }
        self
    }
}

/// Settings for the training loader.
pub fn train_loader_settings(cfg: &TrainConfig, distributed: bool) -> LoaderSettings {
    LoaderSettings {
        samples_per_gpu: cfg
            .data
            .samples_per_gpu
            .unwrap_or(DEFAULT_TRAIN_SAMPLES_PER_GPU),
        workers_per_gpu: cfg
            .data
            .workers_per_gpu
            .unwrap_or(DEFAULT_TRAIN_WORKERS_PER_GPU),
        shuffle: true,
        dist: distributed,
        seed: cfg.seed,
        persistent_workers: false,
        num_gpus: cfg.gpu_ids.len(),
        runner_type: cfg.runner_type().to_string(),
        mode: DatasetMode::Train,
        metrics_format: cfg.metrics_format(),
    }
    .with_overrides(&cfg.data.train_dataloader)
}

/// Settings for the validation loader.
pub fn val_loader_settings(cfg: &TrainConfig, distributed: bool) -> LoaderSettings {
    LoaderSettings {
        samples_per_gpu: 1,
        workers_per_gpu: 1,
        shuffle: false,
        dist: distributed,
        seed: cfg.seed,
        persistent_workers: false,
        num_gpus: cfg.gpu_ids.len(),
        runner_type: cfg.runner_type().to_string(),
        mode: DatasetMode::Val,
        metrics_format: cfg.metrics_format(),
    }
    .with_overrides(&cfg.data.val_dataloader)
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
deeplake_path: hub://org/coco-train
deeplake_dataloader: Python
deeplake_tensors:
  img: images
  gt_bboxes: boxes
  gt_labels: categories
data:
  samples_per_gpu: 4
  workers_per_gpu: 2
  val_dataloader:
    samples_per_gpu: 8
evaluation:
  metrics_format: COCO
  interval: 1
  metric: [bbox]
train_pipeline:
  - type: LoadImageFromFile
  - type: Resize
    img_scale: [640, 480]
gpu_ids: [0, 1]
seed: 42
runner:
  type: IterBasedRunner
  max_iters: 1000
optimizer:
  type: SGD
  lr: 0.02
"#;

    #[test]
    fn test_yaml_config() {
        let cfg = TrainConfig::from_yaml_str(YAML).unwrap();
        assert_eq!(cfg.deeplake_tensors.img.as_deref(), Some("images"));
        assert_eq!(cfg.deeplake_tensors.gt_masks, None);
        assert_eq!(cfg.metrics_format(), MetricsFormat::Coco);
        assert_eq!(cfg.runner_type(), "IterBasedRunner");
        assert!(!cfg.eval_by_epoch());
        assert_eq!(cfg.train_pipeline.len(), 2);
        assert_eq!(
            cfg.evaluation.metric,
            Some(MetricSpec::Many(vec!["bbox".to_string()]))
        );
    }

    #[test]
    fn test_empty_config_defaults() {
        let cfg = TrainConfig::from_json_str("{}").unwrap();
        assert_eq!(cfg.metrics_format(), MetricsFormat::PascalVoc);
        assert_eq!(cfg.runner_type(), DEFAULT_RUNNER);
        assert!(cfg.eval_by_epoch());

        let train = train_loader_settings(&cfg, false);
        assert_eq!(train.samples_per_gpu, 256);
        assert_eq!(train.workers_per_gpu, 8);
        assert!(train.shuffle);
        assert_eq!(train.mode, DatasetMode::Train);

        let val = val_loader_settings(&cfg, true);
        assert_eq!(val.samples_per_gpu, 1);
        assert_eq!(val.workers_per_gpu, 1);
        assert!(!val.shuffle);
        assert!(val.dist);
        assert_eq!(val.mode, DatasetMode::Val);
    }

    #[test]
    fn test_loader_overrides() {
        let cfg = TrainConfig::from_yaml_str(YAML).unwrap();
        let train = train_loader_settings(&cfg, false);
        assert_eq!(train.samples_per_gpu, 4);
        assert_eq!(train.workers_per_gpu, 2);
        assert_eq!(train.num_gpus, 2);
        assert_eq!(train.seed, Some(42));

        let val = val_loader_settings(&cfg, false);
        assert_eq!(val.samples_per_gpu, 8);
        assert_eq!(val.workers_per_gpu, 1);
        assert_eq!(val.metrics_format, MetricsFormat::Coco);
    }

    #[test]
    fn test_dataloader_impl_resolution() {
        assert_eq!(
            DataloaderImpl::resolve(None, None, true).unwrap(),
            DataloaderImpl::Native
        );
        assert_eq!(
            DataloaderImpl::resolve(None, Some("AUTO"), false).unwrap(),
            DataloaderImpl::Python
        );
        assert_eq!(
            DataloaderImpl::resolve(Some("cpp"), Some("python"), false).unwrap(),
            DataloaderImpl::Native
        );
        assert_eq!(
            DataloaderImpl::resolve(None, Some("Python"), true).unwrap(),
            DataloaderImpl::Python
        );
        assert!(matches!(
            DataloaderImpl::resolve(Some("rust"), None, true),
            Err(DetbridgeError::InvalidDataloaderImpl(name)) if name == "rust"
        ));
    }

    #[test]
    fn test_load_config_by_extension() {
        let temp = tempfile::tempdir().expect("create temp dir");

        let yaml_path = temp.path().join("train.yml");
        fs::write(&yaml_path, YAML).unwrap();
        assert!(load_config(&yaml_path).is_ok());

        let json_path = temp.path().join("train.json");
        fs::write(&json_path, r#"{"seed": 3}"#).unwrap();
        assert_eq!(load_config(&json_path).unwrap().seed, Some(3));

        let bad_path = temp.path().join("broken.json");
        fs::write(&bad_path, "{").unwrap();
        assert!(matches!(
            load_config(&bad_path),
            Err(DetbridgeError::ConfigParse { .. })
        ));

        let py_path = temp.path().join("train.py");
        fs::write(&py_path, "x = 1").unwrap();
        assert!(matches!(
            load_config(&py_path),
            Err(DetbridgeError::UnsupportedFormat(_))
        ));
    }
}
