//! detbridge: tensor-store datasets for detection training.
//!
//! detbridge adapts object-detection datasets held in a tensor store to
//! the shape a detection training framework expects. Its core is a
//! bounding-box normalizer that turns any supported box encoding into
//! Pascal VOC pixel corners; around it sit the dataset adapter, record
//! construction, loader planning, training plans and evaluation wiring.
//!
//! # Modules
//!
//! - [`bbox`]: Box encodings and conversion to Pascal VOC pixel corners
//! - [`store`]: The tensor store seam and a JSON-backed in-memory store
//! - [`dataset`]: Detection dataset adapter (annotations, counts, filtering)
//! - [`transform`]: Training record construction
//! - [`config`]: Training configuration
//! - [`loader`]: Data loader planning
//! - [`train`]: Training plans and checkpoint discovery
//! - [`evaluation`]: Metric wiring and result naming
//! - [`validation`]: Dataset validation and error reporting
//! - [`error`]: Error types for detbridge operations

pub mod bbox;
pub mod config;
pub mod dataset;
pub mod error;
pub mod evaluation;
pub mod loader;
pub mod store;
pub mod train;
pub mod transform;
pub mod validation;

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::bbox::{convert_to_pascal_format, FormatDescriptor, ImageShape};
use crate::dataset::{DatasetOptions, DetectionDataset, TensorBindings, TensorNames};
use crate::loader::LoaderPlan;
use crate::train::{TrainOptions, TrainPlan};

pub use error::DetbridgeError;

/// The detbridge CLI application.
#[derive(Parser)]
#[command(name = "detbridge")]
#[command(version, author, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Convert boxes to Pascal VOC pixel corners (LTRB).
    Convert(ConvertArgs),
    /// Show per-class instance counts of a tensor store.
    Inspect(InspectArgs),
    /// Validate the annotations of a tensor store.
    Validate(ValidateArgs),
    /// Resolve a training config into a training plan.
    Plan(PlanArgs),
}

/// Arguments for the convert subcommand.
#[derive(clap::Args)]
struct ConvertArgs {
    /// Headerless CSV with one box per row (reads stdin when omitted).
    input: Option<PathBuf>,

    /// Box layout ('LTWH', 'LTRB' or 'CCWH').
    #[arg(long)]
    mode: Option<String>,

    /// Box unit ('pixel' or 'fractional').
    #[arg(long = "type")]
    unit: Option<String>,

    /// Image height in pixels.
    #[arg(long)]
    height: usize,

    /// Image width in pixels.
    #[arg(long)]
    width: usize,
}

/// Tensor names; any left out are found by htype.
#[derive(clap::Args)]
struct TensorArgs {
    /// Image tensor.
    #[arg(long)]
    images: Option<String>,

    /// Bounding box tensor.
    #[arg(long)]
    boxes: Option<String>,

    /// Class label tensor.
    #[arg(long)]
    labels: Option<String>,
}

impl TensorArgs {
    fn into_names(self) -> TensorNames {
        TensorNames {
            img: self.images,
            gt_bboxes: self.boxes,
            gt_labels: self.labels,
            ..Default::default()
        }
    }
}

/// Arguments for the inspect subcommand.
#[derive(clap::Args)]
struct InspectArgs {
    /// Tensor store JSON file.
    input: PathBuf,

    #[command(flatten)]
    tensors: TensorArgs,
}

/// Arguments for the validate subcommand.
#[derive(clap::Args)]
struct ValidateArgs {
    /// Tensor store JSON file.
    input: PathBuf,

    #[command(flatten)]
    tensors: TensorArgs,

    /// Treat warnings as errors (exit non-zero if any warnings).
    #[arg(long)]
    strict: bool,

    /// Output format for the report ('text' or 'json').
    #[arg(long, default_value = "text")]
    output: String,
}

/// Arguments for the plan subcommand.
#[derive(clap::Args)]
struct PlanArgs {
    /// Training config (.yaml, .yml or .json).
    config: PathBuf,

    /// Plan for distributed training.
    #[arg(long)]
    distributed: bool,

    /// Also plan validation.
    #[arg(long)]
    validate: bool,

    /// Loader implementation ('auto', 'c++', 'cpp' or 'python').
    #[arg(long)]
    dataloader: Option<String>,

    /// Whether the native loader is available.
    #[arg(long)]
    native_available: bool,

    /// Tensor store JSON; when given, loaders are planned against it.
    #[arg(long)]
    store: Option<PathBuf>,
}

/// Installs a `tracing` subscriber that writes to stderr, filtered by
/// `RUST_LOG`.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

/// Run the detbridge CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), DetbridgeError> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Convert(args)) => run_convert(args),
        Some(Commands::Inspect(args)) => run_inspect(args),
        Some(Commands::Validate(args)) => run_validate(args),
        Some(Commands::Plan(args)) => run_plan(args),
        None => {
            println!("detbridge {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Tensor-store datasets for detection training.");
            println!();
            println!("Run 'detbridge --help' for usage information.");
            Ok(())
        }
    }
}

/// Execute the convert subcommand.
fn run_convert(args: ConvertArgs) -> Result<(), DetbridgeError> {
    let reader: Box<dyn Read> = match &args.input {
        Some(path) => Box::new(BufReader::new(File::open(path)?)),
        None => Box::new(io::stdin().lock()),
    };
    let boxes = bbox::io_csv::read_boxes_csv(reader)?;

    let mut descriptor = FormatDescriptor::empty();
    if let Some(mode) = args.mode {
        descriptor = descriptor.with_mode(mode);
    }
    if let Some(unit) = args.unit {
        descriptor = descriptor.with_type(unit);
    }

    let shape = ImageShape::new(args.height, args.width);
    let pascal = convert_to_pascal_format(boxes.view(), &descriptor, shape)?;
    print!("{}", bbox::io_csv::to_boxes_csv_string(&pascal)?);
    Ok(())
}

fn load_dataset(input: &Path, tensors: TensorArgs) -> Result<DetectionDataset, DetbridgeError> {
    let store = store::read_store_json(input)?;
    let bindings = TensorBindings::resolve(&store, &tensors.into_names())?;
    DetectionDataset::from_store(&store, bindings, DatasetOptions::default())
}

/// Execute the inspect subcommand.
fn run_inspect(args: InspectArgs) -> Result<(), DetbridgeError> {
    let dataset = load_dataset(&args.input, args.tensors)?;
    print!("{}", dataset.instance_counts());
    Ok(())
}

/// Execute the validate subcommand.
fn run_validate(args: ValidateArgs) -> Result<(), DetbridgeError> {
    let dataset = load_dataset(&args.input, args.tensors)?;

    let opts = validation::ValidateOptions {
        strict: args.strict,
    };
    let report = validation::validate_dataset(&dataset, &opts);

    match args.output.as_str() {
        "json" => {
            let json = serde_json::to_string_pretty(&report)
                .map_err(DetbridgeError::OutputSerialize)?;
            println!("{}", json);
        }
        "text" => print!("{}", report),
        other => {
            return Err(DetbridgeError::UnsupportedFormat(format!(
                "report output '{}' (supported: text, json)",
                other
            )));
        }
    }

    let has_errors = report.error_count() > 0;
    let has_warnings = report.warning_count() > 0;

    if has_errors || (args.strict && has_warnings) {
        Err(DetbridgeError::ValidationFailed {
            error_count: report.error_count(),
            warning_count: report.warning_count(),
            report,
        })
    } else {
        Ok(())
    }
}

/// A training plan, plus loader plans when a store was given.
#[derive(Serialize)]
struct PlanOutput<'a> {
    #[serde(flatten)]
    plan: &'a TrainPlan,
    #[serde(skip_serializing_if = "Option::is_none")]
    train_loader_plan: Option<LoaderPlan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    val_loader_plan: Option<LoaderPlan>,
}

/// Execute the plan subcommand.
fn run_plan(args: PlanArgs) -> Result<(), DetbridgeError> {
    let cfg = config::load_config(&args.config)?;
    let opts = TrainOptions {
        distributed: args.distributed,
        validate: args.validate,
        dataloader: args.dataloader,
        native_available: args.native_available,
        tensors: TensorNames::default(),
    };
    let plan = TrainPlan::from_config(&cfg, &opts)?;

    let mut output = PlanOutput {
        plan: &plan,
        train_loader_plan: None,
        val_loader_plan: None,
    };
    if let Some(path) = &args.store {
        let store = store::read_store_json(path)?;
        output.train_loader_plan = Some(plan.train_loader_plan(&store)?);
        output.val_loader_plan = plan.val_loader_plan(&store)?;
    }

    let json = serde_json::to_string_pretty(&output).map_err(DetbridgeError::OutputSerialize)?;
    println!("{}", json);
    Ok(())
}
