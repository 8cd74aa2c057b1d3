//! `lowlight-eval` CLI - score a low-light enhancement network on a paired dataset.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lowlight_eval::dataset::{Dataset, DatasetKind};
use lowlight_eval::image::DEFAULT_FACTOR;
use lowlight_eval::model::{Device, ModelCache, WeightsSource};
use lowlight_eval::options::{self, Options};
use lowlight_eval::{EvalConfig, Evaluator};

/// Image enhancement evaluation using MIRNet-v2 / RetinexFormer ONNX models.
#[derive(Parser, Debug)]
#[command(name = "lowlight-eval")]
#[command(version, about, long_about = None)]
struct Args {
    /// Directory of validation inputs. Overrides `dataroot_lq` from the option file.
    #[arg(long, value_name = "DIR")]
    input_dir: Option<PathBuf>,

    /// Directory for results.
    #[arg(long, default_value = "./results/", value_name = "DIR")]
    result_dir: PathBuf,

    /// Path to option YAML file.
    #[arg(long, default_value = "Options/RetinexFormer_SDSD_indoor.yml", value_name = "FILE")]
    opt: PathBuf,

    /// Path or URL of the ONNX weights.
    #[arg(long, default_value = "pretrained_weights/SDSD_indoor.onnx", value_name = "PATH")]
    weights: String,

    /// Test dataset, e.g. SID, SMID, SDSD_indoor, SDSD_outdoor, SID_SAM, LOLv2.
    #[arg(long, default_value = "SDSD_indoor", value_name = "NAME")]
    dataset: String,

    /// GPU device ids, or `cpu`. Only the first id is used.
    #[arg(long, default_value = "0", value_name = "IDS")]
    gpus: String,

    /// Stride factor inputs are padded to.
    #[arg(long, default_value_t = DEFAULT_FACTOR, value_name = "INT")]
    factor: usize,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("lowlight_eval={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    if let Err(err) = run(args) {
        tracing::error!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn run(args: Args) -> Result<()> {
    tracing::info!("dataset {}", args.dataset);

    let kind: DatasetKind = args
        .dataset
        .parse()
        .unwrap_or_else(|never| match never {});
    let device: Device = args.gpus.parse().context("Invalid --gpus")?;

    let mut options = Options::from_file(&args.opt).context("Failed to load option file")?;
    if let Some(network) = options.network() {
        tracing::info!("Network: {network}");
    }
    if let Some(input_dir) = args.input_dir {
        options.datasets.val.dataroot_lq = options::expand_home(&input_dir);
    }

    let dataset =
        Dataset::open(kind, &options.datasets.val).context("Failed to open test dataset")?;

    let weights = WeightsSource::parse(&args.weights);
    let weights_path = ModelCache::new()
        .resolve(&weights)
        .context("Failed to resolve weights")?;

    let config = EvalConfig {
        result_dir: args.result_dir,
        config_name: options::config_name(&args.opt),
        checkpoint_name: weights.checkpoint_name(),
        factor: args.factor,
    };

    let mut evaluator = Evaluator::new(config, &weights_path, device)
        .context("Failed to initialize evaluator")?;

    let summary = evaluator
        .evaluate(&dataset)
        .context("Failed to evaluate dataset")?;

    println!("PSNR: {:.6} ", summary.psnr);
    println!("SSIM: {:.6} ", summary.ssim);

    Ok(())
}
