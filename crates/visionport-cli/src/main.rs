mod cli;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command, PrecisionArg};
use tracing_subscriber::EnvFilter;
use visionport_backend_ort::OrtCompiler;
use visionport_core::{
    BuildConstraints, Device, DeviceAllocator, ModelArtifact, PrecisionHint, Shape,
};
use visionport_runtime::{InferencePipeline, PipelineConfig};

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Classify {
            model,
            image,
            labels,
            input_name,
            shape,
            device,
            precision,
            workspace_mb,
            log,
            runtime_log,
        } => {
            init_logging(&log);
            let shape: Shape = shape.parse().context("invalid --shape")?;
            let device: Device = device.parse().context("invalid --device")?;
            let runtime_log: tracing::Level =
                runtime_log.parse().context("invalid --runtime-log")?;
            let hint = match precision {
                PrecisionArg::Auto => PrecisionHint::PreferReduced,
                PrecisionArg::Full => PrecisionHint::Full,
            };
            let workspace_bytes = workspace_mb
                .checked_mul(1 << 20)
                .context("--workspace-mb overflows")?;

            let constraints = BuildConstraints::fixed(input_name, shape)
                .with_precision_hint(hint)
                .with_workspace_bytes(workspace_bytes)
                .with_runtime_log_level(runtime_log);
            classify(model, image, labels, device, constraints)
        }
    }
}

fn init_logging(log: &str) {
    std::env::set_var("RUST_LOG", log);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
}

fn classify(
    model: PathBuf,
    image: PathBuf,
    labels: PathBuf,
    device: Device,
    constraints: BuildConstraints,
) -> Result<()> {
    let allocator = DeviceAllocator::new(device)?;
    let config = PipelineConfig::new(ModelArtifact::OnnxPath(model), image, labels, constraints);
    let mut pipeline = InferencePipeline::new(OrtCompiler::new(), allocator, config);

    let report = pipeline.run()?;

    for prediction in &report.predictions {
        println!("{prediction}");
    }
    println!("inference time : {}ms", report.inference_latency.as_millis());
    tracing::info!(
        precision = %report.precision,
        classes = report.predictions.len(),
        "classification finished"
    );
    Ok(())
}
