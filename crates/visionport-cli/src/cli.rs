use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "visionport", version, about = "Single-image ONNX classifier")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile the model, classify one image and print the ranked classes
    Classify {
        /// Path to ONNX model file
        #[arg(long, default_value = "models/resnet50.onnx")]
        model: PathBuf,

        /// Image to classify
        #[arg(long, default_value = "images/turkish_coffee.jpg")]
        image: PathBuf,

        /// Class names, one per line
        #[arg(long, default_value = "models/imagenet_classes.txt")]
        labels: PathBuf,

        /// Name of the graph input to bind the image to
        #[arg(long, default_value = "input_tensor:0")]
        input_name: String,

        /// Fixed input shape, NxCxHxW
        #[arg(long, default_value = "1x3x224x224")]
        shape: String,

        /// Device for inference (cpu or cuda:N)
        #[arg(long, default_value = "cpu")]
        device: String,

        /// Arithmetic precision
        #[arg(long, value_enum, default_value_t = PrecisionArg::Auto)]
        precision: PrecisionArg,

        /// Build workspace in MiB
        #[arg(long, default_value_t = 1024)]
        workspace_mb: usize,

        /// Log level (RUST_LOG)
        #[arg(long, default_value = "info")]
        log: String,

        /// Severity threshold for the inference runtime's own diagnostics
        #[arg(long, default_value = "error")]
        runtime_log: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum PrecisionArg {
    /// fp16 when the device has fast half-precision
    Auto,
    /// Always fp32
    Full,
}
