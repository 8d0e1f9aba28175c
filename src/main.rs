use anyhow::Result;
use clap::Parser;
use roadwise_inference::{
    config::{Config, DetectorParams},
    web::serve,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "roadwise-inference")]
#[command(about = "Vehicle/cyclist classification and YOLO detection service")]
struct Args {
    /// Server bind address
    #[arg(long, default_value = "0.0.0.0:5000")]
    bind: String,

    /// Number of worker threads
    #[arg(long)]
    workers: Option<usize>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Model directory path
    #[arg(long, default_value = "models")]
    models_dir: String,

    /// Classifier ONNX file, relative to the model directory
    #[arg(long, default_value = "vehicle_classifier.onnx")]
    classifier_model: String,

    /// Detector ONNX file, relative to the model directory
    #[arg(long, default_value = "yolov8n.onnx")]
    detector_model: String,

    /// Detector confidence threshold
    #[arg(long, default_value_t = 0.25)]
    conf_threshold: f32,

    /// Detector NMS IoU threshold
    #[arg(long, default_value_t = 0.7)]
    iou_threshold: f32,

    /// Enable development mode
    #[arg(long)]
    dev: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志系统
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_target(false)
        .init();

    tracing::info!("Starting Roadwise inference service...");
    tracing::info!("Bind address: {}", args.bind);
    tracing::info!("Models directory: {}", args.models_dir);

    let detector_params = DetectorParams {
        conf_threshold: args.conf_threshold,
        iou_threshold: args.iou_threshold,
        ..DetectorParams::default()
    };

    let config = Config::new(args.bind, args.models_dir, args.workers, args.dev)?
        .with_model_files(args.classifier_model, args.detector_model)
        .with_detector_params(detector_params)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.workers)
        .enable_all()
        .build()?;

    runtime.block_on(serve(config))?;

    Ok(())
}
