pub mod classifier;
pub mod detector;
pub mod labels;
pub mod manager;

pub use classifier::{Classifier, VehicleLabel};
pub use detector::{Detection, Detector};
pub use labels::Bucket;
pub use manager::{ModelManager, ModelStats};

use crate::config::OnnxConfig;
use crate::utils::error::InferenceError;
use crate::Result;
use image::RgbImage;
use ort::session::{builder::GraphOptimizationLevel, Session};
use std::fmt;
use std::path::Path;

/// 服务加载的两类模型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    Classifier,
    Detector,
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::Classifier => write!(f, "Classifier"),
            ModelKind::Detector => write!(f, "YOLO"),
        }
    }
}

/// 二分类模型：输出 cyclist 概率
pub trait ImageClassifier: Send + Sync {
    fn predict_probability(&self, image: &RgbImage) -> Result<f32>;
}

/// 目标检测模型：按置信度降序返回检测框
pub trait ObjectDetector: Send + Sync {
    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>>;
}

/// 按统一配置创建 ONNX Runtime 会话
pub(crate) fn build_session(model_path: &Path, onnx_config: &OnnxConfig, kind: ModelKind) -> Result<Session> {
    if !model_path.exists() {
        return Err(InferenceError::ModelLoad(format!(
            "{} model not found: {}",
            kind,
            model_path.display()
        )));
    }

    tracing::info!("Loading {} model from: {}", kind, model_path.display());

    let level = match onnx_config.optimization_level {
        0 => GraphOptimizationLevel::Disable,
        1 => GraphOptimizationLevel::Level1,
        2 => GraphOptimizationLevel::Level2,
        _ => GraphOptimizationLevel::Level3,
    };

    let session = Session::builder()?
        .with_optimization_level(level)?
        .with_intra_threads(onnx_config.intra_threads)?
        .commit_from_file(model_path)?;

    Ok(session)
}

/// 动态发现首个输入和输出的名称
pub(crate) fn io_names(session: &Session, kind: ModelKind) -> Result<(String, String)> {
    let input_name = match session.inputs.first() {
        Some(input) => input.name.clone(),
        None => {
            return Err(InferenceError::ModelLoad(format!("{} model has no inputs", kind)));
        }
    };

    let output_name = match session.outputs.first() {
        Some(output) => output.name.clone(),
        None => {
            return Err(InferenceError::ModelLoad(format!("{} model has no outputs", kind)));
        }
    };

    for (i, output) in session.outputs.iter().enumerate() {
        tracing::debug!("{} output[{}]: '{}'", kind, i, output.name);
    }
    tracing::info!("{} model input: '{}', output: '{}'", kind, input_name, output_name);

    Ok((input_name, output_name))
}
