use crate::config::DetectorParams;
use crate::models::classifier::CLASSIFIER_INPUT_SIZE;
use crate::models::{Classifier, Detector, ImageClassifier, ModelKind, ObjectDetector};
use crate::utils::error::InferenceError;
use crate::{Config, Result};
use once_cell::sync::OnceCell;
use std::sync::Arc;

/// 模型管理器：启动时加载一次，之后只读共享
pub struct ModelManager {
    classifier: Option<Arc<dyn ImageClassifier>>,
    detector: Option<Arc<dyn ObjectDetector>>,
    config: Config,
}

/// 只用于防止重复初始化；处理器通过 AppState 拿到同一个 Arc
static MODEL_MANAGER: OnceCell<Arc<ModelManager>> = OnceCell::new();

impl ModelManager {
    /// 加载两个模型；单个模型加载失败只记录警告，对应路由返回 ModelUnavailable
    pub fn load(config: Config) -> Self {
        tracing::info!("Initializing model manager...");

        let classifier = match Classifier::new(&config) {
            Ok(cls) => {
                tracing::info!("Classifier model loaded successfully");
                Some(Arc::new(cls) as Arc<dyn ImageClassifier>)
            }
            Err(e) => {
                tracing::warn!("Failed to load classifier model: {}", e);
                None
            }
        };

        let detector = match Detector::new(&config) {
            Ok(det) => {
                tracing::info!("YOLO model loaded successfully");
                Some(Arc::new(det) as Arc<dyn ObjectDetector>)
            }
            Err(e) => {
                tracing::warn!("Failed to load YOLO model: {}", e);
                None
            }
        };

        Self::from_parts(config, classifier, detector)
    }

    /// 直接用已构造的模型组装（测试或自定义后端）
    pub fn from_parts(
        config: Config,
        classifier: Option<Arc<dyn ImageClassifier>>,
        detector: Option<Arc<dyn ObjectDetector>>,
    ) -> Self {
        Self {
            classifier,
            detector,
            config,
        }
    }

    /// 加载模型，进程内只允许调用一次
    pub fn init(config: Config) -> Result<Arc<ModelManager>> {
        let manager = Arc::new(Self::load(config));

        MODEL_MANAGER
            .set(Arc::clone(&manager))
            .map_err(|_| InferenceError::Internal("Model manager already initialized".to_string()))?;

        tracing::info!(
            "Model manager initialized: classifier={}, detector={}",
            manager.has_classifier(),
            manager.has_detector()
        );
        Ok(manager)
    }

    pub fn classifier(&self) -> Result<Arc<dyn ImageClassifier>> {
        self.classifier
            .as_ref()
            .map(Arc::clone)
            .ok_or(InferenceError::ModelUnavailable(ModelKind::Classifier))
    }

    pub fn detector(&self) -> Result<Arc<dyn ObjectDetector>> {
        self.detector
            .as_ref()
            .map(Arc::clone)
            .ok_or(InferenceError::ModelUnavailable(ModelKind::Detector))
    }

    pub fn has_classifier(&self) -> bool {
        self.classifier.is_some()
    }

    pub fn has_detector(&self) -> bool {
        self.detector.is_some()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 获取模型统计信息
    pub fn get_stats(&self) -> ModelStats {
        ModelStats {
            has_classifier: self.has_classifier(),
            has_detector: self.has_detector(),
            classifier_input_size: CLASSIFIER_INPUT_SIZE,
            detector_params: self.config.detector_params.clone(),
            intra_threads: self.config.onnx_config.intra_threads,
            optimization_level: self.config.onnx_config.optimization_level,
        }
    }
}

/// 模型统计信息
#[derive(Debug, Clone, serde::Serialize)]
pub struct ModelStats {
    pub has_classifier: bool,
    pub has_detector: bool,
    pub classifier_input_size: u32,
    pub detector_params: DetectorParams,
    pub intra_threads: usize,
    pub optimization_level: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    struct Fixed(f32);

    impl ImageClassifier for Fixed {
        fn predict_probability(&self, _image: &RgbImage) -> Result<f32> {
            Ok(self.0)
        }
    }

    fn config(models_dir: &str) -> Config {
        Config::new("127.0.0.1:0".into(), models_dir.into(), Some(1), false).unwrap()
    }

    #[test]
    fn missing_model_files_degrade_to_unavailable() {
        let manager = ModelManager::load(config("/nonexistent/models"));

        assert!(!manager.has_classifier());
        assert!(!manager.has_detector());
        assert!(matches!(
            manager.detector(),
            Err(InferenceError::ModelUnavailable(ModelKind::Detector))
        ));
        assert!(matches!(
            manager.classifier(),
            Err(InferenceError::ModelUnavailable(ModelKind::Classifier))
        ));
    }

    #[test]
    fn second_init_is_rejected() {
        let first = ModelManager::init(config("/nonexistent/models")).unwrap();
        assert!(!first.has_detector());

        assert!(matches!(
            ModelManager::init(config("/nonexistent/models")),
            Err(InferenceError::Internal(_))
        ));
    }

    #[test]
    fn stats_reflect_loaded_models() {
        let manager = ModelManager::from_parts(config("models"), Some(Arc::new(Fixed(0.2))), None);
        let stats = manager.get_stats();

        assert!(stats.has_classifier);
        assert!(!stats.has_detector);
        assert_eq!(stats.classifier_input_size, 224);
        assert_eq!(stats.detector_params.input_size, 640);
    }
}
