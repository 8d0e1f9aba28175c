use crate::utils::error::InferenceError;
use crate::Result;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    /// 服务器绑定地址
    pub bind_addr: String,

    /// 模型文件目录
    pub models_dir: PathBuf,

    /// 分类模型文件名（相对于模型目录）
    pub classifier_model: String,

    /// 检测模型文件名（相对于模型目录）
    pub detector_model: String,

    /// 工作线程数量
    pub workers: usize,

    /// 开发模式
    pub dev_mode: bool,

    /// ONNX Runtime配置
    pub onnx_config: OnnxConfig,

    /// 服务器配置
    pub server_config: ServerConfig,

    /// 检测器后处理参数
    pub detector_params: DetectorParams,
}

#[derive(Debug, Clone)]
pub struct OnnxConfig {
    /// CPU线程数
    pub intra_threads: usize,

    /// 优化级别
    pub optimization_level: i32,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// 请求超时时间（秒）
    pub request_timeout: u64,

    /// 最大请求体大小（字节）
    pub max_request_size: usize,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct DetectorParams {
    /// 检测器输入边长（正方形）
    pub input_size: u32,

    /// 置信度阈值
    pub conf_threshold: f32,

    /// NMS IoU阈值
    pub iou_threshold: f32,

    /// 单张图像最多保留的检测框
    pub max_detections: usize,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            input_size: 640,
            conf_threshold: 0.25,
            iou_threshold: 0.7,
            max_detections: 300,
        }
    }
}

impl DetectorParams {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.conf_threshold) {
            return Err(InferenceError::Config(format!(
                "conf_threshold must be between 0.0 and 1.0, got {}",
                self.conf_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(InferenceError::Config(format!(
                "iou_threshold must be between 0.0 and 1.0, got {}",
                self.iou_threshold
            )));
        }
        if self.input_size == 0 || self.input_size % 32 != 0 {
            return Err(InferenceError::Config(format!(
                "input_size must be a positive multiple of 32, got {}",
                self.input_size
            )));
        }
        if self.max_detections == 0 {
            return Err(InferenceError::Config(
                "max_detections must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Config {
    pub fn new(
        bind_addr: String,
        models_dir: String,
        workers: Option<usize>,
        dev_mode: bool,
    ) -> Result<Self> {
        let cpu_cores = num_cpus::get();
        let workers = workers.unwrap_or(cpu_cores).max(1);

        let onnx_config = OnnxConfig {
            intra_threads: (cpu_cores * 3 / 4).max(1), // 使用75%的CPU核心
            optimization_level: 3,
        };

        let server_config = ServerConfig {
            request_timeout: if dev_mode { 300 } else { 60 },
            max_request_size: 20 * 1024 * 1024, // 20MB
        };

        Ok(Self {
            bind_addr,
            models_dir: PathBuf::from(models_dir),
            classifier_model: "vehicle_classifier.onnx".to_string(),
            detector_model: "yolov8n.onnx".to_string(),
            workers,
            dev_mode,
            onnx_config,
            server_config,
            detector_params: DetectorParams::default(),
        })
    }

    pub fn with_model_files(mut self, classifier: String, detector: String) -> Self {
        self.classifier_model = classifier;
        self.detector_model = detector;
        self
    }

    pub fn with_detector_params(mut self, params: DetectorParams) -> Result<Self> {
        params.validate()?;
        self.detector_params = params;
        Ok(self)
    }

    /// 获取分类模型路径
    pub fn classifier_model_path(&self) -> PathBuf {
        self.models_dir.join(&self.classifier_model)
    }

    /// 获取检测模型路径
    pub fn detector_model_path(&self) -> PathBuf {
        self.models_dir.join(&self.detector_model)
    }
}
