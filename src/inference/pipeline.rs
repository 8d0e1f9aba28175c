use crate::{
    image::ImageLoader,
    inference::{ClassificationResponse, DetectionResponse, ResultFormatter},
    models::ModelManager,
    Result,
};
use std::time::Instant;

/// 推理流水线：解码 -> 预处理 -> 模型 -> 格式化
pub struct InferencePipeline;

impl InferencePipeline {
    /// 二分类：vehicle / cyclist
    pub fn classify_bytes(
        models: &ModelManager,
        bytes: &[u8],
        max_size: usize,
    ) -> Result<ClassificationResponse> {
        let start_time = Instant::now();

        // 模型不可用时不解码图像，直接返回错误
        let classifier = models.classifier()?;
        let image = ImageLoader::from_bytes(bytes, max_size)?;

        let probability = classifier.predict_probability(&image)?;
        let response = ResultFormatter::format_classification(probability);

        tracing::info!(
            "Classification completed: {}x{}, probability={:.4}, prediction={}, time={:.3}s",
            image.width(),
            image.height(),
            probability,
            response.prediction,
            start_time.elapsed().as_secs_f32()
        );

        Ok(response)
    }

    /// 目标检测并统计 vehicle / cyclist 数量
    pub fn detect_bytes(
        models: &ModelManager,
        bytes: &[u8],
        max_size: usize,
    ) -> Result<DetectionResponse> {
        let start_time = Instant::now();

        let detector = models.detector()?;
        let image = ImageLoader::from_bytes(bytes, max_size)?;

        let detections = detector.detect(&image)?;
        let response = ResultFormatter::format_detections(&detections);

        tracing::info!(
            "Detection completed: {}x{}, boxes={}, vehicles={}, cyclists={}, time={:.3}s",
            image.width(),
            image.height(),
            response.detected_classes.len(),
            response.vehicles,
            response.cyclists,
            start_time.elapsed().as_secs_f32()
        );

        Ok(response)
    }
}
