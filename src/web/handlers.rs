use crate::{
    inference::{ClassificationResponse, DetectionResponse, InferencePipeline},
    utils::error::InferenceError,
    web::{extractors::ImageUpload, AppState},
    Result,
};
use axum::{extract::State, response::Json};
use std::time::{Duration, Instant};

/// 分类处理器：`POST /predict`
pub async fn predict_handler(
    State(state): State<AppState>,
    upload: Result<ImageUpload>,
) -> Result<Json<ClassificationResponse>> {
    let start_time = Instant::now();

    // 模型不可用时优先返回 ModelUnavailable，与上传内容无关
    state.models.classifier()?;
    let upload = upload?;
    let request_id = uuid::Uuid::new_v4().to_string();

    tracing::info!(
        "Processing classification request: request_id={}, file={:?}, bytes={}",
        request_id,
        upload.file_name,
        upload.data.len()
    );

    let max_size = state.config.server_config.max_request_size;
    let models = state.models.clone();

    let response = run_blocking(&state, "Classification", move || {
        InferencePipeline::classify_bytes(&models, &upload.data, max_size)
    })
    .await?;

    tracing::info!(
        "Classification request completed: request_id={}, prediction={}, time={:.3}s",
        request_id,
        response.prediction,
        start_time.elapsed().as_secs_f32()
    );

    Ok(Json(response))
}

/// 检测处理器：`POST /detect-yolo`
pub async fn detect_handler(
    State(state): State<AppState>,
    upload: Result<ImageUpload>,
) -> Result<Json<DetectionResponse>> {
    let start_time = Instant::now();

    state.models.detector()?;
    let upload = upload?;
    let request_id = uuid::Uuid::new_v4().to_string();

    tracing::info!(
        "Processing detection request: request_id={}, file={:?}, bytes={}",
        request_id,
        upload.file_name,
        upload.data.len()
    );

    let max_size = state.config.server_config.max_request_size;
    let models = state.models.clone();

    let response = run_blocking(&state, "Detection", move || {
        InferencePipeline::detect_bytes(&models, &upload.data, max_size)
    })
    .await?;

    tracing::info!(
        "Detection request completed: request_id={}, vehicles={}, cyclists={}, time={:.3}s",
        request_id,
        response.vehicles,
        response.cyclists,
        start_time.elapsed().as_secs_f32()
    );

    Ok(Json(response))
}

/// 推理是同步 CPU 计算，放到阻塞线程池，并受 request_timeout 限制
async fn run_blocking<T, F>(state: &AppState, task: &str, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let limit = state.config.server_config.request_timeout;

    tokio::time::timeout(Duration::from_secs(limit), tokio::task::spawn_blocking(f))
        .await
        .map_err(|_| {
            tracing::warn!("{} task exceeded {}s", task, limit);
            InferenceError::Timeout(limit)
        })?
        .map_err(|e| InferenceError::Internal(format!("{} task failed: {}", task, e)))?
}
