pub mod extractors;
pub mod handlers;
pub mod middleware;

use crate::utils::error::InferenceError;
use crate::{models::ModelManager, Config, Result};
use axum::{
    extract::{DefaultBodyLimit, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

/// 图像字段之外允许的 multipart 边界和字段头开销
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// 处理器共享状态（只读）
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub models: Arc<ModelManager>,
}

impl AppState {
    pub fn new(models: Arc<ModelManager>) -> Self {
        Self {
            config: models.config().clone(),
            models,
        }
    }
}

pub async fn serve(config: Config) -> Result<()> {
    // 模型在监听端口之前加载，且只加载一次
    let models = ModelManager::init(config.clone())?;

    let app = create_app(AppState::new(models));

    let addr: SocketAddr = config.bind_addr.parse().map_err(|e| {
        InferenceError::Config(format!("Invalid bind address {}: {}", config.bind_addr, e))
    })?;

    tracing::info!("Server starting on http://{}", addr);
    tracing::info!("API endpoints:");
    tracing::info!("  POST /predict     - Vehicle/cyclist classification");
    tracing::info!("  POST /detect-yolo - YOLO detection with vehicle/cyclist counts");
    tracing::info!("  GET  /health      - Health check");
    tracing::info!("  GET  /api/info    - Service information");

    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        InferenceError::Internal(format!("Failed to bind to address {}: {}", addr, e))
    })?;

    axum::serve(listener, app)
        .await
        .map_err(|e| InferenceError::Internal(format!("Server failed to start: {}", e)))?;

    Ok(())
}

pub fn create_app(state: AppState) -> Router {
    // 超限在 ImageUpload 中转成 JSON 错误，且发生在模型检查之后
    let body_limit = state.config.server_config.max_request_size + MULTIPART_OVERHEAD;

    Router::new()
        .route("/predict", post(handlers::predict_handler))
        .route("/detect-yolo", post(handlers::detect_handler))
        .route("/health", get(health_handler))
        .route("/api/info", get(info_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(axum::middleware::from_fn(middleware::request_logging))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// 健康检查端点
async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "classifier_loaded": state.models.has_classifier(),
        "detector_loaded": state.models.has_detector(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// 服务信息端点
async fn info_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "service": "Roadwise Inference Service",
        "version": env!("CARGO_PKG_VERSION"),
        "description": env!("CARGO_PKG_DESCRIPTION"),
        "models": state.models.get_stats(),
        "routes": ["/predict", "/detect-yolo", "/health", "/api/info"]
    }))
}
