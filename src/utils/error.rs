use crate::models::ModelKind;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("{0} model not loaded")]
    ModelUnavailable(ModelKind),

    #[error("Image decode error: {0}")]
    ImageDecode(#[from] image::ImageError),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("File too large: {0} bytes, max allowed: {1} bytes")]
    FileTooLarge(usize, usize),

    #[error("Request body too large, max allowed: {0} bytes")]
    RequestTooLarge(usize),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ORT error: {0}")]
    Ort(#[from] ort::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl InferenceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            InferenceError::ImageDecode(_) => StatusCode::BAD_REQUEST,
            InferenceError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            InferenceError::FileTooLarge(_, _) => StatusCode::PAYLOAD_TOO_LARGE,
            InferenceError::RequestTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            InferenceError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            InferenceError::ModelLoad(_) => StatusCode::SERVICE_UNAVAILABLE,
            InferenceError::ModelUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            InferenceError::ModelLoad(_) => "MODEL_LOAD_ERROR",
            InferenceError::ModelUnavailable(_) => "MODEL_UNAVAILABLE",
            InferenceError::ImageDecode(_) => "IMAGE_DECODE_ERROR",
            InferenceError::Inference(_) => "INFERENCE_ERROR",
            InferenceError::InvalidInput(_) => "INVALID_INPUT",
            InferenceError::FileTooLarge(_, _) => "FILE_TOO_LARGE",
            InferenceError::RequestTooLarge(_) => "REQUEST_TOO_LARGE",
            InferenceError::Timeout(_) => "TIMEOUT",
            InferenceError::Config(_) => "CONFIG_ERROR",
            InferenceError::Io(_) => "IO_ERROR",
            InferenceError::Ort(_) => "ORT_ERROR",
            InferenceError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for InferenceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // 前端只读取 error 字段，响应体保持扁平
        let error_response = serde_json::json!({
            "error": self.to_string(),
        });

        if status.is_server_error() {
            tracing::error!("Request failed: {} ({}, {})", self, self.error_code(), status);
        } else {
            tracing::warn!("Request rejected: {} ({}, {})", self, self.error_code(), status);
        }

        (status, axum::Json(error_response)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detector_unavailable_message_matches_dashboard_contract() {
        let err = InferenceError::ModelUnavailable(ModelKind::Detector);
        assert_eq!(err.to_string(), "YOLO model not loaded");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn classifier_unavailable_uses_same_kind() {
        let err = InferenceError::ModelUnavailable(ModelKind::Classifier);
        assert_eq!(err.to_string(), "Classifier model not loaded");
        assert_eq!(err.error_code(), "MODEL_UNAVAILABLE");
    }

    #[test]
    fn client_errors_map_to_4xx() {
        assert_eq!(
            InferenceError::InvalidInput("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            InferenceError::FileTooLarge(10, 5).status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            InferenceError::RequestTooLarge(5).status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            InferenceError::Timeout(60).status_code(),
            StatusCode::REQUEST_TIMEOUT
        );
    }
}
