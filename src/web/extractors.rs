use crate::utils::error::InferenceError;
use crate::web::AppState;
use axum::{
    async_trait,
    body::Bytes,
    extract::{multipart::MultipartError, FromRequest, Multipart, Request},
    http::StatusCode,
};

/// 上传图像所在的 multipart 字段名
pub const IMAGE_FIELD: &str = "image";

/// 从 multipart 表单中提取 `image` 字段
///
/// 不检查字段的 Content-Type，格式由解码器判断。
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub data: Bytes,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
}

#[async_trait]
impl FromRequest<AppState> for ImageUpload {
    type Rejection = InferenceError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let max_size = state.config.server_config.max_request_size;

        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| InferenceError::InvalidInput(format!("Expected multipart form data: {}", e)))?;

        while let Some(mut field) = multipart
            .next_field()
            .await
            .map_err(|e| read_error(e, max_size, "Failed to read multipart field"))?
        {
            let field_name = field.name().unwrap_or("unknown").to_string();
            if field_name != IMAGE_FIELD {
                tracing::debug!("Ignoring unknown field: {}", field_name);
                continue;
            }

            let content_type = field.content_type().map(|s| s.to_string());
            let file_name = field.file_name().map(|s| s.to_string());

            let mut data = Vec::new();
            while let Some(chunk) = field
                .chunk()
                .await
                .map_err(|e| read_error(e, max_size, "Failed to read file data"))?
            {
                data.extend_from_slice(&chunk);
                if data.len() > max_size {
                    return Err(InferenceError::FileTooLarge(data.len(), max_size));
                }
            }

            if data.is_empty() {
                return Err(InferenceError::InvalidInput("Empty file".to_string()));
            }

            tracing::debug!(
                "Received image {:?} ({:?}): {} bytes",
                file_name,
                content_type,
                data.len()
            );
            return Ok(ImageUpload {
                data: Bytes::from(data),
                file_name,
                content_type,
            });
        }

        Err(InferenceError::InvalidInput(format!(
            "No '{}' file provided",
            IMAGE_FIELD
        )))
    }
}

/// 请求体超过 DefaultBodyLimit 时 multipart 读取失败，状态码为 413
fn read_error(err: MultipartError, max_size: usize, context: &str) -> InferenceError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        InferenceError::RequestTooLarge(max_size)
    } else {
        InferenceError::InvalidInput(format!("{}: {}", context, err))
    }
}
