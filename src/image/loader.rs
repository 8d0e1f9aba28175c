use crate::utils::error::InferenceError;
use crate::Result;
use image::{DynamicImage, GenericImageView, ImageFormat, RgbImage};

pub struct ImageLoader;

impl ImageLoader {
    /// 从字节流解码为RGB图像，不做缩放
    pub fn from_bytes(bytes: &[u8], max_size: usize) -> Result<RgbImage> {
        if bytes.is_empty() {
            return Err(InferenceError::InvalidInput("Empty image data".to_string()));
        }

        if bytes.len() > max_size {
            return Err(InferenceError::FileTooLarge(bytes.len(), max_size));
        }

        if let Some(format) = Self::detect_format(bytes) {
            tracing::debug!(
                "Decoding {:?} image ({} bytes, supported={})",
                format,
                bytes.len(),
                Self::is_supported_format(format)
            );
        }

        let image = image::load_from_memory(bytes)?;
        Self::validate_dimensions(&image)?;

        Ok(image.to_rgb8())
    }

    /// 检测图像格式
    pub fn detect_format(bytes: &[u8]) -> Option<ImageFormat> {
        image::guess_format(bytes).ok()
    }

    /// 验证图像格式是否在常用格式列表中
    pub fn is_supported_format(format: ImageFormat) -> bool {
        matches!(
            format,
            ImageFormat::Png
                | ImageFormat::Jpeg
                | ImageFormat::Bmp
                | ImageFormat::Tiff
                | ImageFormat::WebP
                | ImageFormat::Gif
        )
    }

    /// 验证图像尺寸
    pub fn validate_dimensions(image: &DynamicImage) -> Result<()> {
        let (width, height) = image.dimensions();

        if width == 0 || height == 0 {
            return Err(InferenceError::InvalidInput(format!(
                "Invalid image dimensions: {}x{}",
                width, height
            )));
        }

        Ok(())
    }
}
