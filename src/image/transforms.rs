use crate::utils::error::InferenceError;
use crate::Result;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;

/// letterbox 填充值（与训练时一致的灰色）
pub const LETTERBOX_FILL: f32 = 114.0 / 255.0;

/// letterbox 变换参数，用于把模型坐标映射回原图
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxParams {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub orig_w: u32,
    pub orig_h: u32,
}

impl LetterboxParams {
    /// 模型输入坐标系中的 [x1, y1, x2, y2] -> 原图像素坐标（裁剪到图像范围内）
    pub fn to_original(&self, bbox: [f32; 4]) -> [f32; 4] {
        let w = self.orig_w as f32;
        let h = self.orig_h as f32;
        [
            ((bbox[0] - self.pad_x) / self.scale).clamp(0.0, w),
            ((bbox[1] - self.pad_y) / self.scale).clamp(0.0, h),
            ((bbox[2] - self.pad_x) / self.scale).clamp(0.0, w),
            ((bbox[3] - self.pad_y) / self.scale).clamp(0.0, h),
        ]
    }
}

/// 图像变换工具集
pub struct ImageTransforms;

impl ImageTransforms {
    /// 拉伸到固定尺寸（不保持宽高比）
    pub fn resize_exact(image: &RgbImage, width: u32, height: u32) -> RgbImage {
        if image.dimensions() == (width, height) {
            return image.clone();
        }
        imageops::resize(image, width, height, FilterType::Triangle)
    }

    /// HWC u8 -> NCHW f32，像素值缩放到 [0, 1]
    pub fn to_nchw_tensor(image: &RgbImage) -> Array4<f32> {
        let (width, height) = image.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

        for (x, y, pixel) in image.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
            }
        }

        tensor
    }

    /// 等比缩放并居中填充到 size x size
    pub fn letterbox(image: &RgbImage, size: u32) -> Result<(Array4<f32>, LetterboxParams)> {
        let (orig_w, orig_h) = image.dimensions();
        if orig_w == 0 || orig_h == 0 {
            return Err(InferenceError::InvalidInput(format!(
                "Invalid image dimensions: {}x{}",
                orig_w, orig_h
            )));
        }

        let scale = (size as f32 / orig_w as f32).min(size as f32 / orig_h as f32);
        let new_w = ((orig_w as f32 * scale).round() as u32).clamp(1, size);
        let new_h = ((orig_h as f32 * scale).round() as u32).clamp(1, size);

        let pad_x = (size - new_w) as f32 / 2.0;
        let pad_y = (size - new_h) as f32 / 2.0;
        let offset_x = (pad_x - 0.1).round().max(0.0) as usize;
        let offset_y = (pad_y - 0.1).round().max(0.0) as usize;

        let resized = Self::resize_exact(image, new_w, new_h);

        let size = size as usize;
        let mut tensor = Array4::<f32>::from_elem((1, 3, size, size), LETTERBOX_FILL);
        for (x, y, pixel) in resized.enumerate_pixels() {
            let (tx, ty) = (offset_x + x as usize, offset_y + y as usize);
            if tx >= size || ty >= size {
                continue;
            }
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = pixel[c] as f32 / 255.0;
            }
        }

        Ok((
            tensor,
            LetterboxParams {
                scale,
                pad_x: offset_x as f32,
                pad_y: offset_y as f32,
                orig_w,
                orig_h,
            },
        ))
    }
}
