use crate::image::ImageTransforms;
use crate::models::{build_session, io_names, ImageClassifier, ModelKind};
use crate::utils::error::InferenceError;
use crate::{Config, Result};
use image::RgbImage;
use ndarray::ArrayViewD;
use ort::{inputs, session::Session, value::Tensor};
use parking_lot::Mutex;
use std::sync::Arc;

/// 分类器输入边长
pub const CLASSIFIER_INPUT_SIZE: u32 = 224;

/// 概率严格大于该值才判为 cyclist
pub const CYCLIST_THRESHOLD: f32 = 0.5;

/// 分类结果标签
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleLabel {
    Vehicle = 0,
    Cyclist = 1,
}

impl VehicleLabel {
    pub fn from_probability(probability: f32) -> Self {
        if probability > CYCLIST_THRESHOLD {
            VehicleLabel::Cyclist
        } else {
            VehicleLabel::Vehicle
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

pub struct Classifier {
    session: Arc<Mutex<Session>>,
    input_name: String,
    output_name: String,
    input_size: u32,
}

impl Classifier {
    pub fn new(config: &Config) -> Result<Self> {
        let model_path = config.classifier_model_path();
        let session = build_session(&model_path, &config.onnx_config, ModelKind::Classifier)?;
        let (input_name, output_name) = io_names(&session, ModelKind::Classifier)?;

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            input_name,
            output_name,
            input_size: CLASSIFIER_INPUT_SIZE,
        })
    }

    /// 拉伸到 224x224 并转为 NCHW [0,1] 张量
    fn preprocess(&self, image: &RgbImage) -> ndarray::Array4<f32> {
        let resized = ImageTransforms::resize_exact(image, self.input_size, self.input_size);
        ImageTransforms::to_nchw_tensor(&resized)
    }
}

impl ImageClassifier for Classifier {
    fn predict_probability(&self, image: &RgbImage) -> Result<f32> {
        let input_tensor = Tensor::from_array(self.preprocess(image))?;

        let prediction = {
            let mut session = self.session.lock();
            let outputs = session.run(inputs![self.input_name.as_str() => input_tensor])?;

            match outputs.get(&self.output_name) {
                Some(output) => output.try_extract_array::<f32>()?.into_owned(),
                None => {
                    let available_outputs: Vec<String> =
                        outputs.keys().map(|s| s.to_string()).collect();
                    return Err(InferenceError::Inference(format!(
                        "Classifier output '{}' not found. Available outputs: {:?}",
                        self.output_name, available_outputs
                    )));
                }
            }
        };

        parse_probability(&prediction.view())
    }
}

/// 模型输出为 [1, 1] 或 [1] 的 sigmoid 概率
pub fn parse_probability(prediction: &ArrayViewD<f32>) -> Result<f32> {
    if prediction.len() != 1 {
        return Err(InferenceError::Inference(format!(
            "Expected a single classifier output, got shape {:?}",
            prediction.shape()
        )));
    }

    let probability = prediction.iter().copied().next().unwrap_or(f32::NAN);
    if !probability.is_finite() {
        return Err(InferenceError::Inference(
            "Classifier produced a non-finite output".to_string(),
        ));
    }

    Ok(probability.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2, Array2};

    #[test]
    fn threshold_is_strict() {
        assert_eq!(VehicleLabel::from_probability(0.5), VehicleLabel::Vehicle);
        assert_eq!(VehicleLabel::from_probability(0.500_001), VehicleLabel::Cyclist);
        assert_eq!(VehicleLabel::from_probability(0.0), VehicleLabel::Vehicle);
        assert_eq!(VehicleLabel::from_probability(1.0), VehicleLabel::Cyclist);
    }

    #[test]
    fn labels_serialize_as_wire_values() {
        assert_eq!(VehicleLabel::Vehicle.as_u8(), 0);
        assert_eq!(VehicleLabel::Cyclist.as_u8(), 1);
    }

    #[test]
    fn parses_single_value_outputs() {
        let out = arr2(&[[0.73_f32]]).into_dyn();
        assert_eq!(parse_probability(&out.view()).unwrap(), 0.73);

        let out = arr1(&[0.1_f32]).into_dyn();
        assert_eq!(parse_probability(&out.view()).unwrap(), 0.1);
    }

    #[test]
    fn rejects_unexpected_outputs() {
        let out = Array2::<f32>::zeros((1, 2)).into_dyn();
        assert!(parse_probability(&out.view()).is_err());

        let out = arr1(&[f32::NAN]).into_dyn();
        assert!(matches!(
            parse_probability(&out.view()),
            Err(InferenceError::Inference(_))
        ));
    }
}
