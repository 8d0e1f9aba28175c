use crate::config::DetectorParams;
use crate::image::{ImageTransforms, LetterboxParams};
use crate::models::labels::class_name;
use crate::models::{build_session, io_names, ModelKind, ObjectDetector};
use crate::utils::error::InferenceError;
use crate::{Config, Result};
use image::RgbImage;
use ndarray::ArrayViewD;
use ort::{inputs, session::Session, value::Tensor};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

/// 单个检测框
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub class_id: usize,
    pub class_name: String,
    pub confidence: f32,
    /// [x1, y1, x2, y2]，原图像素坐标
    pub bbox: [f32; 4],
}

pub struct Detector {
    session: Arc<Mutex<Session>>,
    input_name: String,
    output_name: String,
    params: DetectorParams,
}

impl Detector {
    pub fn new(config: &Config) -> Result<Self> {
        let model_path = config.detector_model_path();
        let session = build_session(&model_path, &config.onnx_config, ModelKind::Detector)?;
        let (input_name, output_name) = io_names(&session, ModelKind::Detector)?;

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            input_name,
            output_name,
            params: config.detector_params.clone(),
        })
    }
}

impl ObjectDetector for Detector {
    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>> {
        let (input, letterbox) = ImageTransforms::letterbox(image, self.params.input_size)?;
        let input_tensor = Tensor::from_array(input)?;

        let prediction = {
            let mut session = self.session.lock();
            let outputs = session.run(inputs![self.input_name.as_str() => input_tensor])?;

            match outputs.get(&self.output_name) {
                Some(output) => output.try_extract_array::<f32>()?.into_owned(),
                None => {
                    let available_outputs: Vec<String> =
                        outputs.keys().map(|s| s.to_string()).collect();
                    return Err(InferenceError::Inference(format!(
                        "Detector output '{}' not found. Available outputs: {:?}",
                        self.output_name, available_outputs
                    )));
                }
            }
        };

        let detections = decode_predictions(&prediction.view(), &letterbox, &self.params)?;
        tracing::debug!(
            "Detector returned {} boxes for {}x{} image",
            detections.len(),
            letterbox.orig_w,
            letterbox.orig_h
        );

        Ok(detections)
    }
}

/// 解码 YOLOv8 风格输出：[1, 4 + nc, anchors] 或 [1, anchors, 4 + nc]
///
/// 每个 anchor 取最高类别分数，过滤低置信度后按类别做 NMS，
/// 结果按置信度降序排列，坐标映射回原图。
pub fn decode_predictions(
    prediction: &ArrayViewD<f32>,
    letterbox: &LetterboxParams,
    params: &DetectorParams,
) -> Result<Vec<Detection>> {
    let shape = prediction.shape();
    if shape.len() != 3 || shape[0] != 1 {
        return Err(InferenceError::Inference(format!(
            "Unsupported detector output shape: {:?}. Expected (1, features, anchors)",
            shape
        )));
    }

    if shape.iter().any(|&dim| dim == 0) {
        return Ok(Vec::new());
    }

    // 特征维（4 + nc）总是小于 anchor 数
    let features_first = shape[1] <= shape[2];
    let (num_features, num_anchors) = if features_first {
        (shape[1], shape[2])
    } else {
        (shape[2], shape[1])
    };

    if num_features < 5 {
        return Err(InferenceError::Inference(format!(
            "Detector output has too few features: {}",
            num_features
        )));
    }

    let value = |anchor: usize, feature: usize| -> f32 {
        if features_first {
            prediction[[0, feature, anchor]]
        } else {
            prediction[[0, anchor, feature]]
        }
    };

    let mut candidates = Vec::new();
    for anchor in 0..num_anchors {
        let (class_id, score) = (4..num_features)
            .map(|f| (f - 4, value(anchor, f)))
            .fold((0usize, f32::NEG_INFINITY), |best, (idx, score)| {
                if score > best.1 {
                    (idx, score)
                } else {
                    best
                }
            });

        if !score.is_finite() || score <= params.conf_threshold {
            continue;
        }

        let (cx, cy, w, h) = (
            value(anchor, 0),
            value(anchor, 1),
            value(anchor, 2),
            value(anchor, 3),
        );
        if !(cx.is_finite() && cy.is_finite() && w.is_finite() && h.is_finite()) || w <= 0.0 || h <= 0.0 {
            continue;
        }

        candidates.push(Candidate {
            class_id,
            confidence: score,
            bbox: [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
        });
    }

    let candidates_before_nms = candidates.len();
    let kept = non_max_suppression(candidates, params.iou_threshold, params.max_detections);
    tracing::debug!(
        "Detector decode: anchors={}, candidates={}, kept={}",
        num_anchors,
        candidates_before_nms,
        kept.len()
    );

    Ok(kept
        .into_iter()
        .map(|c| Detection {
            class_id: c.class_id,
            class_name: class_name(c.class_id),
            confidence: c.confidence,
            bbox: letterbox.to_original(c.bbox),
        })
        .collect())
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    class_id: usize,
    confidence: f32,
    bbox: [f32; 4],
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let inter_w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let inter_h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = inter_w * inter_h;

    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    let union = area_a + area_b - inter;

    if union > f32::EPSILON {
        inter / union
    } else {
        0.0
    }
}

/// 按类别的贪心 NMS，不同类别的框互不抑制
fn non_max_suppression(mut candidates: Vec<Candidate>, iou_threshold: f32, max_detections: usize) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut suppressed = vec![false; candidates.len()];
    let mut kept = Vec::new();

    for i in 0..candidates.len() {
        if suppressed[i] {
            continue;
        }
        kept.push(candidates[i]);
        if kept.len() >= max_detections {
            break;
        }

        for j in (i + 1)..candidates.len() {
            if suppressed[j] || candidates[j].class_id != candidates[i].class_id {
                continue;
            }
            if iou(&candidates[i].bbox, &candidates[j].bbox) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    const NUM_CLASSES: usize = 80;
    const NUM_ANCHORS: usize = 100;

    fn identity_letterbox() -> LetterboxParams {
        LetterboxParams {
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
            orig_w: 640,
            orig_h: 640,
        }
    }

    /// 构造 [1, 84, 100] 输出；每个 anchor 为 (cx, cy, w, h, class_id, score)，其余 anchor 全零
    fn output(anchors: &[(f32, f32, f32, f32, usize, f32)]) -> Array3<f32> {
        let mut out = Array3::<f32>::zeros((1, 4 + NUM_CLASSES, NUM_ANCHORS));
        for (i, &(cx, cy, w, h, class_id, score)) in anchors.iter().enumerate() {
            out[[0, 0, i]] = cx;
            out[[0, 1, i]] = cy;
            out[[0, 2, i]] = w;
            out[[0, 3, i]] = h;
            out[[0, 4 + class_id, i]] = score;
        }
        out
    }

    fn names(detections: &[Detection]) -> Vec<&str> {
        detections.iter().map(|d| d.class_name.as_str()).collect()
    }

    #[test]
    fn empty_output_yields_no_detections() {
        let out = output(&[]);
        let detections =
            decode_predictions(&out.view().into_dyn(), &identity_letterbox(), &DetectorParams::default())
                .unwrap();
        assert!(detections.is_empty());
    }

    #[test]
    fn low_confidence_anchors_are_dropped() {
        let out = output(&[(100.0, 100.0, 50.0, 50.0, 2, 0.1), (300.0, 300.0, 40.0, 40.0, 0, 0.9)]);
        let detections =
            decode_predictions(&out.view().into_dyn(), &identity_letterbox(), &DetectorParams::default())
                .unwrap();
        assert_eq!(names(&detections), vec!["person"]);
        assert_eq!(detections[0].bbox, [280.0, 280.0, 320.0, 320.0]);
    }

    #[test]
    fn score_equal_to_threshold_is_dropped() {
        let params = DetectorParams::default();
        let out = output(&[
            (100.0, 100.0, 50.0, 50.0, 2, params.conf_threshold),
            (300.0, 300.0, 40.0, 40.0, 1, params.conf_threshold + 0.01),
        ]);
        let detections =
            decode_predictions(&out.view().into_dyn(), &identity_letterbox(), &params).unwrap();
        assert_eq!(names(&detections), vec!["bicycle"]);
    }

    #[test]
    fn same_class_overlaps_are_suppressed() {
        let out = output(&[
            (100.0, 100.0, 50.0, 50.0, 2, 0.8),
            (102.0, 101.0, 50.0, 50.0, 2, 0.9),
        ]);
        let detections =
            decode_predictions(&out.view().into_dyn(), &identity_letterbox(), &DetectorParams::default())
                .unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].confidence, 0.9);
    }

    #[test]
    fn different_class_overlaps_are_kept_in_confidence_order() {
        let out = output(&[
            (100.0, 100.0, 50.0, 50.0, 0, 0.6),
            (100.0, 100.0, 50.0, 50.0, 1, 0.95),
            (400.0, 400.0, 80.0, 60.0, 2, 0.7),
        ]);
        let detections =
            decode_predictions(&out.view().into_dyn(), &identity_letterbox(), &DetectorParams::default())
                .unwrap();
        assert_eq!(names(&detections), vec!["bicycle", "car", "person"]);
    }

    #[test]
    fn transposed_layout_is_supported() {
        let out = output(&[(100.0, 100.0, 50.0, 50.0, 7, 0.9)]);
        let mut transposed = Array3::<f32>::zeros((1, NUM_ANCHORS, 4 + NUM_CLASSES));
        for f in 0..(4 + NUM_CLASSES) {
            transposed[[0, 0, f]] = out[[0, f, 0]];
        }
        let detections = decode_predictions(
            &transposed.view().into_dyn(),
            &identity_letterbox(),
            &DetectorParams::default(),
        )
        .unwrap();
        assert_eq!(names(&detections), vec!["truck"]);
    }

    #[test]
    fn max_detections_caps_output() {
        let anchors: Vec<_> = (0..10)
            .map(|i| (20.0 + 60.0 * i as f32, 50.0, 40.0, 40.0, 2, 0.5 + i as f32 * 0.01))
            .collect();
        let out = output(&anchors);
        let params = DetectorParams {
            max_detections: 3,
            ..DetectorParams::default()
        };
        let detections =
            decode_predictions(&out.view().into_dyn(), &identity_letterbox(), &params).unwrap();
        assert_eq!(detections.len(), 3);
        assert!(detections.windows(2).all(|w| w[0].confidence >= w[1].confidence));
    }

    #[test]
    fn boxes_are_mapped_back_through_letterbox() {
        let letterbox = LetterboxParams {
            scale: 0.5,
            pad_x: 0.0,
            pad_y: 160.0,
            orig_w: 1280,
            orig_h: 640,
        };
        let out = output(&[(200.0, 300.0, 100.0, 100.0, 5, 0.9)]);
        let detections =
            decode_predictions(&out.view().into_dyn(), &letterbox, &DetectorParams::default()).unwrap();
        assert_eq!(detections[0].class_name, "bus");
        assert_eq!(detections[0].bbox, [300.0, 180.0, 500.0, 380.0]);
    }

    #[test]
    fn zero_anchor_output_is_empty() {
        let out = Array3::<f32>::zeros((1, 4 + NUM_CLASSES, 0));
        let detections =
            decode_predictions(&out.view().into_dyn(), &identity_letterbox(), &DetectorParams::default())
                .unwrap();
        assert!(detections.is_empty());
    }

    #[test]
    fn rejects_unexpected_shapes() {
        let out = ndarray::Array2::<f32>::zeros((84, 10));
        assert!(decode_predictions(
            &out.view().into_dyn(),
            &identity_letterbox(),
            &DetectorParams::default()
        )
        .is_err());
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        assert_eq!(iou(&[0.0, 0.0, 1.0, 1.0], &[2.0, 2.0, 3.0, 3.0]), 0.0);
        assert!((iou(&[0.0, 0.0, 2.0, 2.0], &[1.0, 0.0, 3.0, 2.0]) - 1.0 / 3.0).abs() < 1e-6);
    }
}
