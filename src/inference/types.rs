use crate::models::{Bucket, Detection, VehicleLabel};
use serde::{Deserialize, Serialize};

/// `/predict` 响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResponse {
    /// 0 = vehicle, 1 = cyclist
    pub prediction: u8,
}

/// `/detect-yolo` 响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResponse {
    pub vehicles: usize,
    pub cyclists: usize,
    /// 全部检测类别（含不属于任何分组的类别），顺序与检测框一致
    pub detected_classes: Vec<String>,
}

/// 结果格式化器
pub struct ResultFormatter;

impl ResultFormatter {
    pub fn format_classification(probability: f32) -> ClassificationResponse {
        ClassificationResponse {
            prediction: VehicleLabel::from_probability(probability).as_u8(),
        }
    }

    pub fn format_detections(detections: &[Detection]) -> DetectionResponse {
        Self::format_class_names(detections.iter().map(|d| d.class_name.clone()).collect())
    }

    /// 按类别名统计 vehicle / cyclist 数量
    pub fn format_class_names(detected_classes: Vec<String>) -> DetectionResponse {
        let (mut vehicles, mut cyclists) = (0, 0);
        for name in &detected_classes {
            match Bucket::from_class_name(name) {
                Bucket::Vehicle => vehicles += 1,
                Bucket::Cyclist => cyclists += 1,
                Bucket::Other => {}
            }
        }

        DetectionResponse {
            vehicles,
            cyclists,
            detected_classes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn mixed_detections_are_tallied() {
        let response = ResultFormatter::format_class_names(names(&["car", "person", "bicycle"]));
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"vehicles": 1, "cyclists": 1, "detected_classes": ["car", "person", "bicycle"]})
        );
    }

    #[test]
    fn empty_detections_serialize_to_zero_counts() {
        let response = ResultFormatter::format_detections(&[]);
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"vehicles": 0, "cyclists": 0, "detected_classes": []})
        );
    }

    #[test]
    fn counts_never_exceed_detections() {
        let cases = [
            names(&["car", "truck", "bus", "motorcycle", "bicycle"]),
            names(&["person", "dog", "traffic light"]),
            names(&["bus", "bus", "stop sign", "motorcycle"]),
        ];
        for classes in cases {
            let total = classes.len();
            let all_tracked = classes
                .iter()
                .all(|c| Bucket::from_class_name(c) != Bucket::Other);
            let response = ResultFormatter::format_class_names(classes);

            assert!(response.vehicles + response.cyclists <= total);
            assert_eq!(response.vehicles + response.cyclists == total, all_tracked);
        }
    }

    #[test]
    fn classification_threshold_boundary() {
        assert_eq!(ResultFormatter::format_classification(0.5).prediction, 0);
        assert_eq!(ResultFormatter::format_classification(0.51).prediction, 1);
        assert_eq!(
            serde_json::to_value(ResultFormatter::format_classification(0.9)).unwrap(),
            json!({"prediction": 1})
        );
    }
}
