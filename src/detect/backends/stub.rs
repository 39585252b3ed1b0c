use anyhow::Result;
use image::RgbImage;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, DetectionResult};

/// Canned detection with a box in normalized `0..1` image coordinates.
#[derive(Clone, Debug)]
pub struct StubDetection {
    pub label: String,
    pub confidence: f32,
    /// `[x, y, width, height]`, normalized.
    pub rel_box: [f32; 4],
}

impl StubDetection {
    pub fn new(label: &str, confidence: f32, rel_box: [f32; 4]) -> Self {
        Self {
            label: label.to_string(),
            confidence,
            rel_box,
        }
    }
}

/// Stub backend for testing and for running without a model.
///
/// Reports the same canned detections for every image, scaled to the
/// image size. It never inspects pixels.
pub struct StubBackend {
    detections: Vec<StubDetection>,
    labels: Vec<String>,
}

impl StubBackend {
    pub fn new(detections: Vec<StubDetection>) -> Self {
        let mut labels: Vec<String> = Vec::new();
        for det in &detections {
            if !labels.contains(&det.label) {
                labels.push(det.label.clone());
            }
        }
        Self { detections, labels }
    }

    /// A backend that never detects anything.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new(vec![StubDetection::new(
            "bottle",
            0.82,
            [0.25, 0.2, 0.5, 0.6],
        )])
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn detect(&mut self, image: &RgbImage, min_confidence: f32) -> Result<Vec<DetectionResult>> {
        let w = image.width() as f32;
        let h = image.height() as f32;
        Ok(self
            .detections
            .iter()
            .filter(|det| det.confidence >= min_confidence)
            .map(|det| {
                let [x, y, bw, bh] = det.rel_box;
                DetectionResult::new(det.label.clone(), det.confidence).with_box(BoundingBox {
                    x: x * w,
                    y: y * h,
                    width: bw * w,
                    height: bh * h,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_scales_boxes_and_filters_confidence() {
        let mut backend = StubBackend::new(vec![
            StubDetection::new("bottle", 0.9, [0.5, 0.5, 0.25, 0.5]),
            StubDetection::new("cup", 0.2, [0.0, 0.0, 1.0, 1.0]),
        ]);
        let image = RgbImage::new(200, 100);

        let all = backend.detect(&image, 0.0).unwrap();
        assert_eq!(all.len(), 2);
        let bbox = all[0].bounding_box.unwrap();
        assert_eq!(bbox.x, 100.0);
        assert_eq!(bbox.y, 50.0);
        assert_eq!(bbox.width, 50.0);
        assert_eq!(bbox.height, 50.0);

        let confident = backend.detect(&image, 0.3).unwrap();
        assert_eq!(confident.len(), 1);
        assert_eq!(confident[0].label, "bottle");
        assert_eq!(backend.labels().to_vec(), vec!["bottle".to_string(), "cup".to_string()]);
    }
}
