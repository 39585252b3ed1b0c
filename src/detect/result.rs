use serde::Serialize;

/// Axis-aligned box in original-image pixels, top-left origin.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    /// Build from corner coordinates (`x1, y1, x2, y2`).
    pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
        }
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection over union of two boxes.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - intersection;
        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}

/// One labelled object reported by a detector.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectionResult {
    pub label: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
    pub bounding_box: Option<BoundingBox>,
}

impl DetectionResult {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence: confidence.clamp(0.0, 1.0),
            bounding_box: None,
        }
    }

    pub fn with_box(mut self, bounding_box: BoundingBox) -> Self {
        self.bounding_box = Some(bounding_box);
        self
    }
}

/// Highest-confidence detection; the earliest one wins ties.
pub fn best_detection(detections: &[DetectionResult]) -> Option<&DetectionResult> {
    detections
        .iter()
        .fold(None, |best: Option<&DetectionResult>, det| match best {
            Some(b) if b.confidence >= det.confidence => Some(b),
            _ => Some(det),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn best_detection_prefers_first_on_ties() {
        let dets = vec![
            DetectionResult::new("cup", 0.4),
            DetectionResult::new("bottle", 0.9),
            DetectionResult::new("can", 0.9),
        ];
        assert_eq!(best_detection(&dets).unwrap().label, "bottle");
        assert!(best_detection(&[]).is_none());
    }

    #[test]
    fn confidence_is_clamped() {
        assert_eq!(DetectionResult::new("x", 1.7).confidence, 1.0);
        assert_eq!(DetectionResult::new("x", -0.2).confidence, 0.0);
    }

    #[test]
    fn iou_of_overlapping_boxes() {
        let a = BoundingBox::from_corners(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::from_corners(5.0, 0.0, 15.0, 10.0);
        let iou = a.iou(&b);
        assert!((iou - 50.0 / 150.0).abs() < 1e-6);
        let far = BoundingBox::from_corners(20.0, 20.0, 30.0, 30.0);
        assert_eq!(a.iou(&far), 0.0);
    }
}
