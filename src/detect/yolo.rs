//! YOLOv8 output decoding and non-maximum suppression.
//!
//! A YOLOv8 detection head produces one tensor shaped
//! `[1, 4 + num_classes, num_anchors]`. For every anchor the first four
//! rows hold the box centre and size in model-input pixels, the
//! remaining rows hold per-class scores (already sigmoid-activated).

use anyhow::{anyhow, Result};

use crate::detect::result::{BoundingBox, DetectionResult};

pub const DEFAULT_IOU_THRESHOLD: f32 = 0.45;

/// Geometry needed to map model-space boxes back to the source image.
#[derive(Clone, Copy, Debug)]
pub struct YoloGeometry {
    pub input_width: u32,
    pub input_height: u32,
    pub image_width: u32,
    pub image_height: u32,
}

#[derive(Clone, Debug)]
struct Candidate {
    class_id: usize,
    score: f32,
    bbox: BoundingBox,
}

/// Decode a raw YOLOv8 output buffer into detections.
///
/// `output` is the flattened `[4 + num_classes, num_anchors]` tensor.
pub fn decode_output(
    output: &[f32],
    num_anchors: usize,
    labels: &[String],
    geometry: YoloGeometry,
    min_confidence: f32,
    iou_threshold: f32,
) -> Result<Vec<DetectionResult>> {
    if num_anchors == 0 || output.len() % num_anchors != 0 {
        return Err(anyhow!(
            "output of {} values does not divide into {} anchors",
            output.len(),
            num_anchors
        ));
    }
    let num_attrs = output.len() / num_anchors;
    if num_attrs <= 4 {
        return Err(anyhow!("output has no class scores ({} rows)", num_attrs));
    }
    let num_classes = num_attrs - 4;

    let scale_x = geometry.image_width as f32 / geometry.input_width as f32;
    let scale_y = geometry.image_height as f32 / geometry.input_height as f32;
    let max_x = geometry.image_width as f32;
    let max_y = geometry.image_height as f32;
    let at = |row: usize, anchor: usize| output[row * num_anchors + anchor];

    let mut candidates = Vec::new();
    for anchor in 0..num_anchors {
        let mut class_id = 0usize;
        let mut score = f32::NEG_INFINITY;
        for class in 0..num_classes {
            let s = at(4 + class, anchor);
            if s > score {
                score = s;
                class_id = class;
            }
        }
        if !score.is_finite() || score < min_confidence {
            continue;
        }

        let cx = at(0, anchor);
        let cy = at(1, anchor);
        let w = at(2, anchor);
        let h = at(3, anchor);
        let x1 = ((cx - w / 2.0) * scale_x).clamp(0.0, max_x);
        let y1 = ((cy - h / 2.0) * scale_y).clamp(0.0, max_y);
        let x2 = ((cx + w / 2.0) * scale_x).clamp(0.0, max_x);
        let y2 = ((cy + h / 2.0) * scale_y).clamp(0.0, max_y);
        if x2 <= x1 || y2 <= y1 {
            continue;
        }

        candidates.push(Candidate {
            class_id,
            score,
            bbox: BoundingBox::from_corners(x1, y1, x2, y2),
        });
    }

    Ok(nms(candidates, iou_threshold)
        .into_iter()
        .map(|c| {
            let label = labels
                .get(c.class_id)
                .cloned()
                .unwrap_or_else(|| format!("class_{}", c.class_id));
            DetectionResult::new(label, c.score).with_box(c.bbox)
        })
        .collect())
}

/// Class-wise non-maximum suppression, highest score first.
fn nms(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id && k.bbox.iou(&candidate.bbox) >= iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}
