use anyhow::{anyhow, Context, Result};
use std::path::Path;

/// Class names of the 80-class COCO vocabulary used by the stock
/// pretrained YOLOv8 weights.
pub const COCO_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus",
    "train", "truck", "boat", "traffic light", "fire hydrant", "stop sign",
    "parking meter", "bench", "bird", "cat", "dog", "horse",
    "sheep", "cow", "elephant", "bear", "zebra", "giraffe",
    "backpack", "umbrella", "handbag", "tie", "suitcase", "frisbee",
    "skis", "snowboard", "sports ball", "kite", "baseball bat", "baseball glove",
    "skateboard", "surfboard", "tennis racket", "bottle", "wine glass", "cup",
    "fork", "knife", "spoon", "bowl", "banana", "apple",
    "sandwich", "orange", "broccoli", "carrot", "hot dog", "pizza",
    "donut", "cake", "chair", "couch", "potted plant", "bed",
    "dining table", "toilet", "tv", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink",
    "refrigerator", "book", "clock", "vase", "scissors", "teddy bear",
    "hair drier", "toothbrush",
];

pub fn coco_labels() -> Vec<String> {
    COCO_CLASSES.iter().map(|s| s.to_string()).collect()
}

/// Read one class name per line. Blank lines and `#` comments are skipped.
pub fn parse_labels(raw: &str) -> Result<Vec<String>> {
    let labels: Vec<String> = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect();
    if labels.is_empty() {
        return Err(anyhow!("label list is empty"));
    }
    Ok(labels)
}

pub fn load_labels(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read labels file {}", path.display()))?;
    parse_labels(&raw).with_context(|| format!("invalid labels file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_labels_skipping_comments() {
        let labels = parse_labels("# waste classes\nplastic-bottle\n\n  metal-can \nbattery\n").unwrap();
        assert_eq!(labels, vec!["plastic-bottle", "metal-can", "battery"]);
        assert!(parse_labels("# nothing\n\n").is_err());
    }

    #[test]
    fn coco_contains_waste_relevant_classes() {
        let labels = coco_labels();
        assert_eq!(labels[39], "bottle");
        assert_eq!(labels[67], "cell phone");
    }
}
