use anyhow::Result;
use image::RgbImage;

use crate::detect::result::DetectionResult;

/// Object detector backend.
///
/// Backends receive a decoded RGB image and report labelled detections in
/// original-image pixel coordinates. Labels come from the backend's own
/// vocabulary; mapping them to waste categories happens downstream.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Class names the backend can emit.
    fn labels(&self) -> &[String];

    /// Run detection, dropping results below `min_confidence`.
    fn detect(&mut self, image: &RgbImage, min_confidence: f32) -> Result<Vec<DetectionResult>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
