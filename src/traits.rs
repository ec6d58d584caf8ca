use image::RgbImage;

use crate::{config::DetectionThreshold, errors::Result, labels::LabelMap, render::RenderDirective};

/// One box reported by a detector, in pixel coordinates of the raster it was
/// given: `[x_min, y_min, x_max, y_max]`.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedBox {
    pub class_id: usize,
    pub confidence: f32,
    pub bbox: [f32; 4],
}

/// Everything a detector hands back for one raster.
#[derive(Debug, Clone)]
pub struct Prediction {
    /// Boxes at or above the requested threshold, in the detector's order.
    pub boxes: Vec<DetectedBox>,
    pub names: LabelMap,
    /// The input raster with the boxes drawn on it.
    pub annotated: RgbImage,
}

/// A pretrained object detector treated as a black box.
///
/// Implementations are constructed once and shared read-only by every run,
/// hence `&self` and `Send + Sync`.
pub trait ObjectDetector: Send + Sync {
    /// Runs detection on `raster`, keeping boxes whose confidence is at least
    /// `threshold`.
    fn predict(&self, raster: &RgbImage, threshold: DetectionThreshold) -> Result<Prediction>;

    /// Square input resolution the model was trained at.
    fn input_size(&self) -> u32;
}

/// The page the dashboard draws on.
///
/// The host owns presentation; the pipeline only pushes directives at it.
pub trait RenderHost {
    fn render(&mut self, directive: RenderDirective) -> Result<()>;

    /// Called before the per-image results of a batch of `len` images.
    fn begin_batch(&mut self, _len: usize) {}

    /// Called after each image of the batch has been rendered.
    fn finish_item(&mut self) {}

    fn end_batch(&mut self) {}
}
