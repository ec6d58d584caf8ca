use image::RgbImage;

use crate::annotate::Annotator;
use crate::config::DetectionThreshold;
use crate::errors::{DashboardError, Result};
use crate::labels::LabelMap;
use crate::preprocess::TARGET_SIZE;
use crate::traits::{DetectedBox, ObjectDetector, Prediction};

/// Detector stand-in that reports a fixed set of boxes for every raster.
#[derive(Clone)]
pub struct MockDetector {
    pub boxes: Vec<DetectedBox>,
    pub names: LabelMap,
    /// When set, every `predict` call fails with this message.
    pub failure: Option<String>,
    /// Images whose top-left pixel equals this color make `predict` fail.
    pub poison_pixel: Option<[u8; 3]>,
    annotator: Annotator,
}

impl MockDetector {
    pub fn new(boxes: Vec<DetectedBox>, names: LabelMap) -> Self {
        Self {
            boxes,
            names,
            failure: None,
            poison_pixel: None,
            annotator: Annotator::default(),
        }
    }

    /// Two eggs of different species, both below certainty.
    pub fn parasite_eggs() -> Self {
        let names: LabelMap = [
            (0, "Ascaris lumbricoides"),
            (1, "Trichuris trichiura"),
            (2, "Hookworm"),
        ]
        .into_iter()
        .collect();

        Self::new(
            vec![
                DetectedBox {
                    class_id: 0,
                    confidence: 0.873,
                    bbox: [100.0, 120.0, 220.0, 260.0],
                },
                DetectedBox {
                    class_id: 1,
                    confidence: 0.41,
                    bbox: [400.0, 380.0, 470.0, 450.0],
                },
            ],
            names,
        )
    }

    /// A detector that never finds anything.
    pub fn empty() -> Self {
        Self::new(Vec::new(), LabelMap::new())
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::empty()
        }
    }

    pub fn with_poison_pixel(mut self, color: [u8; 3]) -> Self {
        self.poison_pixel = Some(color);
        self
    }
}

impl ObjectDetector for MockDetector {
    fn predict(&self, raster: &RgbImage, threshold: DetectionThreshold) -> Result<Prediction> {
        let poisoned = self
            .poison_pixel
            .is_some_and(|color| raster.width() > 0 && raster.get_pixel(0, 0).0 == color);
        if let Some(message) = self.failure.clone().or_else(|| {
            poisoned.then(|| "poisoned raster".to_string())
        }) {
            return Err(DashboardError::Model {
                operation: "mock predict".to_string(),
                source: message.into(),
            });
        }

        let boxes: Vec<DetectedBox> = self
            .boxes
            .iter()
            .filter(|b| threshold.admits(b.confidence))
            .cloned()
            .collect();
        let annotated = self.annotator.annotate(raster, &boxes, &self.names);

        Ok(Prediction {
            boxes,
            names: self.names.clone(),
            annotated,
        })
    }

    fn input_size(&self) -> u32 {
        TARGET_SIZE
    }
}
