use image::RgbImage;
use tracing::debug;

use crate::{
    config::DetectionThreshold,
    errors::{DashboardError, Result},
    source::NamedImage,
    traits::ObjectDetector,
};

/// One detected object as the page shows it.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub class_id: usize,
    pub label: String,
    pub confidence: f32,
}

/// What the adapter extracted from a prediction.
#[derive(Debug, Clone)]
pub struct Inferred {
    pub annotated: RgbImage,
    pub detections: Vec<Detection>,
}

/// Calls the injected detector and maps its output into page terms.
pub struct InferenceAdapter<D: ObjectDetector> {
    detector: D,
}

impl<D: ObjectDetector> InferenceAdapter<D> {
    pub const fn new(detector: D) -> Self {
        Self { detector }
    }

    pub const fn detector(&self) -> &D {
        &self.detector
    }

    /// Runs the detector on an already preprocessed image.
    ///
    /// Any detector failure comes back as `DashboardError::Inference` naming
    /// the image.
    pub fn infer(&self, image: &NamedImage, threshold: DetectionThreshold) -> Result<Inferred> {
        let prediction = self
            .detector
            .predict(image.pixels(), threshold)
            .map_err(|e| DashboardError::Inference {
                image: image.name().to_string(),
                source: Box::new(e),
            })?;

        let detections: Vec<Detection> = prediction
            .boxes
            .iter()
            .map(|b| Detection {
                class_id: b.class_id,
                label: prediction.names.label(b.class_id),
                confidence: b.confidence,
            })
            .collect();
        debug!(
            image = image.name(),
            detections = detections.len(),
            "inference finished"
        );

        Ok(Inferred {
            annotated: prediction.annotated,
            detections,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::MockDetector;
    use image::RgbImage;

    fn egg_image() -> NamedImage {
        NamedImage::new("slide_01.png", RgbImage::new(640, 640))
    }

    #[test]
    fn test_maps_labels_and_keeps_order() -> Result<()> {
        let adapter = InferenceAdapter::new(MockDetector::parasite_eggs());
        let inferred = adapter.infer(&egg_image(), DetectionThreshold::default())?;

        let labels: Vec<_> = inferred.detections.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, ["Ascaris lumbricoides", "Trichuris trichiura"]);
        assert_eq!(inferred.annotated.dimensions(), (640, 640));
        Ok(())
    }

    #[test]
    fn test_strict_threshold_yields_no_detections() -> Result<()> {
        let adapter = InferenceAdapter::new(MockDetector::parasite_eggs());
        let inferred = adapter.infer(&egg_image(), DetectionThreshold::new(1.0)?)?;
        assert!(inferred.detections.is_empty());
        Ok(())
    }

    #[test]
    fn test_detector_failure_names_image() {
        let adapter = InferenceAdapter::new(MockDetector::failing("session poisoned"));
        let err = adapter
            .infer(&egg_image(), DetectionThreshold::default())
            .unwrap_err();

        assert!(matches!(&err, DashboardError::Inference { image, .. } if image == "slide_01.png"));
        assert!(err.to_string().contains("session poisoned"));
    }
}
