pub mod annotate;
pub mod config;
pub mod errors;
pub mod host;
pub mod inference;
pub mod labels;
pub mod model;
pub mod preprocess;
pub mod render;
pub mod source;
pub mod traits;

pub mod mocks;

use tracing::{debug, info, warn};

pub use config::{Config, DetectionThreshold};
pub use errors::{DashboardError, Result};
pub use host::{RecordingHost, TerminalHost};
pub use inference::{Detection, InferenceAdapter};
pub use labels::LabelMap;
pub use model::{DetectorConfig, OnnxDetector};
pub use render::{DetectionBatchResult, ImageOutcome, ImageRole, RenderDirective};
pub use source::{
    InputMode, NamedImage, Resolution, SourceRequest, SourceResolver, UploadedFile, UrlFetcher,
};
pub use traits::*;

#[cfg(test)]
pub use mocks::*;

/// Values the user set for one run of the page.
#[derive(Debug, Clone)]
pub struct DashboardSession {
    pub threshold: DetectionThreshold,
    pub source: SourceRequest,
}

/// The whole page: intake, preprocessing, inference and rendering.
///
/// The detector is handed in once and only read afterwards; every `run` is an
/// independent, blocking pass over the images the session resolves to.
pub struct Dashboard<D: ObjectDetector> {
    resolver: SourceResolver,
    adapter: InferenceAdapter<D>,
}

impl<D: ObjectDetector> Dashboard<D> {
    pub const fn new(detector: D, resolver: SourceResolver) -> Self {
        Self {
            resolver,
            adapter: InferenceAdapter::new(detector),
        }
    }

    pub const fn detector(&self) -> &D {
        self.adapter.detector()
    }

    /// Resolves the session's images and renders one result per image.
    ///
    /// Images are handled one after another; a failing image is rendered as
    /// an error notice and the batch goes on.
    pub fn run<H: RenderHost + ?Sized>(
        &self,
        session: &DashboardSession,
        host: &mut H,
    ) -> Vec<DetectionBatchResult> {
        let mode = session.source.mode();
        let resolution = self.resolver.resolve(&session.source);
        info!(
            ?mode,
            images = resolution.images.len(),
            failures = resolution.failures.len(),
            threshold = %session.threshold,
            "resolved input"
        );

        render::render_resolution(mode, &resolution, host);
        render::emit(
            host,
            RenderDirective::Subheader(render::RESULTS_HEADING.to_string()),
        );

        if resolution.images.is_empty() {
            render::emit(host, RenderDirective::Info(render::EMPTY_PAGE_HINT.to_string()));
            return Vec::new();
        }

        host.begin_batch(resolution.images.len());
        let mut results = Vec::with_capacity(resolution.images.len());
        for image in resolution.images {
            let result = self.analyze(image, session.threshold);
            render::render_result(&result, host);
            host.finish_item();
            results.push(result);
        }
        host.end_batch();

        results
    }

    /// Preprocess then infer one image, folding any failure into the outcome.
    pub fn analyze(&self, image: NamedImage, threshold: DetectionThreshold) -> DetectionBatchResult {
        let preprocessed = preprocess::preprocess(&image);
        debug!(
            image = image.name(),
            from = ?image.dimensions(),
            to = ?preprocessed.dimensions(),
            "preprocessed"
        );

        let outcome = match self.adapter.infer(&preprocessed, threshold) {
            Ok(inferred) if inferred.detections.is_empty() => ImageOutcome::Empty,
            Ok(inferred) => ImageOutcome::Detected {
                annotated: inferred.annotated,
                detections: inferred.detections,
            },
            Err(e) => {
                warn!("{e}");
                ImageOutcome::Failed(e)
            }
        };

        DetectionBatchResult { image, outcome }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn upload_session(threshold: f32) -> DashboardSession {
        DashboardSession {
            threshold: DetectionThreshold::new(threshold).unwrap(),
            source: SourceRequest::Upload(vec![]),
        }
    }

    #[test]
    fn test_analyze_detected_empty_failed() {
        let image = NamedImage::new("slide.png", RgbImage::from_pixel(64, 48, Rgb([9, 9, 9])));

        let dashboard = Dashboard::new(MockDetector::parasite_eggs(), SourceResolver::default());
        assert_eq!(dashboard.detector().input_size(), preprocess::TARGET_SIZE);
        let detected = dashboard.analyze(image.clone(), DetectionThreshold::default());
        assert_eq!(detected.detections().len(), 2);
        assert_eq!(detected.image.dimensions(), (64, 48));

        let empty = dashboard.analyze(image.clone(), DetectionThreshold::new(1.0).unwrap());
        assert!(matches!(empty.outcome, ImageOutcome::Empty));

        let failing = Dashboard::new(MockDetector::failing("boom"), SourceResolver::default());
        assert!(failing.analyze(image, DetectionThreshold::default()).is_failed());
    }

    #[test]
    fn test_empty_session_shows_hint() {
        let dashboard = Dashboard::new(MockDetector::parasite_eggs(), SourceResolver::default());
        let mut host = RecordingHost::default();

        let results = dashboard.run(&upload_session(0.3), &mut host);

        assert!(results.is_empty());
        assert_eq!(host.infos(), [render::EMPTY_PAGE_HINT]);
    }
}
