use image::RgbImage;
use tracing::warn;

use crate::{
    errors::DashboardError,
    inference::Detection,
    source::{InputMode, NamedImage, Resolution},
    traits::RenderHost,
};

pub const RESULTS_HEADING: &str = "Detection results";
pub const EMPTY_PAGE_HINT: &str =
    "Upload an image, enter a folder path, or enter an image URL to start detection";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageRole {
    /// The image as it was resolved, before inference.
    Original,
    /// The detector's raster with boxes drawn on it.
    Annotated,
}

/// A single thing for the host to put on the page.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderDirective {
    Subheader(String),
    Image {
        role: ImageRole,
        caption: String,
        raster: RgbImage,
    },
    DetectionCard {
        label: String,
        confidence: String,
    },
    Info(String),
    Warning(String),
    Error(String),
}

/// How one image ended up.
#[derive(Debug)]
pub enum ImageOutcome {
    /// At least one detection; `detections` is never empty.
    Detected {
        annotated: RgbImage,
        detections: Vec<Detection>,
    },
    Empty,
    Failed(DashboardError),
}

/// The result for one image of the batch.
#[derive(Debug)]
pub struct DetectionBatchResult {
    pub image: NamedImage,
    pub outcome: ImageOutcome,
}

impl DetectionBatchResult {
    pub fn detections(&self) -> &[Detection] {
        match &self.outcome {
            ImageOutcome::Detected { detections, .. } => detections.as_slice(),
            _ => &[],
        }
    }

    pub const fn is_failed(&self) -> bool {
        matches!(self.outcome, ImageOutcome::Failed(_))
    }
}

/// Confidence as a percentage with two decimals: `0.873` becomes `87.30%`.
pub fn format_confidence(confidence: f32) -> String {
    format!("{:.2}%", f64::from(confidence) * 100.0)
}

fn preview_caption(mode: InputMode, name: &str) -> String {
    match mode {
        InputMode::Upload => format!("Original: {name}"),
        InputMode::Folder => format!("From folder: {name}"),
        InputMode::Url => format!("From URL: {name}"),
    }
}

/// Sends a directive, logging instead of failing when the host cannot show it.
pub fn emit<H: RenderHost + ?Sized>(host: &mut H, directive: RenderDirective) {
    if let Err(e) = host.render(directive) {
        warn!("render host rejected a directive: {e}");
    }
}

/// Intake side of the page: notices, intake failures and one preview per
/// resolved image.
pub fn render_resolution<H: RenderHost + ?Sized>(
    mode: InputMode,
    resolution: &Resolution,
    host: &mut H,
) {
    for notice in &resolution.notices {
        emit(host, RenderDirective::Info(notice.clone()));
    }
    for failure in &resolution.failures {
        emit(host, RenderDirective::Error(intake_message(mode, failure)));
    }
    for image in &resolution.images {
        emit(
            host,
            RenderDirective::Image {
                role: ImageRole::Original,
                caption: preview_caption(mode, image.name()),
                raster: image.pixels().clone(),
            },
        );
    }
}

fn intake_message(mode: InputMode, failure: &DashboardError) -> String {
    match mode {
        InputMode::Url => format!("Failed to load image from URL: {failure}"),
        InputMode::Upload | InputMode::Folder => format!("Failed to load image: {failure}"),
    }
}

/// Result side of the page for one image.
pub fn render_result<H: RenderHost + ?Sized>(result: &DetectionBatchResult, host: &mut H) {
    let name = result.image.name();
    match &result.outcome {
        ImageOutcome::Detected {
            annotated,
            detections,
        } => {
            emit(
                host,
                RenderDirective::Image {
                    role: ImageRole::Annotated,
                    caption: format!("Result: {name}"),
                    raster: annotated.clone(),
                },
            );
            for detection in detections {
                emit(
                    host,
                    RenderDirective::DetectionCard {
                        label: detection.label.clone(),
                        confidence: format_confidence(detection.confidence),
                    },
                );
            }
        }
        ImageOutcome::Empty => emit(
            host,
            RenderDirective::Warning(format!("No detections in image: {name}")),
        ),
        ImageOutcome::Failed(e) => emit(
            host,
            RenderDirective::Error(format!("Failed to analyze {name}: {e}")),
        ),
    }
}
