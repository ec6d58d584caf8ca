use std::{fmt, path::PathBuf, time::Duration};

use clap::Parser;

use crate::{
    errors::{DashboardError, Result},
    model::DetectorConfig,
    source::{InputMode, SourceRequest, UploadedFile, UrlFetcher},
    DashboardSession,
};

/// Minimum confidence a detection must reach to be reported.
///
/// Mirrors the sidebar slider: `[0.1, 1.0]` in steps of `0.05`, default `0.3`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct DetectionThreshold(f32);

impl DetectionThreshold {
    pub const MIN: f32 = 0.1;
    pub const MAX: f32 = 1.0;
    pub const STEP: f32 = 0.05;
    pub const DEFAULT: f32 = 0.3;

    pub fn new(value: f32) -> Result<Self> {
        if !value.is_finite() || value < Self::MIN - 1e-6 || value > Self::MAX + 1e-6 {
            return Err(DashboardError::Validation {
                field: "confidence".to_string(),
                reason: format!(
                    "must be between {} and {} (got {})",
                    Self::MIN,
                    Self::MAX,
                    value
                ),
            });
        }

        let steps = (value - Self::MIN) / Self::STEP;
        if (steps - steps.round()).abs() > 1e-3 {
            return Err(DashboardError::Validation {
                field: "confidence".to_string(),
                reason: format!("must be a multiple of {} (got {})", Self::STEP, value),
            });
        }

        // snap onto the slider grid so 0.30000001 and 0.3 compare equal
        let snapped = ((Self::MIN + steps.round() * Self::STEP) * 100.0).round() / 100.0;
        Ok(Self(snapped.clamp(Self::MIN, Self::MAX)))
    }

    pub const fn value(self) -> f32 {
        self.0
    }

    /// Whether a score passes this threshold.
    pub fn admits(self, confidence: f32) -> bool {
        confidence >= self.0
    }
}

impl Default for DetectionThreshold {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

impl fmt::Display for DetectionThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

#[derive(Parser, Clone, Debug)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Where the images come from
    #[arg(long, value_enum, default_value_t = InputMode::Upload)]
    pub mode: InputMode,

    /// Image file to upload (repeatable); used in `upload` mode
    #[arg(long = "upload", value_name = "FILE")]
    pub uploads: Vec<PathBuf>,

    /// Folder to scan for .jpg/.jpeg/.png images; used in `folder` mode
    #[arg(long, default_value = "")]
    pub folder: String,

    /// Image URL to fetch; used in `url` mode
    #[arg(long, default_value = "")]
    pub url: String,

    /// Confidence threshold (0.1 - 1.0, step 0.05)
    #[arg(short, long, default_value_t = DetectionThreshold::DEFAULT, value_parser = check_threshold)]
    pub confidence: f32,

    #[arg(short, long, default_value = "best.onnx")]
    pub model_path: PathBuf,

    /// Label file with one class name per line; overrides the model metadata
    #[arg(long)]
    pub labels: Option<PathBuf>,

    #[arg(short, long, default_value_t = 0)]
    pub device_id: i32,

    #[arg(long, default_value_t = 0.7)]
    pub iou_threshold: f32,

    #[arg(long, default_value_t = 300)]
    pub max_detections: usize,

    /// TrueType font for label tags on annotated images
    #[arg(long)]
    pub font: Option<PathBuf>,

    /// Directory the terminal dashboard writes images into
    #[arg(short, long, default_value = "output")]
    pub output_dir: PathBuf,

    #[arg(long, default_value_t = 30)]
    pub fetch_timeout_secs: u64,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Config {
    pub fn threshold(&self) -> Result<DetectionThreshold> {
        DetectionThreshold::new(self.confidence)
    }

    /// Reads the widget values into a session for one pipeline run.
    ///
    /// Upload paths are only recorded here; reading them is per item at
    /// resolve time.
    pub fn session(&self) -> Result<DashboardSession> {
        let source = match self.mode {
            InputMode::Upload => SourceRequest::Upload(
                self.uploads
                    .iter()
                    .map(UploadedFile::from_path)
                    .collect(),
            ),
            InputMode::Folder => SourceRequest::Folder(PathBuf::from(&self.folder)),
            InputMode::Url => SourceRequest::Url(self.url.clone()),
        };

        Ok(DashboardSession {
            threshold: self.threshold()?,
            source,
        })
    }

    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            model_path: self.model_path.clone(),
            labels_path: self.labels.clone(),
            font_path: self.font.clone(),
            device_id: self.device_id,
            iou_threshold: self.iou_threshold,
            max_detections: self.max_detections,
        }
    }

    pub fn fetcher(&self) -> UrlFetcher {
        UrlFetcher::new(Duration::from_secs(self.fetch_timeout_secs))
    }

    pub const fn log_level(&self) -> tracing::Level {
        match self.verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}

fn check_threshold(s: &str) -> std::result::Result<f32, String> {
    let value: f32 = s
        .parse()
        .map_err(|_| format!("{} is not a number", s))?;
    DetectionThreshold::new(value)
        .map(DetectionThreshold::value)
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_accepts_slider_values() {
        for value in [0.1, 0.15, 0.3, 0.55, 1.0] {
            let threshold = DetectionThreshold::new(value).unwrap();
            assert!((threshold.value() - value).abs() < 1e-6);
        }
    }

    #[test]
    fn test_threshold_rejects_out_of_range_and_off_grid() {
        for value in [0.05, 1.05, 0.33, f32::NAN] {
            assert!(DetectionThreshold::new(value).is_err(), "{value} accepted");
        }
    }

    #[test]
    fn test_threshold_default_and_admits() {
        let threshold = DetectionThreshold::default();
        assert_eq!(threshold.to_string(), "0.30");
        assert!(threshold.admits(0.3));
        assert!(!threshold.admits(0.29));

        let strict = DetectionThreshold::new(1.0).unwrap();
        assert!(!strict.admits(0.999));
    }

    #[test]
    fn test_cli_parsing_builds_folder_session() {
        let config =
            Config::try_parse_from(["parasite-detect", "--mode", "folder", "--folder", "/tmp/x", "-c", "0.45"])
                .unwrap();
        let session = config.session().unwrap();

        assert_eq!(session.source.mode(), InputMode::Folder);
        assert!((session.threshold.value() - 0.45).abs() < 1e-6);
    }

    #[test]
    fn test_cli_rejects_bad_threshold() {
        let parsed = Config::try_parse_from(["parasite-detect", "-c", "0.02"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_upload_session_defers_reading_files() {
        let config = Config::try_parse_from([
            "parasite-detect",
            "--upload",
            "slide.png",
            "--upload",
            "/definitely/not/here.png",
        ])
        .unwrap();

        let session = config.session().unwrap();
        assert_eq!(
            session.source,
            SourceRequest::Upload(vec![
                UploadedFile::from_path("slide.png"),
                UploadedFile::from_path("/definitely/not/here.png"),
            ])
        );
    }
}
