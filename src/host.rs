use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use image::ImageFormat;
use indicatif::{ProgressBar, ProgressStyle};

use crate::{
    errors::{DashboardError, Result},
    render::{ImageRole, RenderDirective},
    traits::RenderHost,
};

/// Keeps every directive in memory, in order.
#[derive(Debug, Default)]
pub struct RecordingHost {
    pub directives: Vec<RenderDirective>,
}

impl RecordingHost {
    pub fn infos(&self) -> Vec<&str> {
        self.texts(|d| match d {
            RenderDirective::Info(text) => Some(text),
            _ => None,
        })
    }

    pub fn warnings(&self) -> Vec<&str> {
        self.texts(|d| match d {
            RenderDirective::Warning(text) => Some(text),
            _ => None,
        })
    }

    pub fn errors(&self) -> Vec<&str> {
        self.texts(|d| match d {
            RenderDirective::Error(text) => Some(text),
            _ => None,
        })
    }

    pub fn captions(&self, role: ImageRole) -> Vec<&str> {
        self.texts(|d| match d {
            RenderDirective::Image {
                role: r, caption, ..
            } if *r == role => Some(caption),
            _ => None,
        })
    }

    /// `(label, confidence)` of every detection card.
    pub fn cards(&self) -> Vec<(&str, &str)> {
        self.directives
            .iter()
            .filter_map(|d| match d {
                RenderDirective::DetectionCard { label, confidence } => {
                    Some((label.as_str(), confidence.as_str()))
                }
                _ => None,
            })
            .collect()
    }

    fn texts<'a>(&'a self, pick: impl Fn(&'a RenderDirective) -> Option<&'a String>) -> Vec<&'a str> {
        self.directives
            .iter()
            .filter_map(pick)
            .map(String::as_str)
            .collect()
    }
}

impl RenderHost for RecordingHost {
    fn render(&mut self, directive: RenderDirective) -> Result<()> {
        self.directives.push(directive);
        Ok(())
    }
}

/// Prints the page to stdout and writes each image into `output_dir`.
pub struct TerminalHost {
    output_dir: PathBuf,
    image_count: usize,
    progress: Option<ProgressBar>,
}

impl TerminalHost {
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir).map_err(|e| DashboardError::FileSystem {
            path: output_dir.clone(),
            operation: "create output directory".to_string(),
            source: e,
        })?;

        Ok(Self {
            output_dir,
            image_count: 0,
            progress: None,
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn line(&self, text: &str) -> Result<()> {
        match &self.progress {
            Some(pb) => {
                pb.println(text);
                Ok(())
            }
            None => writeln!(io::stdout(), "{text}")
                .map_err(|e| DashboardError::render("write to stdout", e)),
        }
    }

    fn save(&mut self, role: ImageRole, caption: &str, raster: &image::RgbImage) -> Result<PathBuf> {
        self.image_count += 1;
        let suffix = match role {
            ImageRole::Original => "original",
            ImageRole::Annotated => "result",
        };
        let file_name = format!(
            "{:03}_{}_{}.png",
            self.image_count,
            sanitize(caption),
            suffix
        );
        let path = self.output_dir.join(file_name);
        raster
            .save_with_format(&path, ImageFormat::Png)
            .map_err(|e| DashboardError::render(format!("save {}", path.display()), e))?;
        Ok(path)
    }
}

impl RenderHost for TerminalHost {
    fn render(&mut self, directive: RenderDirective) -> Result<()> {
        match directive {
            RenderDirective::Subheader(text) => self.line(&format!("\n== {text} ==")),
            RenderDirective::Image {
                role,
                caption,
                raster,
            } => {
                let path = self.save(role, &caption, &raster)?;
                self.line(&format!("[image] {caption} -> {}", path.display()))
            }
            RenderDirective::DetectionCard { label, confidence } => {
                self.line(&format!("  found: {label}  confidence: {confidence}"))
            }
            RenderDirective::Info(text) => self.line(&format!("[info] {text}")),
            RenderDirective::Warning(text) => self.line(&format!("[warning] {text}")),
            RenderDirective::Error(text) => self.line(&format!("[error] {text}")),
        }
    }

    fn begin_batch(&mut self, len: usize) {
        let pb = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
        ) {
            pb.set_style(style.progress_chars("#>-"));
        }
        self.progress = Some(pb);
    }

    fn finish_item(&mut self) {
        if let Some(pb) = &self.progress {
            pb.inc(1);
        }
    }

    fn end_batch(&mut self) {
        if let Some(pb) = self.progress.take() {
            pb.finish_and_clear();
        }
    }
}

/// File-name-safe rendition of a caption.
fn sanitize(caption: &str) -> String {
    let cleaned: String = caption
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_matches('_');
    if cleaned.is_empty() {
        "image".to_string()
    } else {
        cleaned.chars().take(64).collect()
    }
}
