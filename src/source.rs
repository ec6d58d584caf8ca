use std::{
    io::Read,
    path::{Path, PathBuf},
    time::Duration,
};

use image::RgbImage;
use tracing::{debug, warn};
use url::Url;
use walkdir::WalkDir;

use crate::errors::{DashboardError, Result};

/// Extensions the folder scan picks up, compared case-insensitively.
pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Name given to a fetched image whose URL has no usable path segment.
pub const URL_IMAGE_NAME: &str = "URL Image";

const DEFAULT_MAX_BODY_BYTES: u64 = 50 * 1024 * 1024;

/// An RGB raster and the name it is shown under.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedImage {
    name: String,
    pixels: RgbImage,
}

impl NamedImage {
    pub fn new(name: impl Into<String>, pixels: RgbImage) -> Self {
        Self {
            name: name.into(),
            pixels,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }
}

/// Which intake strategy the session uses.
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Upload,
    Folder,
    Url,
}

/// One entry of the upload widget.
///
/// Files on disk are read when the request is resolved, so an unreadable file
/// fails on its own instead of failing the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadedFile {
    Bytes { name: String, bytes: Vec<u8> },
    Path(PathBuf),
}

impl UploadedFile {
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self::Bytes {
            name: name.into(),
            bytes,
        }
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    /// Name the upload is shown under: the file name for paths.
    pub fn name(&self) -> String {
        match self {
            Self::Bytes { name, .. } => name.clone(),
            Self::Path(path) => file_display_name(path),
        }
    }

    fn contents(&self) -> Result<Vec<u8>> {
        match self {
            Self::Bytes { bytes, .. } => Ok(bytes.clone()),
            Self::Path(path) => std::fs::read(path).map_err(|e| DashboardError::FileSystem {
                path: path.clone(),
                operation: "read uploaded file".to_string(),
                source: e,
            }),
        }
    }
}

/// Mode together with its parameters; exactly one strategy is active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRequest {
    Upload(Vec<UploadedFile>),
    Folder(PathBuf),
    Url(String),
}

impl SourceRequest {
    pub const fn mode(&self) -> InputMode {
        match self {
            SourceRequest::Upload(_) => InputMode::Upload,
            SourceRequest::Folder(_) => InputMode::Folder,
            SourceRequest::Url(_) => InputMode::Url,
        }
    }
}

/// What one intake attempt produced.
///
/// `failures` holds the items that could not become images (one per bad
/// upload or folder file, at most one for a URL); `notices` are informational
/// lines for the page.
#[derive(Debug, Default)]
pub struct Resolution {
    pub images: Vec<NamedImage>,
    pub failures: Vec<DashboardError>,
    pub notices: Vec<String>,
}

impl Resolution {
    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.failures.is_empty()
    }
}

/// Blocking HTTP GET for URL mode: no auth, no custom headers, no retry.
#[derive(Clone)]
pub struct UrlFetcher {
    agent: ureq::Agent,
    max_body_bytes: u64,
}

impl Default for UrlFetcher {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl UrlFetcher {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .build();
        Self {
            agent,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub const fn with_max_body_bytes(mut self, max_body_bytes: u64) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// Fetches `url` and returns the response body.
    pub fn fetch(&self, url: &Url) -> Result<Vec<u8>> {
        let fetch_error = |source: Box<dyn std::error::Error + Send + Sync>| DashboardError::Fetch {
            url: url.to_string(),
            source,
        };

        let response = self
            .agent
            .get(url.as_str())
            .call()
            .map_err(|e| fetch_error(Box::new(e)))?;

        let mut body = Vec::new();
        response
            .into_reader()
            .take(self.max_body_bytes.saturating_add(1))
            .read_to_end(&mut body)
            .map_err(|e| fetch_error(Box::new(e)))?;
        if body.len() as u64 > self.max_body_bytes {
            return Err(fetch_error(
                format!("body exceeds {} bytes", self.max_body_bytes).into(),
            ));
        }
        Ok(body)
    }
}

/// Turns a [`SourceRequest`] into named RGB images.
#[derive(Clone, Default)]
pub struct SourceResolver {
    fetcher: UrlFetcher,
}

impl SourceResolver {
    pub const fn new(fetcher: UrlFetcher) -> Self {
        Self { fetcher }
    }

    pub fn resolve(&self, request: &SourceRequest) -> Resolution {
        match request {
            SourceRequest::Upload(files) => resolve_uploads(files),
            SourceRequest::Folder(path) => resolve_folder(path),
            SourceRequest::Url(url) => self.resolve_url(url),
        }
    }

    /// The whole URL attempt succeeds or fails as one unit.
    fn resolve_url(&self, raw: &str) -> Resolution {
        let raw = raw.trim();
        if raw.is_empty() {
            return Resolution::default();
        }

        let mut resolution = Resolution::default();
        match self.fetch_image(raw) {
            Ok(image) => resolution.images.push(image),
            Err(e) => {
                warn!("URL intake failed: {e}");
                resolution.failures.push(e);
            }
        }
        resolution
    }

    fn fetch_image(&self, raw: &str) -> Result<NamedImage> {
        let url = Url::parse(raw).map_err(|e| DashboardError::Fetch {
            url: raw.to_string(),
            source: Box::new(e),
        })?;
        let bytes = self.fetcher.fetch(&url)?;
        debug!(url = %url, bytes = bytes.len(), "fetched image");

        let name = url_image_name(&url);
        let pixels = decode(&name, &bytes)?;
        Ok(NamedImage::new(name, pixels))
    }
}

/// Decodes encoded image bytes into an RGB raster.
pub fn decode(name: &str, bytes: &[u8]) -> Result<RgbImage> {
    image::load_from_memory(bytes)
        .map(|image| image.into_rgb8())
        .map_err(|e| DashboardError::Decode {
            name: name.to_string(),
            source: e,
        })
}

pub fn is_supported_image_format(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
}

fn resolve_uploads(files: &[UploadedFile]) -> Resolution {
    let mut resolution = Resolution::default();
    for file in files {
        let name = file.name();
        match file.contents().and_then(|bytes| decode(&name, &bytes)) {
            Ok(pixels) => resolution.images.push(NamedImage::new(name, pixels)),
            Err(e) => {
                warn!("skipping upload {name}: {e}");
                resolution.failures.push(e);
            }
        }
    }
    resolution
}

fn file_display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// A missing folder is not an error on the page: it just yields nothing.
fn resolve_folder(path: &Path) -> Resolution {
    if path.as_os_str().is_empty() {
        return Resolution::default();
    }

    let files = match list_image_files(path) {
        Ok(files) => files,
        Err(e) => {
            debug!("folder intake yields nothing: {e}");
            return Resolution::default();
        }
    };

    let mut resolution = Resolution {
        notices: vec![format!("Found {} images in folder", files.len())],
        ..Resolution::default()
    };

    for file in files {
        let name = file_display_name(&file);

        let decoded = std::fs::read(&file)
            .map_err(|e| DashboardError::FileSystem {
                path: file.clone(),
                operation: "read image file".to_string(),
                source: e,
            })
            .and_then(|bytes| decode(&name, &bytes));

        match decoded {
            Ok(pixels) => resolution.images.push(NamedImage::new(name, pixels)),
            Err(e) => {
                warn!("skipping {}: {e}", file.display());
                resolution.failures.push(e);
            }
        }
    }
    resolution
}

/// Direct children of `dir` with a supported image extension, sorted by name.
pub fn list_image_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(DashboardError::PathNotFound {
            path: dir.to_path_buf(),
        });
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        match entry {
            Ok(entry) if entry.file_type().is_file() => {
                if is_supported_image_format(entry.path()) {
                    files.push(entry.into_path());
                }
            }
            Ok(_) => {}
            Err(e) => warn!("skipping folder entry: {e}"),
        }
    }
    Ok(files)
}

fn url_image_name(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            urlencoding::decode(segment)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| segment.to_string())
        })
        .unwrap_or_else(|| URL_IMAGE_NAME.to_string())
}
