use std::path::PathBuf;
use thiserror::Error;

/// Structured error types for the detection dashboard.
///
/// Each variant carries the context of the stage it came from (intake,
/// inference, rendering), so a banner can name the image and the reason
/// without the caller parsing strings.
#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Validation error: {field} {reason}")]
    Validation { field: String, reason: String },

    #[error("Filesystem error: {operation} failed for {path:?}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot decode {name} as an image: {source}")]
    Decode {
        name: String,
        #[source]
        source: image::ImageError,
    },

    #[error("path not found: {path:?}")]
    PathNotFound { path: PathBuf },

    #[error("cannot fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("inference failed for {image}: {source}")]
    Inference {
        image: String,
        #[source]
        source: Box<DashboardError>,
    },

    #[error("Model error: {operation} failed: {source}")]
    Model {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Render error: {operation} failed: {source}")]
    Render {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

pub type Result<T> = std::result::Result<T, DashboardError>;

impl DashboardError {
    pub fn model<E>(operation: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Model {
            operation: operation.into(),
            source: Box::new(source),
        }
    }

    pub fn render<E>(operation: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Render {
            operation: operation.into(),
            source: Box::new(source),
        }
    }
}

/// Errors from `anyhow`-returning helpers become configuration errors.
impl From<anyhow::Error> for DashboardError {
    fn from(err: anyhow::Error) -> Self {
        Self::Configuration {
            message: err.to_string(),
        }
    }
}

/// Fallback for I/O errors raised without a known path.
///
/// Code that knows the path and operation should build
/// `DashboardError::FileSystem` directly.
impl From<std::io::Error> for DashboardError {
    fn from(err: std::io::Error) -> Self {
        Self::FileSystem {
            path: PathBuf::from("unknown"),
            operation: "unknown".to_string(),
            source: err,
        }
    }
}

impl From<image::ImageError> for DashboardError {
    fn from(err: image::ImageError) -> Self {
        Self::Decode {
            name: "unknown".to_string(),
            source: err,
        }
    }
}

impl From<ort::Error> for DashboardError {
    fn from(err: ort::Error) -> Self {
        Self::model("ort operation", err)
    }
}

/// Tensor shape mismatches happen while reading model outputs, so they are
/// reported as model errors.
impl From<ndarray::ShapeError> for DashboardError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::model("tensor shape conversion", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inference_error_names_image_and_cause() {
        let err = DashboardError::Inference {
            image: "egg_01.png".to_string(),
            source: Box::new(DashboardError::Validation {
                field: "raster".to_string(),
                reason: "is empty".to_string(),
            }),
        };

        let message = err.to_string();
        assert!(message.contains("egg_01.png"));
        assert!(message.contains("raster is empty"));
    }

    #[test]
    fn test_io_error_conversion_uses_placeholder_path() {
        let err: DashboardError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        match err {
            DashboardError::FileSystem { path, .. } => assert_eq!(path, PathBuf::from("unknown")),
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
