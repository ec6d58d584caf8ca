use std::path::{Path, PathBuf};

use image::{imageops, imageops::FilterType, RgbImage};
use ndarray::prelude::*;
use nshare::AsNdarray3;
use ort::value::TensorRef;
use ort::{
    execution_providers::{CUDAExecutionProvider, TensorRTExecutionProvider},
    session::{builder::SessionBuilder, Session},
};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::{
    annotate::Annotator,
    config::DetectionThreshold,
    errors::{DashboardError, Result},
    labels::LabelMap,
    preprocess::TARGET_SIZE,
    traits::{DetectedBox, ObjectDetector, Prediction},
};

/// Everything needed to bring the detector up once at startup.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub model_path: PathBuf,
    pub labels_path: Option<PathBuf>,
    pub font_path: Option<PathBuf>,
    pub device_id: i32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("best.onnx"),
            labels_path: None,
            font_path: None,
            device_id: 0,
            iou_threshold: 0.7,
            max_detections: 300,
        }
    }
}

/// YOLOv8-style detector exported to ONNX.
///
/// Expects one `[1, 3, S, S]` input in `[0, 1]` and one `[1, 4 + C, N]`
/// output of centre-x, centre-y, width, height followed by per-class scores.
pub struct OnnxDetector {
    pub image_size: u32,
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    names: LabelMap,
    annotator: Annotator,
    iou_threshold: f32,
    max_detections: usize,
}

impl OnnxDetector {
    pub fn new(config: &DetectorConfig) -> Result<Self> {
        let model_path = &config.model_path;
        if !model_path.exists() {
            return Err(DashboardError::Configuration {
                message: format!("model file {} does not exist", model_path.display()),
            });
        }

        let mut session = SessionBuilder::new()
            .map_err(|e| DashboardError::model("session builder init", e))?
            .with_execution_providers([
                TensorRTExecutionProvider::default()
                    .with_device_id(config.device_id)
                    .build(),
                CUDAExecutionProvider::default()
                    .with_device_id(config.device_id)
                    .build(),
            ])
            .map_err(|e| DashboardError::model("register execution providers", e))?
            .with_memory_pattern(true)
            .map_err(|e| DashboardError::model("enable memory pattern", e))?
            .commit_from_file(model_path)
            .map_err(|e| {
                DashboardError::model(format!("load model file {}", model_path.display()), e)
            })?;

        let input = session.inputs.first().ok_or_else(|| DashboardError::Configuration {
            message: "model has no inputs".to_string(),
        })?;
        let input_name = input.name.clone();
        // dynamic exports report -1 for the spatial axes
        let image_size = input
            .input_type
            .tensor_shape()
            .and_then(|shape| shape.get(2).copied())
            .filter(|&side| side > 0)
            .map_or(TARGET_SIZE, |side| side as u32);

        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| DashboardError::Configuration {
                message: "model has no outputs".to_string(),
            })?;

        let names = match &config.labels_path {
            Some(path) => LabelMap::from_file(path)?,
            None => read_metadata_labels(&session),
        };

        // warm up so the first user image does not pay for graph setup
        let data = Array4::<f32>::zeros((1, 3, image_size as usize, image_size as usize));
        session
            .run(ort::inputs![input_name.as_str() => TensorRef::from_array_view(&data)
                .map_err(|e| DashboardError::model("create warm-up tensor", e))?])
            .map_err(|e| DashboardError::model("warm-up run", e))?;

        let annotator = match &config.font_path {
            Some(path) => Annotator::from_font_file(path)?,
            None => Annotator::default(),
        };

        info!(
            model = %model_path.display(),
            image_size,
            classes = names.len(),
            "detector ready"
        );

        Ok(Self {
            image_size,
            session: Mutex::new(session),
            input_name,
            output_name,
            names,
            annotator,
            iou_threshold: config.iou_threshold,
            max_detections: config.max_detections,
        })
    }

    pub fn names(&self) -> &LabelMap {
        &self.names
    }

    fn run(&self, tensor: ArrayView4<f32>) -> Result<Array3<f32>> {
        let mut binding = self.session.lock();
        let outputs = binding.run(ort::inputs![
            self.input_name.as_str() => TensorRef::from_array_view(&tensor.as_standard_layout())?
        ])?;
        let output = outputs[self.output_name.as_str()]
            .try_extract_array::<f32>()?
            .into_dimensionality::<Ix3>()?
            .to_owned();
        Ok(output)
    }
}

impl ObjectDetector for OnnxDetector {
    fn predict(&self, raster: &RgbImage, threshold: DetectionThreshold) -> Result<Prediction> {
        let (width, height) = raster.dimensions();
        if width == 0 || height == 0 {
            return Err(DashboardError::Validation {
                field: "raster".to_string(),
                reason: "is empty".to_string(),
            });
        }

        let tensor = to_tensor(raster, self.image_size);
        let output = self.run(tensor.view())?;

        let scale = (
            width as f32 / self.image_size as f32,
            height as f32 / self.image_size as f32,
        );
        let boxes = decode_output(
            output.view(),
            threshold,
            self.iou_threshold,
            self.max_detections,
            scale,
        )?;
        debug!(boxes = boxes.len(), threshold = %threshold, "decoded detections");

        let annotated = self.annotator.annotate(raster, &boxes, &self.names);
        Ok(Prediction {
            boxes,
            names: self.names.clone(),
            annotated,
        })
    }

    fn input_size(&self) -> u32 {
        self.image_size
    }
}

fn read_metadata_labels(session: &Session) -> LabelMap {
    let names = session
        .metadata()
        .and_then(|metadata| metadata.custom("names"));
    match names {
        Ok(Some(text)) => LabelMap::from_metadata(&text).unwrap_or_else(|e| {
            warn!("ignoring model label metadata: {e}");
            LabelMap::new()
        }),
        Ok(None) => LabelMap::new(),
        Err(e) => {
            warn!("cannot read model metadata: {e}");
            LabelMap::new()
        }
    }
}

/// RGB raster to a `[1, 3, size, size]` tensor scaled into `[0, 1]`.
pub fn to_tensor(raster: &RgbImage, size: u32) -> Array4<f32> {
    let resized;
    let raster = if raster.dimensions() == (size, size) {
        raster
    } else {
        resized = imageops::resize(raster, size, size, FilterType::CatmullRom);
        &resized
    };

    raster
        .as_ndarray3()
        .slice_move(s![NewAxis, .., .., ..])
        .mapv(|v| f32::from(v) / 255.0)
}

/// Decodes a `[1, 4 + C, N]` output into boxes in raster pixel coordinates.
///
/// `scale` maps model-input pixels onto the raster the caller passed in.
pub fn decode_output(
    output: ArrayView3<f32>,
    threshold: DetectionThreshold,
    iou_threshold: f32,
    max_detections: usize,
    scale: (f32, f32),
) -> Result<Vec<DetectedBox>> {
    let shape = output.shape();
    if shape[0] != 1 || shape[1] <= 4 {
        return Err(DashboardError::Model {
            operation: "decode detector output".to_string(),
            source: format!("expected [1, 4 + classes, boxes], got {shape:?}").into(),
        });
    }

    let num_classes = shape[1] - 4;
    let num_boxes = shape[2];
    let (scale_x, scale_y) = scale;

    let mut candidates = Vec::new();
    for i in 0..num_boxes {
        let (class_id, confidence) = (0..num_classes)
            .map(|c| (c, output[[0, 4 + c, i]]))
            .fold((0, f32::NEG_INFINITY), |best, cur| {
                if cur.1 > best.1 {
                    cur
                } else {
                    best
                }
            });

        if !threshold.admits(confidence) {
            continue;
        }

        let cx = output[[0, 0, i]];
        let cy = output[[0, 1, i]];
        let w = output[[0, 2, i]];
        let h = output[[0, 3, i]];

        candidates.push(DetectedBox {
            class_id,
            confidence,
            bbox: [
                (cx - w / 2.0) * scale_x,
                (cy - h / 2.0) * scale_y,
                (cx + w / 2.0) * scale_x,
                (cy + h / 2.0) * scale_y,
            ],
        });
    }

    let mut kept = nms(candidates, iou_threshold);
    kept.truncate(max_detections);
    Ok(kept)
}

/// Per-class non-maximum suppression; the result is sorted by confidence,
/// highest first.
pub fn nms(mut boxes: Vec<DetectedBox>, iou_threshold: f32) -> Vec<DetectedBox> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<DetectedBox> = Vec::with_capacity(boxes.len());
    for candidate in boxes {
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id && iou(&k.bbox, &candidate.bbox) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    let union = area_a + area_b - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

/// Loads the detector named by `config`; the single place the process
/// touches the model file.
pub fn load_detector(config: &DetectorConfig) -> Result<OnnxDetector> {
    check_model_path(&config.model_path)?;
    OnnxDetector::new(config)
}

fn check_model_path(path: &Path) -> Result<()> {
    let is_onnx = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("onnx"));
    if !is_onnx {
        return Err(DashboardError::Validation {
            field: "model path".to_string(),
            reason: format!("{} is not an .onnx file", path.display()),
        });
    }
    Ok(())
}
