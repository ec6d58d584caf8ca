use std::{fs, path::Path};

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
    drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
    rect::Rect,
};

use crate::{
    errors::{DashboardError, Result},
    labels::LabelMap,
    traits::DetectedBox,
};

const LABEL_FONT_SIZE: f32 = 18.0;
const LABEL_PADDING: i32 = 2;
const BOX_THICKNESS: i32 = 2;
const PALETTE_SIZE: usize = 20;

/// Draws detection boxes, and label tags when a font is available.
#[derive(Clone)]
pub struct Annotator {
    font: Option<FontArc>,
    font_scale: PxScale,
    colors: Vec<Rgb<u8>>,
}

impl Default for Annotator {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Annotator {
    pub fn new(font: Option<FontArc>) -> Self {
        let colors = (0..PALETTE_SIZE)
            .map(|i| hsv_to_rgb(i as f32 / PALETTE_SIZE as f32 * 360.0, 0.8, 0.9))
            .collect();

        Self {
            font,
            font_scale: PxScale::from(LABEL_FONT_SIZE),
            colors,
        }
    }

    pub fn from_font_file(path: &Path) -> Result<Self> {
        let data = fs::read(path).map_err(|e| DashboardError::FileSystem {
            path: path.to_path_buf(),
            operation: "read font".to_string(),
            source: e,
        })?;
        let font = FontArc::try_from_vec(data)
            .map_err(|e| DashboardError::model(format!("load font {}", path.display()), e))?;
        Ok(Self::new(Some(font)))
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    pub fn color(&self, class_id: usize) -> Rgb<u8> {
        self.colors[class_id % self.colors.len()]
    }

    /// Returns a copy of `image` with every box drawn on it.
    pub fn annotate(&self, image: &RgbImage, boxes: &[DetectedBox], names: &LabelMap) -> RgbImage {
        let mut canvas = image.clone();
        if canvas.width() == 0 || canvas.height() == 0 {
            return canvas;
        }
        for detected in boxes {
            self.draw_box(&mut canvas, detected, names);
        }
        canvas
    }

    fn draw_box(&self, canvas: &mut RgbImage, detected: &DetectedBox, names: &LabelMap) {
        let (w, h) = (canvas.width() as f32, canvas.height() as f32);
        let [x_min, y_min, x_max, y_max] = detected.bbox;

        let x_min = x_min.clamp(0.0, w - 1.0).floor() as i32;
        let y_min = y_min.clamp(0.0, h - 1.0).floor() as i32;
        let x_max = x_max.clamp(0.0, w - 1.0).ceil() as i32;
        let y_max = y_max.clamp(0.0, h - 1.0).ceil() as i32;
        if x_min >= x_max || y_min >= y_max {
            return;
        }

        let color = self.color(detected.class_id);
        for inset in 0..BOX_THICKNESS {
            let width = x_max - x_min - 2 * inset;
            let height = y_max - y_min - 2 * inset;
            if width <= 0 || height <= 0 {
                break;
            }
            let rect = Rect::at(x_min + inset, y_min + inset).of_size(width as u32, height as u32);
            draw_hollow_rect_mut(canvas, rect, color);
        }

        let Some(font) = &self.font else {
            return;
        };

        let label = format!("{} {:.2}", names.label(detected.class_id), detected.confidence);
        let (text_w, text_h) = text_size(self.font_scale, font, &label);
        let tag_h = text_h as i32 + 2 * LABEL_PADDING;
        let tag_w = (text_w as i32 + 2 * LABEL_PADDING).min(canvas.width() as i32 - x_min);
        // tag sits above the box, or inside it when the box touches the top edge
        let tag_y = if y_min >= tag_h { y_min - tag_h } else { y_min };
        if tag_w <= 0 {
            return;
        }

        let tag = Rect::at(x_min, tag_y).of_size(tag_w as u32, tag_h as u32);
        draw_filled_rect_mut(canvas, tag, color);
        draw_text_mut(
            canvas,
            Rgb([255, 255, 255]),
            x_min + LABEL_PADDING,
            tag_y + LABEL_PADDING,
            self.font_scale,
            font,
            &label,
        );
    }
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;

    let (r, g, b) = match h {
        h if h < 60.0 => (c, x, 0.0),
        h if h < 120.0 => (x, c, 0.0),
        h if h < 180.0 => (0.0, c, x),
        h if h < 240.0 => (0.0, x, c),
        h if h < 300.0 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };

    Rgb([
        ((r + m) * 255.0) as u8,
        ((g + m) * 255.0) as u8,
        ((b + m) * 255.0) as u8,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detected(class_id: usize, bbox: [f32; 4]) -> DetectedBox {
        DetectedBox {
            class_id,
            confidence: 0.9,
            bbox,
        }
    }

    #[test]
    fn test_draws_box_outline_only() {
        let annotator = Annotator::default();
        let image = RgbImage::new(100, 100);
        let boxes = [detected(0, [10.0, 10.0, 50.0, 60.0])];

        let annotated = annotator.annotate(&image, &boxes, &LabelMap::new());
        let color = annotator.color(0);

        assert_eq!(annotated.get_pixel(10, 30), &color);
        assert_eq!(annotated.get_pixel(11, 30), &color);
        assert_eq!(annotated.get_pixel(30, 30), &Rgb([0, 0, 0]));
        // source raster is untouched
        assert_eq!(image.get_pixel(10, 30), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_degenerate_and_offscreen_boxes_are_skipped() {
        let annotator = Annotator::default();
        let image = RgbImage::new(32, 32);
        let boxes = [
            detected(1, [5.0, 5.0, 5.0, 20.0]),
            detected(2, [200.0, 200.0, 300.0, 300.0]),
        ];

        let annotated = annotator.annotate(&image, &boxes, &LabelMap::new());
        assert_eq!(annotated, image);
    }

    #[test]
    fn test_empty_canvas_is_returned_unchanged() {
        let annotator = Annotator::default();
        let image = RgbImage::new(0, 0);
        let boxes = [detected(0, [0.0, 0.0, 10.0, 10.0])];

        let annotated = annotator.annotate(&image, &boxes, &LabelMap::new());
        assert_eq!(annotated.dimensions(), (0, 0));
    }

    #[test]
    fn test_palette_cycles_by_class() {
        let annotator = Annotator::default();
        assert_eq!(annotator.color(3), annotator.color(3 + PALETTE_SIZE));
        assert_ne!(annotator.color(0), annotator.color(1));
        assert!(!annotator.has_font());
    }
}
