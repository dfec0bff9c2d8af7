// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Annotation layer: detection boxes burned into the analyzed image
//!
//! Colours are fixed per variant (objects green, faces blue, text orange).
//! Layers are drawn objects, then faces, then text so text boxes stay on top.
//! Each box gets a filled caption in its colour with white text, above the
//! box when there is room and just inside its top edge otherwise.
//! Classifications carry no box and are not drawn.

use ab_glyph::{FontRef, PxScale};
use image::{DynamicImage, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::error::VisionError;
use crate::vision::detection::{BoundingBox, Detection, DetectionKind};
use crate::vision::image_utils::encode_png;

pub const OBJECT_COLOR: Rgba<u8> = Rgba([0, 255, 0, 255]);
pub const FACE_COLOR: Rgba<u8> = Rgba([0, 0, 255, 255]);
pub const TEXT_COLOR: Rgba<u8> = Rgba([255, 165, 0, 255]);
pub const CAPTION_TEXT_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Box outline width in pixels
pub const BOX_THICKNESS: u32 = 2;

/// Caption glyph height in pixels
pub const CAPTION_SCALE: f32 = 14.0;

/// Padding around caption text
const CAPTION_PADDING: u32 = 2;

/// Recognized text longer than this is cut to `TEXT_CAPTION_KEEP` chars + "..."
const TEXT_CAPTION_MAX: usize = 20;
const TEXT_CAPTION_KEEP: usize = 17;

static CAPTION_FONT: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans.ttf");

/// Outline colour for a detection variant
pub fn color_for(kind: DetectionKind) -> Option<Rgba<u8>> {
    match kind {
        DetectionKind::Object => Some(OBJECT_COLOR),
        DetectionKind::Face => Some(FACE_COLOR),
        DetectionKind::TextSpan => Some(TEXT_COLOR),
        DetectionKind::Classification => None,
    }
}

/// Caption text: label (or truncated recognized text) and confidence
pub fn caption_for(detection: &Detection) -> String {
    let label = match detection.kind {
        DetectionKind::TextSpan if detection.label.chars().count() > TEXT_CAPTION_MAX => {
            let head: String = detection.label.chars().take(TEXT_CAPTION_KEEP).collect();
            format!("{}...", head)
        }
        _ => detection.label.clone(),
    };
    format!("{} {:.1}%", label, detection.confidence * 100.0)
}

fn caption_font() -> Result<FontRef<'static>, VisionError> {
    FontRef::try_from_slice(CAPTION_FONT)
        .map_err(|e| VisionError::Encoding(format!("caption font: {}", e)))
}

/// Draw every boxed detection onto `canvas` in slice order
pub fn draw_detections(
    canvas: &mut RgbaImage,
    detections: &[Detection],
    font: &FontRef<'_>,
) {
    for detection in detections {
        let (Some(bbox), Some(color)) = (detection.bounding_box, color_for(detection.kind)) else {
            continue;
        };
        draw_box(canvas, &bbox, color);
        draw_caption(canvas, &bbox, color, &caption_for(detection), font);
    }
}

/// Render all layers onto a copy of `image` and encode as PNG
pub fn annotate_scene(
    image: &DynamicImage,
    objects: &[Detection],
    faces: &[Detection],
    text: &[Detection],
) -> Result<Vec<u8>, VisionError> {
    let font = caption_font()?;
    let mut canvas = image.to_rgba8();

    draw_detections(&mut canvas, objects, &font);
    draw_detections(&mut canvas, faces, &font);
    draw_detections(&mut canvas, text, &font);

    encode_png(&DynamicImage::ImageRgba8(canvas))
}

/// Outline `bbox`, clipped to the canvas
fn draw_box(canvas: &mut RgbaImage, bbox: &BoundingBox, color: Rgba<u8>) {
    let (width, height) = canvas.dimensions();
    if width == 0 || height == 0 || bbox.left >= width || bbox.top >= height {
        return;
    }

    let left = bbox.left;
    let top = bbox.top;
    let right = bbox.right.min(width - 1);
    let bottom = bbox.bottom.min(height - 1);
    if right < left || bottom < top {
        return;
    }

    for t in 0..BOX_THICKNESS {
        let y_top = top + t;
        let y_bottom = bottom.saturating_sub(t);
        for x in left..=right {
            if y_top <= bottom {
                canvas.put_pixel(x, y_top, color);
            }
            if y_bottom >= top {
                canvas.put_pixel(x, y_bottom, color);
            }
        }

        let x_left = left + t;
        let x_right = right.saturating_sub(t);
        for y in top..=bottom {
            if x_left <= right {
                canvas.put_pixel(x_left, y, color);
            }
            if x_right >= left {
                canvas.put_pixel(x_right, y, color);
            }
        }
    }
}

/// Filled caption anchored at the box's top-left corner
fn draw_caption(
    canvas: &mut RgbaImage,
    bbox: &BoundingBox,
    color: Rgba<u8>,
    caption: &str,
    font: &FontRef<'_>,
) {
    let (width, height) = canvas.dimensions();
    if caption.is_empty() || bbox.left >= width || bbox.top >= height {
        return;
    }

    let scale = PxScale::from(CAPTION_SCALE);
    let (text_w, text_h) = text_size(scale, font, caption);
    let caption_w = text_w + 2 * CAPTION_PADDING;
    let caption_h = text_h + 2 * CAPTION_PADDING;

    let x = bbox.left as i32;
    let y = if bbox.top >= caption_h {
        (bbox.top - caption_h) as i32
    } else {
        bbox.top as i32
    };

    draw_filled_rect_mut(
        canvas,
        Rect::at(x, y).of_size(caption_w.max(1), caption_h.max(1)),
        color,
    );
    draw_text_mut(
        canvas,
        CAPTION_TEXT_COLOR,
        x + CAPTION_PADDING as i32,
        y + CAPTION_PADDING as i32,
        scale,
        font,
        caption,
    );
}
