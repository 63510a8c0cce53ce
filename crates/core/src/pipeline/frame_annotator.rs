use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::pipeline::frame_publisher::DetectedFace;
use crate::shared::constants::{BOX_THICKNESS, FACE_COLOR, ROI_COLOR};
use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// Turns a captured frame into its display image: boxes drawn in frame
/// coordinates, then mirrored, then fitted into the display size.
#[derive(Debug, Clone, Copy)]
pub struct FrameAnnotator {
    display_size: (u32, u32),
}

impl FrameAnnotator {
    pub fn new(display_size: (u32, u32)) -> Self {
        Self { display_size }
    }

    pub fn annotate(&self, frame: &Frame, roi: &Region, faces: &[DetectedFace]) -> RgbImage {
        let mut image = frame.to_rgb();
        draw_box(&mut image, roi, Rgb(ROI_COLOR), BOX_THICKNESS);
        for face in faces {
            draw_box(&mut image, &face.region, Rgb(FACE_COLOR), BOX_THICKNESS);
        }
        imageops::flip_horizontal_in_place(&mut image);
        fit_to(image, self.display_size)
    }
}

/// Draws `thickness` nested one-pixel outlines growing inward from `region`.
fn draw_box(image: &mut RgbImage, region: &Region, color: Rgb<u8>, thickness: u32) {
    for t in 0..thickness as i32 {
        let w = region.width - 2 * t;
        let h = region.height - 2 * t;
        if w <= 0 || h <= 0 {
            break;
        }
        let rect = Rect::at(region.x + t, region.y + t).of_size(w as u32, h as u32);
        draw_hollow_rect_mut(image, rect, color);
    }
}

/// Largest size with the image's aspect ratio that fits in `target`.
pub fn fit_size(size: (u32, u32), target: (u32, u32)) -> (u32, u32) {
    let (w, h) = (size.0 as f64, size.1 as f64);
    let scale = (target.0 as f64 / w).min(target.1 as f64 / h);
    (
        ((w * scale).round() as u32).clamp(1, target.0.max(1)),
        ((h * scale).round() as u32).clamp(1, target.1.max(1)),
    )
}

fn fit_to(image: RgbImage, target: (u32, u32)) -> RgbImage {
    if target.0 == 0 || target.1 == 0 {
        return image;
    }
    let (w, h) = fit_size(image.dimensions(), target);
    if (w, h) == image.dimensions() {
        return image;
    }
    imageops::resize(&image, w, h, FilterType::Triangle)
}
