use image::{GrayImage, RgbImage};
use ndarray::{s, ArrayView3};
use thiserror::Error;

use crate::shared::region::Region;

/// Channel layout of a [`Frame`]'s pixel data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb,
    Bgr,
    Gray,
}

impl PixelFormat {
    pub fn channels(self) -> u8 {
        match self {
            PixelFormat::Rgb | PixelFormat::Bgr => 3,
            PixelFormat::Gray => 1,
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
    #[error("{width}x{height} {format:?} frame needs {expected} bytes, got {actual}")]
    BufferSize {
        width: u32,
        height: u32,
        format: PixelFormat,
        expected: usize,
        actual: usize,
    },
}

/// A single captured frame: contiguous bytes in row-major order.
///
/// The buffer always matches the dimensions and pixel format; sources build
/// frames through [`Frame::try_new`], which rejects anything else.
///
/// Sources declare the pixel layout they produce; conversion to display RGB
/// or to intensity happens in the frame pipeline only.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    format: PixelFormat,
    index: usize,
}

impl Frame {
    pub fn try_new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: PixelFormat,
        index: usize,
    ) -> Result<Self, FrameError> {
        let expected = (width as usize) * (height as usize) * (format.channels() as usize);
        if data.len() != expected {
            return Err(FrameError::BufferSize {
                width,
                height,
                format,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self::from_valid(data, width, height, format, index))
    }

    fn from_valid(
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: PixelFormat,
        index: usize,
    ) -> Self {
        Self {
            data,
            width,
            height,
            format,
            index,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.format.channels()
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Capture sequence number assigned by the source.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    /// Copies the pixels inside `region` into a new frame of the same format.
    ///
    /// The region is clipped to the frame bounds.
    pub fn crop(&self, region: &Region) -> Frame {
        let clipped = region.clip_to(self.width, self.height);
        let (x, y) = (clipped.x as usize, clipped.y as usize);
        let (w, h) = (clipped.width as usize, clipped.height as usize);

        let view = self.as_ndarray();
        let sub = view.slice(s![y..y + h, x..x + w, ..]);
        let data: Vec<u8> = sub.iter().copied().collect();
        Frame::from_valid(data, w as u32, h as u32, self.format, self.index)
    }

    /// Single-channel intensity using BT.601 weights in 14-bit fixed point.
    pub fn to_gray(&self) -> GrayImage {
        let pixels = (self.width as usize) * (self.height as usize);
        let mut out = Vec::with_capacity(pixels);
        match self.format {
            PixelFormat::Gray => out.extend_from_slice(&self.data),
            PixelFormat::Rgb => {
                for px in self.data.chunks_exact(3) {
                    out.push(luma(px[0], px[1], px[2]));
                }
            }
            PixelFormat::Bgr => {
                for px in self.data.chunks_exact(3) {
                    out.push(luma(px[2], px[1], px[0]));
                }
            }
        }
        GrayImage::from_raw(self.width, self.height, out)
            .expect("Frame data length must match dimensions")
    }

    /// Converts to an RGB image regardless of the source layout.
    pub fn to_rgb(&self) -> RgbImage {
        let data = match self.format {
            PixelFormat::Rgb => self.data.clone(),
            PixelFormat::Bgr => self
                .data
                .chunks_exact(3)
                .flat_map(|px| [px[2], px[1], px[0]])
                .collect(),
            PixelFormat::Gray => self.data.iter().flat_map(|&v| [v, v, v]).collect(),
        };
        RgbImage::from_raw(self.width, self.height, data)
            .expect("Frame data length must match dimensions")
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels() as usize,
        )
    }
}

const LUMA_R: u32 = 4899;
const LUMA_G: u32 = 9617;
const LUMA_B: u32 = 1868;
const LUMA_SHIFT: u32 = 14;

fn luma(r: u8, g: u8, b: u8) -> u8 {
    let v = r as u32 * LUMA_R + g as u32 * LUMA_G + b as u32 * LUMA_B + (1 << (LUMA_SHIFT - 1));
    (v >> LUMA_SHIFT) as u8
}
