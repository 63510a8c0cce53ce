use image::GrayImage;

use crate::shared::constants::{DETECTION_MIN_NEIGHBORS, DETECTION_SCALE_FACTOR};
use crate::shared::region::Region;
use crate::shared::settings::DetectionParams;

/// Parameters for one multi-scale detection pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionOptions {
    /// Ratio between consecutive pyramid levels; must be greater than 1.
    pub scale_factor: f64,
    /// Raw hits a cluster needs beyond this count to be reported.
    pub min_neighbors: usize,
    /// Smallest face `(width, height)` searched for.
    pub min_size: (u32, u32),
}

impl DetectionOptions {
    pub fn from_params(params: &DetectionParams) -> Self {
        Self {
            scale_factor: DETECTION_SCALE_FACTOR,
            min_neighbors: DETECTION_MIN_NEIGHBORS,
            min_size: params.min_size(),
        }
    }
}

impl Default for DetectionOptions {
    fn default() -> Self {
        Self::from_params(&DetectionParams::default())
    }
}

/// Domain interface for face detection.
///
/// Boxes are returned in the coordinates of `gray`. Implementations may
/// keep scratch buffers between calls, hence `&mut self`.
pub trait FaceDetector: Send {
    fn detect(
        &mut self,
        gray: &GrayImage,
        options: &DetectionOptions,
    ) -> Result<Vec<Region>, Box<dyn std::error::Error>>;
}
