//! Face detection with an OpenCV cascade classifier.

use std::path::{Path, PathBuf};

use image::GrayImage;
use opencv::core::{Rect, Size, Vector};
use opencv::objdetect::CascadeClassifier;
use opencv::prelude::*;
use thiserror::Error;

use crate::detection::domain::face_detector::{DetectionOptions, FaceDetector};
use crate::shared::gray_mat::gray_to_mat;
use crate::shared::region::Region;

#[derive(Error, Debug)]
pub enum CascadeError {
    #[error("cascade file not found: {0}")]
    Missing(PathBuf),
    #[error("cascade path {0} is not valid UTF-8")]
    NonUtf8Path(PathBuf),
    #[error("failed to load cascade {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: opencv::Error,
    },
    #[error("{0} holds no usable cascade")]
    Empty(PathBuf),
}

pub struct CascadeFaceDetector {
    classifier: CascadeClassifier,
    hits: Vector<Rect>,
}

// Safety: CascadeFaceDetector is owned by one capture worker and only
// used from that thread. The classifier handle is never shared.
unsafe impl Send for CascadeFaceDetector {}

impl CascadeFaceDetector {
    pub fn from_file(path: &Path) -> Result<Self, CascadeError> {
        if !path.is_file() {
            return Err(CascadeError::Missing(path.to_path_buf()));
        }
        let name = path
            .to_str()
            .ok_or_else(|| CascadeError::NonUtf8Path(path.to_path_buf()))?;
        let load_error = |source| CascadeError::Load {
            path: path.to_path_buf(),
            source,
        };

        // A file OpenCV cannot parse may still yield an empty classifier
        // instead of an error.
        let mut classifier = CascadeClassifier::new(name).map_err(load_error)?;
        if classifier.empty().map_err(load_error)? {
            return Err(CascadeError::Empty(path.to_path_buf()));
        }
        let window = classifier.get_original_window_size().map_err(load_error)?;
        log::info!(
            "Loaded face cascade {} ({}x{} window)",
            path.display(),
            window.width,
            window.height
        );
        Ok(Self {
            classifier,
            hits: Vector::new(),
        })
    }
}

impl FaceDetector for CascadeFaceDetector {
    fn detect(
        &mut self,
        gray: &GrayImage,
        options: &DetectionOptions,
    ) -> Result<Vec<Region>, Box<dyn std::error::Error>> {
        if options.scale_factor <= 1.0 {
            return Err(format!("scale factor must exceed 1, got {}", options.scale_factor).into());
        }
        if gray.width() == 0 || gray.height() == 0 {
            return Ok(Vec::new());
        }
        let image = gray_to_mat(gray)?;
        let (min_w, min_h) = options.min_size;

        self.hits.clear();
        self.classifier.detect_multi_scale(
            &image,
            &mut self.hits,
            options.scale_factor,
            i32::try_from(options.min_neighbors)?,
            0,
            Size::new(i32::try_from(min_w)?, i32::try_from(min_h)?),
            Size::default(),
        )?;
        Ok(self.hits.iter().map(to_region).collect())
    }
}

fn to_region(rect: Rect) -> Region {
    Region::new(rect.x, rect.y, rect.width, rect.height)
}
