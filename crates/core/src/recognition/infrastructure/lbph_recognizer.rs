use std::path::{Path, PathBuf};

use image::GrayImage;
use opencv::core::Ptr;
use opencv::face::{FaceRecognizerTrait, FaceRecognizerTraitConst, LBPHFaceRecognizer};
use opencv::prelude::*;
use thiserror::Error;

use crate::recognition::domain::face_recognizer::{FaceRecognizer, Prediction};
use crate::shared::gray_mat::gray_to_mat;

#[derive(Error, Debug)]
pub enum LbphError {
    #[error("recognizer model not found: {0}")]
    Missing(PathBuf),
    #[error("recognizer model path {0} is not valid UTF-8")]
    NonUtf8Path(PathBuf),
    #[error("failed to load recognizer model {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: opencv::Error,
    },
    #[error("recognizer model {0} holds no samples")]
    EmptyModel(PathBuf),
}

/// OpenCV LBPH face recognizer restored from a trained model file.
///
/// The model file carries its own radius, neighbours, grid and threshold;
/// the values passed to `create` are overwritten by `read`.
pub struct LbphRecognizer {
    model: Ptr<LBPHFaceRecognizer>,
    samples: usize,
}

// Safety: LbphRecognizer is owned by one capture worker and only used from
// that thread. The model pointer is never cloned or shared.
unsafe impl Send for LbphRecognizer {}

impl LbphRecognizer {
    pub fn from_file(path: &Path) -> Result<Self, LbphError> {
        if !path.is_file() {
            return Err(LbphError::Missing(path.to_path_buf()));
        }
        let name = path
            .to_str()
            .ok_or_else(|| LbphError::NonUtf8Path(path.to_path_buf()))?;
        let load_error = |source| LbphError::Load {
            path: path.to_path_buf(),
            source,
        };

        let mut model = LBPHFaceRecognizer::create(1, 8, 8, 8, f64::MAX).map_err(load_error)?;
        FaceRecognizerTrait::read(&mut model, name).map_err(load_error)?;

        // An untrained model round-trips through `write` and `read` without
        // complaint, then fails every prediction.
        let samples = model.get_histograms().map_err(load_error)?.len();
        if samples == 0 {
            return Err(LbphError::EmptyModel(path.to_path_buf()));
        }
        log::debug!(
            "LBPH model {}: radius {}, {} neighbors, {}x{} grid",
            path.display(),
            model.get_radius().map_err(load_error)?,
            model.get_neighbors().map_err(load_error)?,
            model.get_grid_x().map_err(load_error)?,
            model.get_grid_y().map_err(load_error)?
        );
        Ok(Self { model, samples })
    }

    /// Number of stored sample histograms.
    pub fn len(&self) -> usize {
        self.samples
    }

    pub fn is_empty(&self) -> bool {
        self.samples == 0
    }
}

impl FaceRecognizer for LbphRecognizer {
    fn predict(&self, face: &GrayImage) -> Result<Prediction, Box<dyn std::error::Error>> {
        let image = gray_to_mat(face)?;
        let mut label = -1;
        let mut distance = f64::MAX;
        self.model.predict(&image, &mut label, &mut distance)?;
        Ok(Prediction { label, distance })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use opencv::core::{Mat, Vector};
    use tempfile::TempDir;

    fn gradient() -> GrayImage {
        GrayImage::from_fn(64, 64, |x, y| Luma([((x + y) * 2) as u8]))
    }

    fn checkerboard() -> GrayImage {
        GrayImage::from_fn(64, 64, |x, y| {
            Luma([if (x / 8 + y / 8) % 2 == 0 { 30 } else { 220 }])
        })
    }

    /// Trains an LBPH model on `faces` and writes it to `path`.
    fn write_model(path: &Path, faces: &[(i32, GrayImage)]) {
        let mut model = LBPHFaceRecognizer::create(1, 8, 8, 8, f64::MAX).unwrap();
        if !faces.is_empty() {
            let images: Vector<Mat> = faces.iter().map(|(_, f)| gray_to_mat(f).unwrap()).collect();
            let labels: Vector<i32> = faces.iter().map(|(label, _)| *label).collect();
            model.train(&images, &labels).unwrap();
        }
        FaceRecognizerTraitConst::write(&model, path.to_str().unwrap()).unwrap();
    }

    #[test]
    fn test_identical_face_matches_its_own_label() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("trainer.yml");
        write_model(&path, &[(1, gradient()), (2, checkerboard())]);

        let recognizer = LbphRecognizer::from_file(&path).unwrap();
        assert_eq!(recognizer.len(), 2);

        let prediction = recognizer.predict(&checkerboard()).unwrap();
        assert_eq!(prediction.label, 2);
        assert!(prediction.distance.abs() < 1e-6);

        let prediction = recognizer.predict(&gradient()).unwrap();
        assert_eq!(prediction.label, 1);
    }

    #[test]
    fn test_untrained_model_is_rejected_at_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("trainer.yml");
        write_model(&path, &[]);

        assert!(matches!(
            LbphRecognizer::from_file(&path),
            Err(LbphError::EmptyModel(_))
        ));
    }

    #[test]
    fn test_missing_model_file() {
        assert!(matches!(
            LbphRecognizer::from_file(Path::new("/nonexistent/trainer.yml")),
            Err(LbphError::Missing(_))
        ));
    }

    #[test]
    fn test_unreadable_model_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("trainer.yml");
        std::fs::write(&path, "definitely not a model").unwrap();

        assert!(matches!(
            LbphRecognizer::from_file(&path),
            Err(LbphError::Load { .. } | LbphError::EmptyModel(_))
        ));
    }
}
