use image::GrayImage;

/// Nearest stored sample for a face crop. Lower distance means more similar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub label: i32,
    pub distance: f64,
}

/// Domain interface for face recognition over a grayscale face crop.
pub trait FaceRecognizer: Send {
    fn predict(&self, face: &GrayImage) -> Result<Prediction, Box<dyn std::error::Error>>;
}
