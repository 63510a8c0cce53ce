pub const CASCADE_MODEL_NAME: &str = "haarcascade_frontalface_default.xml";
pub const CASCADE_MODEL_URL: &str =
    "https://raw.githubusercontent.com/opencv/opencv/4.x/data/haarcascades/haarcascade_frontalface_default.xml";

/// Pyramid step between detection scales.
pub const DETECTION_SCALE_FACTOR: f64 = 1.2;

/// Overlapping raw hits a face needs before it is reported.
pub const DETECTION_MIN_NEIGHBORS: usize = 5;

/// LBPH distances above this are treated as unrecognized.
pub const RECOGNITION_MAX_DISTANCE: f64 = 70.0;

/// Accepted matches report `CONFIDENCE_BASE - distance` as their confidence.
pub const CONFIDENCE_BASE: f64 = 150.0;

pub const ROI_COLOR: [u8; 3] = [255, 75, 75];
pub const FACE_COLOR: [u8; 3] = [0, 255, 0];
pub const BOX_THICKNESS: u32 = 2;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
