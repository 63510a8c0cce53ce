use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Minimum face size handed to the detector on every call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionParams {
    pub min_width: f64,
    pub min_height: f64,
}

impl DetectionParams {
    /// The minimum size rounded to whole pixels, halves to even.
    pub fn min_size(&self) -> (u32, u32) {
        (
            self.min_width.round_ties_even().max(0.0) as u32,
            self.min_height.round_ties_even().max(0.0) as u32,
        )
    }
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            min_width: 30.0,
            min_height: 30.0,
        }
    }
}

/// Read-only configuration for one capture session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Device path, device index, or video file.
    pub camera_port: String,
    pub camera_resolution: (u32, u32),
    /// Target size of published frames; the camera resolution when unset.
    pub display_size: Option<(u32, u32)>,
    pub detection: DetectionParams,
    pub cascade_path: Option<PathBuf>,
    pub recognizer_path: PathBuf,
    pub identity_store_path: PathBuf,
    pub read_retry_delay_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            camera_port: "0".to_string(),
            camera_resolution: (640, 480),
            display_size: None,
            detection: DetectionParams::default(),
            cascade_path: None,
            recognizer_path: PathBuf::from("Faces/Trained/trainer.xml"),
            identity_store_path: PathBuf::from("users.json"),
            read_retry_delay_ms: 10,
        }
    }
}

impl Settings {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("FaceWatch").join("settings.json"))
    }

    /// Loads the user settings, falling back to defaults on any failure.
    pub fn load() -> Self {
        Self::config_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                log::warn!("Ignoring malformed settings at {}: {e}", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn display_size(&self) -> (u32, u32) {
        self.display_size.unwrap_or(self.camera_resolution)
    }

    pub fn read_retry_delay(&self) -> Duration {
        Duration::from_millis(self.read_retry_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.camera_resolution, (640, 480));
        assert_eq!(s.display_size(), (640, 480));
        assert_eq!(s.detection.min_size(), (30, 30));
        assert_eq!(s.read_retry_delay(), Duration::from_millis(10));
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let s = Settings::load_from(&dir.path().join("absent.json"));
        assert_eq!(s, Settings::default());
    }

    #[test]
    fn test_load_malformed_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(Settings::load_from(&path), Settings::default());
    }

    #[test]
    fn test_load_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{ "camera_port": "/dev/video2", "detection": { "min_width": 48.6, "min_height": 40.2 } }"#,
        )
        .unwrap();
        let s = Settings::load_from(&path);
        assert_eq!(s.camera_port, "/dev/video2");
        assert_eq!(s.detection.min_size(), (49, 40));
        assert_eq!(s.camera_resolution, (640, 480));
    }

    #[test]
    fn test_explicit_display_size_wins() {
        let s = Settings {
            display_size: Some((320, 200)),
            ..Settings::default()
        };
        assert_eq!(s.display_size(), (320, 200));
    }

    #[rstest]
    #[case(29.5, 30)]
    #[case(30.5, 30)]
    #[case(29.4, 29)]
    #[case(0.0, 0)]
    fn test_min_size_rounds_to_nearest(#[case] value: f64, #[case] expected: u32) {
        let params = DetectionParams {
            min_width: value,
            min_height: value,
        };
        assert_eq!(params.min_size(), (expected, expected));
    }
}
