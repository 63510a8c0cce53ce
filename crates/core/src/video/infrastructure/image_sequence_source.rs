use std::fs;
use std::path::{Path, PathBuf};

use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::shared::frame::{Frame, PixelFormat};
use crate::video::domain::frame_source::{CameraConnector, FrameSource};

/// Replays a directory of still images as a camera.
///
/// The port is the directory path; the requested resolution is ignored
/// since the images define it.
#[derive(Debug, Clone, Copy)]
pub struct ImageSequenceConnector {
    looping: bool,
}

impl ImageSequenceConnector {
    pub fn new(looping: bool) -> Self {
        Self { looping }
    }
}

impl Default for ImageSequenceConnector {
    fn default() -> Self {
        Self::new(true)
    }
}

impl CameraConnector for ImageSequenceConnector {
    fn open(
        &mut self,
        port: &str,
        _resolution: (u32, u32),
    ) -> Result<Box<dyn FrameSource>, Box<dyn std::error::Error>> {
        Ok(Box::new(ImageSequenceSource::open(
            Path::new(port),
            self.looping,
        )?))
    }
}

/// Frame source over the images of one directory, in file name order.
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    width: u32,
    height: u32,
    cursor: usize,
    frame_index: usize,
    looping: bool,
    open: bool,
}

impl ImageSequenceSource {
    pub fn open(dir: &Path, looping: bool) -> Result<Self, Box<dyn std::error::Error>> {
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)
            .map_err(|e| format!("cannot read image directory {}: {e}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_image(p))
            .collect();
        paths.sort();

        let first = paths
            .first()
            .ok_or_else(|| format!("no images found in {}", dir.display()))?;
        let (width, height) = image::image_dimensions(first)?;
        log::info!(
            "Replaying {} images from {} at {width}x{height}",
            paths.len(),
            dir.display()
        );

        Ok(Self {
            paths,
            width,
            height,
            cursor: 0,
            frame_index: 0,
            looping,
            open: true,
        })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

impl FrameSource for ImageSequenceSource {
    fn is_open(&self) -> bool {
        self.open
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn read(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        if !self.open {
            return Ok(None);
        }
        if self.cursor >= self.paths.len() {
            if !self.looping {
                return Ok(None);
            }
            self.cursor = 0;
        }

        let path = &self.paths[self.cursor];
        self.cursor += 1;

        let img = image::open(path)?.to_rgb8();
        if img.dimensions() != (self.width, self.height) {
            return Err(format!(
                "{} is {}x{}, sequence is {}x{}",
                path.display(),
                img.width(),
                img.height(),
                self.width,
                self.height
            )
            .into());
        }

        let frame = Frame::try_new(
            img.into_raw(),
            self.width,
            self.height,
            PixelFormat::Rgb,
            self.frame_index,
        )?;
        self.frame_index += 1;
        Ok(Some(frame))
    }

    fn release(&mut self) {
        self.open = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn write_image(dir: &Path, name: &str, w: u32, h: u32, shade: u8) {
        RgbImage::from_pixel(w, h, Rgb([shade, shade, shade]))
            .save(dir.join(name))
            .unwrap();
    }

    fn sequence_dir() -> TempDir {
        let tmp = TempDir::new().unwrap();
        write_image(tmp.path(), "b.png", 8, 6, 20);
        write_image(tmp.path(), "a.png", 8, 6, 10);
        fs::write(tmp.path().join("notes.txt"), "not an image").unwrap();
        tmp
    }

    #[test]
    fn test_dimensions_from_first_image() {
        let tmp = sequence_dir();
        let source = ImageSequenceSource::open(tmp.path(), true).unwrap();
        assert_eq!(source.dimensions(), (8, 6));
        assert_eq!(source.len(), 2);
    }

    #[test]
    fn test_reads_in_name_order_and_loops() {
        let tmp = sequence_dir();
        let mut source = ImageSequenceSource::open(tmp.path(), true).unwrap();
        let shades: Vec<u8> = (0..5)
            .map(|_| source.read().unwrap().unwrap().data()[0])
            .collect();
        assert_eq!(shades, vec![10, 20, 10, 20, 10]);
    }

    #[test]
    fn test_indices_keep_increasing_across_loops() {
        let tmp = sequence_dir();
        let mut source = ImageSequenceSource::open(tmp.path(), true).unwrap();
        let indices: Vec<usize> = (0..3)
            .map(|_| source.read().unwrap().unwrap().index())
            .collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_without_looping_exhausts() {
        let tmp = sequence_dir();
        let mut source = ImageSequenceSource::open(tmp.path(), false).unwrap();
        assert!(source.read().unwrap().is_some());
        assert!(source.read().unwrap().is_some());
        assert!(source.read().unwrap().is_none());
    }

    #[test]
    fn test_mismatched_size_is_a_read_error() {
        let tmp = sequence_dir();
        write_image(tmp.path(), "c.png", 4, 4, 30);
        let mut source = ImageSequenceSource::open(tmp.path(), true).unwrap();
        source.read().unwrap();
        source.read().unwrap();
        assert!(source.read().is_err());
        // the bad image is skipped, the sequence continues
        assert!(source.read().unwrap().is_some());
    }

    #[test]
    fn test_release_stops_reads() {
        let tmp = sequence_dir();
        let mut source = ImageSequenceSource::open(tmp.path(), true).unwrap();
        source.release();
        assert!(!source.is_open());
        assert!(source.read().unwrap().is_none());
    }

    #[test]
    fn test_empty_directory_fails_to_open() {
        let tmp = TempDir::new().unwrap();
        assert!(ImageSequenceSource::open(tmp.path(), true).is_err());
    }

    #[test]
    fn test_connector_opens_directory() {
        let tmp = sequence_dir();
        let mut connector = ImageSequenceConnector::default();
        let source = connector
            .open(tmp.path().to_str().unwrap(), (640, 480))
            .unwrap();
        assert!(source.is_open());
        assert_eq!(source.dimensions(), (8, 6));
    }
}
