use std::path::Path;
use std::time::Instant;

use image::imageops;
use image::GrayImage;

use crate::detection::domain::face_detector::{DetectionOptions, FaceDetector};
use crate::detection::infrastructure::cascade_face_detector::CascadeFaceDetector;
use crate::identity::domain::identity_store::IdentityStore;
use crate::pipeline::capture_error::CaptureError;
use crate::pipeline::frame_annotator::FrameAnnotator;
use crate::pipeline::frame_publisher::{DetectedFace, PublishedFrame};
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::recognition::domain::confidence_gate::{ConfidenceGate, Recognition};
use crate::recognition::domain::face_recognizer::FaceRecognizer;
use crate::recognition::infrastructure::lbph_recognizer::LbphRecognizer;
use crate::shared::frame::Frame;
use crate::shared::region::Region;
use crate::shared::settings::Settings;

/// Turns one captured frame into a published frame:
/// crop to ROI, detect, recognize, gate, annotate.
pub struct FrameProcessor {
    detector: Box<dyn FaceDetector>,
    recognizer: Box<dyn FaceRecognizer>,
    identities: Box<dyn IdentityStore>,
    gate: ConfidenceGate,
    options: DetectionOptions,
    annotator: FrameAnnotator,
}

impl FrameProcessor {
    pub fn new(
        detector: Box<dyn FaceDetector>,
        recognizer: Box<dyn FaceRecognizer>,
        identities: Box<dyn IdentityStore>,
        options: DetectionOptions,
        display_size: (u32, u32),
    ) -> Self {
        Self {
            detector,
            recognizer,
            identities,
            gate: ConfidenceGate::default(),
            options,
            annotator: FrameAnnotator::new(display_size),
        }
    }

    /// Loads the cascade and the recognizer model named by `settings`.
    pub fn load(
        settings: &Settings,
        cascade_path: &Path,
        identities: Box<dyn IdentityStore>,
    ) -> Result<Self, CaptureError> {
        let detector = CascadeFaceDetector::from_file(cascade_path)?;
        let recognizer = LbphRecognizer::from_file(&settings.recognizer_path)?;
        log::info!(
            "Loaded face recognizer {} ({} samples)",
            settings.recognizer_path.display(),
            recognizer.len()
        );
        Ok(Self::new(
            Box::new(detector),
            Box::new(recognizer),
            identities,
            DetectionOptions::from_params(&settings.detection),
            settings.display_size(),
        ))
    }

    pub fn process(
        &mut self,
        frame: &Frame,
        roi: &Region,
        logger: &mut dyn PipelineLogger,
    ) -> Result<PublishedFrame, Box<dyn std::error::Error>> {
        let started = Instant::now();
        let gray = frame.crop(roi).to_gray();
        let local = self.detector.detect(&gray, &self.options)?;
        logger.timing("detect", elapsed_ms(started));

        let started = Instant::now();
        let faces: Vec<DetectedFace> = local
            .iter()
            .map(|rect| {
                let recognition = self.recognize(&gray, rect);
                DetectedFace::new(rect.translate(roi.x, roi.y), recognition)
            })
            .collect();
        logger.timing("recognize", elapsed_ms(started));
        logger.metric("faces", faces.len() as f64);

        let started = Instant::now();
        let image = self.annotator.annotate(frame, roi, &faces);
        logger.timing("annotate", elapsed_ms(started));

        Ok(PublishedFrame {
            image,
            faces,
            roi: *roi,
            sequence: frame.index(),
        })
    }

    /// Gate outcome for the face at `rect` in ROI coordinates. A face the
    /// recognizer cannot score counts as unrecognized.
    fn recognize(&self, gray: &GrayImage, rect: &Region) -> Recognition {
        let Some(face) = crop_face(gray, rect) else {
            return Recognition::unrecognized();
        };
        match self.recognizer.predict(&face) {
            Ok(prediction) => self.gate.evaluate(prediction, self.identities.as_ref()),
            Err(e) => {
                log::debug!("Recognition failed for face at {rect:?}: {e}");
                Recognition::unrecognized()
            }
        }
    }
}

fn crop_face(gray: &GrayImage, rect: &Region) -> Option<GrayImage> {
    let r = rect.clip_to(gray.width(), gray.height());
    if r.is_empty() {
        return None;
    }
    let (x, y) = (r.x as u32, r.y as u32);
    Some(imageops::crop_imm(gray, x, y, r.width as u32, r.height as u32).to_image())
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::domain::identity_store::UserRecord;
    use crate::identity::infrastructure::json_identity_store::JsonIdentityStore;
    use crate::pipeline::pipeline_logger::StdoutPipelineLogger;
    use crate::recognition::domain::face_recognizer::Prediction;
    use crate::shared::frame::PixelFormat;
    use std::error::Error;
    use std::sync::{Arc, Mutex};

    struct FixedDetector {
        boxes: Vec<Region>,
        seen: Arc<Mutex<Vec<((u32, u32), DetectionOptions)>>>,
    }

    impl FaceDetector for FixedDetector {
        fn detect(
            &mut self,
            gray: &GrayImage,
            options: &DetectionOptions,
        ) -> Result<Vec<Region>, Box<dyn Error>> {
            self.seen.lock().unwrap().push((gray.dimensions(), *options));
            Ok(self.boxes.clone())
        }
    }

    struct FailingDetector;

    impl FaceDetector for FailingDetector {
        fn detect(
            &mut self,
            _gray: &GrayImage,
            _options: &DetectionOptions,
        ) -> Result<Vec<Region>, Box<dyn Error>> {
            Err("detector exploded".into())
        }
    }

    struct FixedRecognizer {
        prediction: Option<Prediction>,
        sizes: Arc<Mutex<Vec<(u32, u32)>>>,
    }

    impl FaceRecognizer for FixedRecognizer {
        fn predict(&self, face: &GrayImage) -> Result<Prediction, Box<dyn Error>> {
            self.sizes.lock().unwrap().push(face.dimensions());
            self.prediction.ok_or_else(|| "face too small".into())
        }
    }

    fn alice() -> UserRecord {
        UserRecord {
            id: 7,
            fullname: "Alice".to_string(),
            nim: None,
            archived: false,
        }
    }

    struct Fixture {
        processor: FrameProcessor,
        detector_calls: Arc<Mutex<Vec<((u32, u32), DetectionOptions)>>>,
        face_sizes: Arc<Mutex<Vec<(u32, u32)>>>,
    }

    fn fixture(boxes: Vec<Region>, prediction: Option<Prediction>) -> Fixture {
        let detector_calls = Arc::new(Mutex::new(Vec::new()));
        let face_sizes = Arc::new(Mutex::new(Vec::new()));
        let options = DetectionOptions {
            min_size: (40, 40),
            ..DetectionOptions::default()
        };
        let processor = FrameProcessor::new(
            Box::new(FixedDetector {
                boxes,
                seen: detector_calls.clone(),
            }),
            Box::new(FixedRecognizer {
                prediction,
                sizes: face_sizes.clone(),
            }),
            Box::new(JsonIdentityStore::from_records(vec![alice()]).unwrap()),
            options,
            (640, 480),
        );
        Fixture {
            processor,
            detector_calls,
            face_sizes,
        }
    }

    fn frame() -> Frame {
        Frame::try_new(vec![90; 640 * 480 * 3], 640, 480, PixelFormat::Rgb, 12).unwrap()
    }

    fn roi() -> Region {
        Region::region_of_interest(640, 480).unwrap()
    }

    #[test]
    fn test_recognized_face_in_frame_coordinates() {
        let mut f = fixture(
            vec![Region::new(50, 50, 80, 80)],
            Some(Prediction {
                label: 7,
                distance: 40.0,
            }),
        );
        let out = f
            .processor
            .process(&frame(), &roi(), &mut StdoutPipelineLogger::default())
            .unwrap();

        assert_eq!(out.roi, Region::new(160, 120, 320, 240));
        assert_eq!(out.sequence, 12);
        assert_eq!(out.faces.len(), 1);
        let face = &out.faces[0];
        assert_eq!(face.region, Region::new(210, 170, 80, 80));
        assert_eq!(face.identity, Some(alice()));
        assert_eq!(face.confidence, Some(110));
        assert_eq!(*f.face_sizes.lock().unwrap(), vec![(80, 80)]);
    }

    #[test]
    fn test_detector_sees_roi_with_configured_options() {
        let mut f = fixture(Vec::new(), None);
        f.processor
            .process(&frame(), &roi(), &mut StdoutPipelineLogger::default())
            .unwrap();
        let calls = f.detector_calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, (320, 240));
        assert_eq!(calls[0].1.min_size, (40, 40));
        assert_eq!(calls[0].1.min_neighbors, 5);
    }

    #[test]
    fn test_distant_face_is_unrecognized() {
        let mut f = fixture(
            vec![Region::new(50, 50, 80, 80)],
            Some(Prediction {
                label: 7,
                distance: 85.0,
            }),
        );
        let out = f
            .processor
            .process(&frame(), &roi(), &mut StdoutPipelineLogger::default())
            .unwrap();
        assert_eq!(out.faces[0].region, Region::new(210, 170, 80, 80));
        assert!(!out.faces[0].is_recognized());
        assert_eq!(out.faces[0].confidence, None);
    }

    #[test]
    fn test_recognizer_failure_marks_face_unrecognized() {
        let mut f = fixture(vec![Region::new(0, 0, 10, 10)], None);
        let out = f
            .processor
            .process(&frame(), &roi(), &mut StdoutPipelineLogger::default())
            .unwrap();
        assert_eq!(out.faces.len(), 1);
        assert!(!out.faces[0].is_recognized());
    }

    #[test]
    fn test_detector_failure_fails_the_frame() {
        let mut processor = FrameProcessor::new(
            Box::new(FailingDetector),
            Box::new(FixedRecognizer {
                prediction: None,
                sizes: Arc::default(),
            }),
            Box::new(JsonIdentityStore::default()),
            DetectionOptions::default(),
            (640, 480),
        );
        let result = processor.process(&frame(), &roi(), &mut StdoutPipelineLogger::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_records_stage_timings_and_face_count() {
        let mut f = fixture(
            vec![Region::new(0, 0, 40, 40), Region::new(100, 100, 40, 40)],
            Some(Prediction {
                label: 3,
                distance: 10.0,
            }),
        );
        let mut logger = StdoutPipelineLogger::default();
        f.processor.process(&frame(), &roi(), &mut logger).unwrap();

        for stage in ["detect", "recognize", "annotate"] {
            assert_eq!(logger.timings_for(stage).unwrap().count, 1, "{stage}");
        }
        let faces = logger.metrics_for("faces").unwrap();
        assert_eq!((faces.count, faces.total), (1, 2.0));
    }

    #[test]
    fn test_output_scaled_to_display_size() {
        let mut f = fixture(Vec::new(), None);
        f.processor.annotator = FrameAnnotator::new((320, 320));
        let out = f
            .processor
            .process(&frame(), &roi(), &mut StdoutPipelineLogger::default())
            .unwrap();
        assert_eq!(out.image.dimensions(), (320, 240));
    }

    #[test]
    fn test_face_crop_is_clipped_to_roi() {
        let gray = GrayImage::new(20, 10);
        let face = crop_face(&gray, &Region::new(15, 5, 10, 10)).unwrap();
        assert_eq!(face.dimensions(), (5, 5));
        assert!(crop_face(&gray, &Region::new(30, 0, 5, 5)).is_none());
    }
}
