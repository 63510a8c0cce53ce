use image::RgbImage;

use crate::identity::domain::identity_store::UserRecord;
use crate::recognition::domain::confidence_gate::Recognition;
use crate::shared::region::Region;

/// A face found in one frame, with its gate outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedFace {
    /// Full-frame coordinates, before mirroring.
    pub region: Region,
    pub identity: Option<UserRecord>,
    pub confidence: Option<i32>,
}

impl DetectedFace {
    pub fn new(region: Region, recognition: Recognition) -> Self {
        Self {
            region,
            identity: recognition.identity,
            confidence: recognition.confidence,
        }
    }

    pub fn is_recognized(&self) -> bool {
        self.identity.is_some()
    }
}

/// One processed, display-ready frame.
#[derive(Debug, Clone)]
pub struct PublishedFrame {
    /// Annotated, mirrored, and scaled to the display size.
    pub image: RgbImage,
    pub faces: Vec<DetectedFace>,
    pub roi: Region,
    /// Capture index of the source frame.
    pub sequence: usize,
}

/// Outcome of handing a frame to a [`FramePublisher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The worker stopped wanting the frame before the consumer took it.
    Withdrawn,
}

/// Receives one published frame per processed iteration, in capture order.
///
/// Called on the worker thread. A publisher that may block must poll
/// `still_wanted` while it waits and give up once it returns false, so a
/// stop, pause or halt is never stuck behind a slow consumer.
pub trait FramePublisher: Send {
    fn publish(
        &mut self,
        frame: PublishedFrame,
        still_wanted: &dyn Fn() -> bool,
    ) -> Result<Delivery, Box<dyn std::error::Error>>;
}
