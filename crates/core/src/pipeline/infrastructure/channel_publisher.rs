use std::time::Duration;

use crossbeam_channel::{SendTimeoutError, Sender};

use crate::pipeline::frame_publisher::{Delivery, FramePublisher, PublishedFrame};

/// How often a publisher blocked on a full channel re-checks whether the
/// frame is still wanted.
const SEND_POLL: Duration = Duration::from_millis(20);

/// Publishes frames into a crossbeam channel.
///
/// With a bounded channel the worker waits while the channel is full, so
/// frames are never dropped or reordered. The wait ends early when the
/// worker stops running; that frame is withdrawn. Dropping the receiver
/// releases a waiting worker; frames published after that are discarded.
pub struct ChannelPublisher {
    sender: Sender<PublishedFrame>,
    disconnected: bool,
}

impl ChannelPublisher {
    pub fn new(sender: Sender<PublishedFrame>) -> Self {
        Self {
            sender,
            disconnected: false,
        }
    }
}

impl FramePublisher for ChannelPublisher {
    fn publish(
        &mut self,
        frame: PublishedFrame,
        still_wanted: &dyn Fn() -> bool,
    ) -> Result<Delivery, Box<dyn std::error::Error>> {
        if self.disconnected {
            return Ok(Delivery::Withdrawn);
        }
        let mut pending = frame;
        loop {
            match self.sender.send_timeout(pending, SEND_POLL) {
                Ok(()) => return Ok(Delivery::Delivered),
                Err(SendTimeoutError::Timeout(frame)) => {
                    if !still_wanted() {
                        log::debug!("Withdrawing frame {}: consumer not draining", frame.sequence);
                        return Ok(Delivery::Withdrawn);
                    }
                    pending = frame;
                }
                Err(SendTimeoutError::Disconnected(_)) => {
                    log::warn!("Frame receiver disconnected; discarding further frames");
                    self.disconnected = true;
                    return Ok(Delivery::Withdrawn);
                }
            }
        }
    }
}

/// Publishes frames by calling a closure on the worker thread.
pub struct CallbackPublisher<F>
where
    F: FnMut(PublishedFrame) + Send,
{
    callback: F,
}

impl<F> CallbackPublisher<F>
where
    F: FnMut(PublishedFrame) + Send,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> FramePublisher for CallbackPublisher<F>
where
    F: FnMut(PublishedFrame) + Send,
{
    fn publish(
        &mut self,
        frame: PublishedFrame,
        _still_wanted: &dyn Fn() -> bool,
    ) -> Result<Delivery, Box<dyn std::error::Error>> {
        (self.callback)(frame);
        Ok(Delivery::Delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::region::Region;
    use image::RgbImage;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    fn frame(sequence: usize) -> PublishedFrame {
        PublishedFrame {
            image: RgbImage::new(4, 4),
            faces: Vec::new(),
            roi: Region::new(1, 1, 2, 2),
            sequence,
        }
    }

    fn always() -> bool {
        true
    }

    #[test]
    fn test_channel_preserves_order() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut publisher = ChannelPublisher::new(tx);
        for i in 0..5 {
            assert_eq!(publisher.publish(frame(i), &always).unwrap(), Delivery::Delivered);
        }
        let seen: Vec<usize> = rx.try_iter().map(|f| f.sequence).collect();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_disconnected_receiver_discards_frames() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        drop(rx);
        let mut publisher = ChannelPublisher::new(tx);
        assert_eq!(publisher.publish(frame(0), &always).unwrap(), Delivery::Withdrawn);
        assert!(publisher.disconnected);
        assert_eq!(publisher.publish(frame(1), &always).unwrap(), Delivery::Withdrawn);
    }

    #[test]
    fn test_full_bounded_channel_waits_until_drained() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let handle = std::thread::spawn(move || {
            let mut publisher = ChannelPublisher::new(tx);
            for i in 0..3 {
                publisher.publish(frame(i), &always).unwrap();
            }
        });
        std::thread::sleep(Duration::from_millis(3 * SEND_POLL.as_millis() as u64));
        let seen: Vec<usize> = (0..3).map(|_| rx.recv().unwrap().sequence).collect();
        handle.join().unwrap();
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[test]
    fn test_full_channel_withdraws_once_unwanted() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let mut publisher = ChannelPublisher::new(tx);
        publisher.publish(frame(0), &always).unwrap();

        let wanted = Arc::new(AtomicBool::new(true));
        let flag = wanted.clone();
        let clear = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            flag.store(false, Ordering::SeqCst);
        });

        let started = Instant::now();
        let still_wanted = || wanted.load(Ordering::SeqCst);
        let delivery = publisher.publish(frame(1), &still_wanted).unwrap();
        clear.join().unwrap();

        assert_eq!(delivery, Delivery::Withdrawn);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!publisher.disconnected);
        assert_eq!(rx.try_iter().map(|f| f.sequence).collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn test_callback_publisher_invokes_closure() {
        let mut seen = Vec::new();
        {
            let mut publisher = CallbackPublisher::new(|f: PublishedFrame| seen.push(f.sequence));
            publisher.publish(frame(7), &always).unwrap();
            publisher.publish(frame(8), &|| false).unwrap();
        }
        assert_eq!(seen, vec![7, 8]);
    }
}
