use crate::shared::frame::Frame;

/// An opened capture handle.
///
/// `read` blocks until the next frame is available. `Ok(None)` means no
/// frame could be produced this time (device hiccup, end of a file); the
/// caller decides whether to retry.
pub trait FrameSource: Send {
    fn is_open(&self) -> bool;

    /// Frame `(width, height)`, known once the source is open.
    fn dimensions(&self) -> (u32, u32);

    fn read(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>>;

    /// Releases the underlying device. Further reads return `Ok(None)`.
    fn release(&mut self);
}

/// Acquires frame sources for a camera port.
///
/// `port` is a device path, device index, or file path depending on the
/// implementation; `resolution` is a request the device may not honour.
pub trait CameraConnector: Send {
    fn open(
        &mut self,
        port: &str,
        resolution: (u32, u32),
    ) -> Result<Box<dyn FrameSource>, Box<dyn std::error::Error>>;
}
