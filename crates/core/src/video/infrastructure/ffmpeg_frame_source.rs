use std::path::Path;

use ffmpeg_next::format::context::{Context, Input};
use ffmpeg_next::software::scaling;
use ffmpeg_next::util::frame::video::Video;

use crate::shared::frame::{Frame, PixelFormat};
use crate::video::domain::frame_source::{CameraConnector, FrameSource};

#[cfg(target_os = "linux")]
const CAPTURE_FORMAT: &str = "v4l2";
#[cfg(target_os = "macos")]
const CAPTURE_FORMAT: &str = "avfoundation";
#[cfg(target_os = "windows")]
const CAPTURE_FORMAT: &str = "dshow";
#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
const CAPTURE_FORMAT: &str = "video4linux2";

/// Opens capture devices and video files through libavdevice/libavformat.
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegCameraConnector;

impl FfmpegCameraConnector {
    pub fn new() -> Self {
        Self
    }
}

impl CameraConnector for FfmpegCameraConnector {
    fn open(
        &mut self,
        port: &str,
        resolution: (u32, u32),
    ) -> Result<Box<dyn FrameSource>, Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;

        let input = if Path::new(port).is_file() {
            log::info!("Opening video file {port}");
            ffmpeg_next::format::input(&port)?
        } else {
            open_device(port, resolution)?
        };
        Ok(Box::new(FfmpegFrameSource::new(input)?))
    }
}

/// Maps a port to the platform's device name: a bare index becomes
/// `/dev/videoN` on Linux and stays an index for AVFoundation; DirectShow
/// expects `video=<name>`.
fn device_name(port: &str) -> String {
    match port.parse::<u32>() {
        Ok(index) if cfg!(target_os = "linux") => format!("/dev/video{index}"),
        Ok(index) if cfg!(target_os = "windows") => format!("video={index}"),
        _ => port.to_string(),
    }
}

fn open_device(port: &str, resolution: (u32, u32)) -> Result<Input, Box<dyn std::error::Error>> {
    ffmpeg_next::device::register_all();

    let format = ffmpeg_next::device::input::video()
        .find(|f| f.name() == CAPTURE_FORMAT)
        .ok_or_else(|| format!("capture input format {CAPTURE_FORMAT} is not available"))?;

    let device = device_name(port);
    let mut options = ffmpeg_next::Dictionary::new();
    options.set("video_size", &format!("{}x{}", resolution.0, resolution.1));

    log::info!(
        "Opening capture device {device} via {CAPTURE_FORMAT} at {}x{}",
        resolution.0,
        resolution.1
    );
    let format = ffmpeg_next::format::format::Format::Input(format);
    match ffmpeg_next::format::open_with(&device, &format, options)? {
        Context::Input(input) => Ok(input),
        Context::Output(_) => Err(format!("{device} did not open as an input").into()),
    }
}

/// Decodes the best video stream of an input into RGB24 [`Frame`]s, one
/// per `read`.
pub struct FfmpegFrameSource {
    input: Option<Input>,
    decoder: ffmpeg_next::decoder::Video,
    scaler: Option<scaling::Context>,
    video_stream_index: usize,
    width: u32,
    height: u32,
    frame_index: usize,
    flushing: bool,
}

// Safety: FfmpegFrameSource is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegFrameSource {}

impl FfmpegFrameSource {
    fn new(input: Input) -> Result<Self, Box<dyn std::error::Error>> {
        let stream = input
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or("No video stream found")?;
        let video_stream_index = stream.index();
        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = codec_ctx.decoder().video()?;
        let (width, height) = (decoder.width(), decoder.height());

        log::info!(
            "Capture stream {video_stream_index}: {width}x{height} {:?}",
            decoder.format()
        );

        Ok(Self {
            input: Some(input),
            decoder,
            scaler: None,
            video_stream_index,
            width,
            height,
            frame_index: 0,
            flushing: false,
        })
    }

    fn try_receive(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        let mut decoded = Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }
        if (decoded.width(), decoded.height()) != (self.width, self.height) {
            return Err(format!(
                "decoded frame is {}x{}, stream is {}x{}",
                decoded.width(),
                decoded.height(),
                self.width,
                self.height
            )
            .into());
        }

        // Capture devices may only report their pixel format once decoding starts.
        if self.scaler.is_none() {
            self.scaler = Some(scaling::Context::get(
                decoded.format(),
                self.width,
                self.height,
                ffmpeg_next::format::Pixel::RGB24,
                self.width,
                self.height,
                scaling::Flags::BILINEAR,
            )?);
        }
        let Some(scaler) = self.scaler.as_mut() else {
            return Ok(None);
        };

        let mut rgb_frame = Video::empty();
        scaler.run(&decoded, &mut rgb_frame)?;
        let pixels = extract_rgb_pixels(&rgb_frame, self.width, self.height);
        let frame = Frame::try_new(
            pixels,
            self.width,
            self.height,
            PixelFormat::Rgb,
            self.frame_index,
        )?;
        self.frame_index += 1;
        Ok(Some(frame))
    }
}

impl FrameSource for FfmpegFrameSource {
    fn is_open(&self) -> bool {
        self.input.is_some()
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn read(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        if self.input.is_none() {
            return Ok(None);
        }
        if let Some(frame) = self.try_receive()? {
            return Ok(Some(frame));
        }
        if self.flushing {
            return Ok(None);
        }

        loop {
            let Some(input) = self.input.as_mut() else {
                return Ok(None);
            };
            let next = input
                .packets()
                .find(|(stream, _)| stream.index() == self.video_stream_index)
                .map(|(_, packet)| packet);

            let Some(packet) = next else {
                let _ = self.decoder.send_eof();
                self.flushing = true;
                return self.try_receive();
            };

            if let Err(e) = self.decoder.send_packet(&packet) {
                log::debug!("Dropping undecodable packet: {e}");
                continue;
            }
            if let Some(frame) = self.try_receive()? {
                return Ok(Some(frame));
            }
        }
    }

    fn release(&mut self) {
        if self.input.take().is_some() {
            log::debug!("Capture input released after {} frames", self.frame_index);
        }
        self.scaler = None;
    }
}

/// Packs plane 0 of an RGB24 frame into `width * height * 3` bytes,
/// dropping the row padding libswscale may add. Short rows are skipped, so
/// a malformed plane yields a buffer that [`Frame::try_new`] rejects.
fn extract_rgb_pixels(rgb_frame: &Video, width: u32, height: u32) -> Vec<u8> {
    let row_bytes = width as usize * 3;
    let stride = rgb_frame.stride(0).max(1);
    rgb_frame
        .data(0)
        .chunks(stride)
        .take(height as usize)
        .filter_map(|row| row.get(..row_bytes))
        .flatten()
        .copied()
        .collect()
}
