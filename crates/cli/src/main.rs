use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::process;
use std::str::FromStr;
use std::thread;

use clap::Parser;
use crossbeam_channel::{select, Receiver};

use facewatch_core::identity::infrastructure::json_identity_store::JsonIdentityStore;
use facewatch_core::pipeline::capture_worker::{CaptureWorker, WorkerConfig};
use facewatch_core::pipeline::frame_processor::FrameProcessor;
use facewatch_core::pipeline::frame_publisher::PublishedFrame;
use facewatch_core::pipeline::infrastructure::channel_publisher::ChannelPublisher;
use facewatch_core::pipeline::pipeline_logger::StdoutPipelineLogger;
use facewatch_core::shared::model_resolver;
use facewatch_core::shared::settings::Settings;
use facewatch_core::video::domain::frame_source::CameraConnector;
use facewatch_core::video::infrastructure::ffmpeg_frame_source::FfmpegCameraConnector;
use facewatch_core::video::infrastructure::image_sequence_source::ImageSequenceConnector;

/// Published frames buffered between the worker and this front end.
const FRAME_QUEUE: usize = 4;

/// Live face detection and recognition from a camera.
///
/// Commands are read from stdin, one per line: pause, resume, halt,
/// endhalt, stop. End of input stops the capture.
#[derive(Parser)]
#[command(name = "facewatch")]
struct Cli {
    /// Camera device, device index, video file, or directory of images.
    #[arg(long)]
    source: Option<String>,

    /// Settings file (defaults to the user config directory).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Requested camera resolution, e.g. 640x480.
    #[arg(long, value_parser = parse_size)]
    resolution: Option<(u32, u32)>,

    /// Size published frames are fitted into, e.g. 1280x720.
    #[arg(long, value_parser = parse_size)]
    display: Option<(u32, u32)>,

    /// Smallest face searched for, e.g. 30x30.
    #[arg(long, value_parser = parse_size)]
    min_face: Option<(u32, u32)>,

    /// OpenCV Haar cascade XML (the stock frontal-face cascade by default).
    #[arg(long)]
    cascade: Option<PathBuf>,

    /// Trained LBPH recognizer model (OpenCV FileStorage XML).
    #[arg(long)]
    recognizer: Option<PathBuf>,

    /// JSON file of user records.
    #[arg(long)]
    identities: Option<PathBuf>,

    /// Directory to write published frames to as PNG.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Stop after this many published frames.
    #[arg(long)]
    max_frames: Option<usize>,

    /// Play an image directory once instead of looping it.
    #[arg(long)]
    no_loop: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Pause,
    Resume,
    Halt,
    EndHalt,
    Stop,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pause" => Ok(Command::Pause),
            "resume" => Ok(Command::Resume),
            "halt" => Ok(Command::Halt),
            "endhalt" | "end_halt" | "end-halt" => Ok(Command::EndHalt),
            "stop" | "quit" => Ok(Command::Stop),
            other => Err(format!(
                "Unknown command '{other}' (expected pause, resume, halt, endhalt, stop)"
            )),
        }
    }
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = build_settings(&cli);
    validate(&cli, &settings)?;

    log::info!("Resolving face cascade");
    let cascade_path = model_resolver::resolve_cascade(
        settings.cascade_path.as_deref(),
        Some(Box::new(download_progress)),
    )?;

    let identities = JsonIdentityStore::load(&settings.identity_store_path)?;
    let processor = FrameProcessor::load(&settings, &cascade_path, Box::new(identities))?;

    let (tx, frames) = crossbeam_channel::bounded(FRAME_QUEUE);
    let mut worker = CaptureWorker::new(
        WorkerConfig::from(&settings),
        open_connector(&settings.camera_port, !cli.no_loop),
        processor,
        Box::new(ChannelPublisher::new(tx)),
    )
    .with_logger(Box::new(StdoutPipelineLogger::default()));

    worker.start()?;
    let commands = spawn_command_reader();
    let outcome = drive(&worker, &frames, &commands, cli.output.as_deref(), cli.max_frames);

    // Releases a worker blocked on a full channel before joining it
    drop(frames);
    worker.stop();
    worker.wait()?;
    outcome
}

/// Consumes published frames and forwards stdin commands until the session
/// should end.
fn drive(
    worker: &CaptureWorker,
    frames: &Receiver<PublishedFrame>,
    commands: &Receiver<Command>,
    output: Option<&Path>,
    max_frames: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut published = 0usize;
    loop {
        select! {
            recv(frames) -> msg => {
                let Ok(frame) = msg else {
                    log::warn!("Capture worker exited");
                    return Ok(());
                };
                report(&frame);
                if let Some(dir) = output {
                    save_frame(dir, &frame)?;
                }
                published += 1;
                if max_frames.is_some_and(|max| published >= max) {
                    log::info!("Reached {published} frames");
                    return Ok(());
                }
            }
            recv(commands) -> msg => match msg {
                Ok(Command::Pause) => worker.pause(),
                Ok(Command::Resume) => worker.resume(),
                Ok(Command::Halt) => worker.halt(),
                Ok(Command::EndHalt) => worker.end_halt(),
                Ok(Command::Stop) => return Ok(()),
                Err(_) => {
                    log::info!("End of input, stopping capture");
                    return Ok(());
                }
            },
        }
    }
}

/// Reads commands from stdin on a detached thread. The channel closes at
/// end of input.
fn spawn_command_reader() -> Receiver<Command> {
    let (tx, rx) = crossbeam_channel::unbounded();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<Command>() {
                Ok(command) => {
                    if tx.send(command).is_err() || command == Command::Stop {
                        break;
                    }
                }
                Err(e) => log::warn!("{e}"),
            }
        }
    });
    rx
}

fn report(frame: &PublishedFrame) {
    for face in &frame.faces {
        match (&face.identity, face.confidence) {
            (Some(user), Some(confidence)) => log::info!(
                "Frame {}: {} (id {}, confidence {confidence})",
                frame.sequence,
                user.fullname,
                user.id
            ),
            _ => log::debug!("Frame {}: unrecognized face at {:?}", frame.sequence, face.region),
        }
    }
}

fn save_frame(dir: &Path, frame: &PublishedFrame) -> Result<(), Box<dyn std::error::Error>> {
    let path = dir.join(format!("frame_{:06}.png", frame.sequence));
    frame.image.save(&path)?;
    Ok(())
}

fn open_connector(port: &str, looping: bool) -> Box<dyn CameraConnector> {
    if Path::new(port).is_dir() {
        Box::new(ImageSequenceConnector::new(looping))
    } else {
        Box::new(FfmpegCameraConnector::new())
    }
}

fn build_settings(cli: &Cli) -> Settings {
    let mut settings = match &cli.settings {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    if let Some(source) = &cli.source {
        settings.camera_port = source.clone();
    }
    if let Some(resolution) = cli.resolution {
        settings.camera_resolution = resolution;
    }
    if let Some(display) = cli.display {
        settings.display_size = Some(display);
    }
    if let Some((w, h)) = cli.min_face {
        settings.detection.min_width = w as f64;
        settings.detection.min_height = h as f64;
    }
    if let Some(cascade) = &cli.cascade {
        settings.cascade_path = Some(cascade.clone());
    }
    if let Some(recognizer) = &cli.recognizer {
        settings.recognizer_path = recognizer.clone();
    }
    if let Some(identities) = &cli.identities {
        settings.identity_store_path = identities.clone();
    }
    settings
}

fn validate(cli: &Cli, settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(settings_path) = &cli.settings {
        if !settings_path.is_file() {
            return Err(format!("Settings file not found: {}", settings_path.display()).into());
        }
    }
    if !settings.recognizer_path.is_file() {
        return Err(format!(
            "Recognizer model not found: {}",
            settings.recognizer_path.display()
        )
        .into());
    }
    if !settings.identity_store_path.is_file() {
        return Err(format!(
            "Identity store not found: {}",
            settings.identity_store_path.display()
        )
        .into());
    }
    if cli.max_frames == Some(0) {
        return Err("Max frames must be at least 1".into());
    }
    if let Some(dir) = &cli.output {
        std::fs::create_dir_all(dir)
            .map_err(|e| format!("Cannot create output directory {}: {e}", dir.display()))?;
    }
    Ok(())
}

fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
    let w: u32 = w.trim().parse().map_err(|_| format!("invalid width in '{s}'"))?;
    let h: u32 = h.trim().parse().map_err(|_| format!("invalid height in '{s}'"))?;
    if w == 0 || h == 0 {
        return Err(format!("size must be positive, got '{s}'"));
    }
    Ok((w, h))
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading face cascade... {pct}%");
    } else {
        eprint!("\rDownloading face cascade... {downloaded} bytes");
    }
    if total > 0 && downloaded >= total {
        eprintln!();
    }
}
