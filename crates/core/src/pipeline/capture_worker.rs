//! Capture worker: owns the camera on a dedicated thread and runs the
//! read → detect → recognize → annotate → publish loop.
//!
//! The control thread only touches [`ControlState`] behind one mutex. The
//! worker sleeps on the paired condvar while paused or halted, and every
//! command notifies it, so transitions land within one frame period.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::pipeline::capture_error::CaptureError;
use crate::pipeline::frame_processor::FrameProcessor;
use crate::pipeline::frame_publisher::{Delivery, FramePublisher};
use crate::pipeline::pipeline_logger::{NullPipelineLogger, PipelineLogger};
use crate::pipeline::worker_state::{ControlState, WorkerState};
use crate::shared::region::Region;
use crate::shared::settings::Settings;
use crate::video::domain::frame_source::{CameraConnector, FrameSource};

/// What the worker needs to know about the camera.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub camera_port: String,
    pub camera_resolution: (u32, u32),
    /// Back-off after a read that produced no frame.
    pub read_retry_delay: Duration,
}

impl From<&Settings> for WorkerConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            camera_port: settings.camera_port.clone(),
            camera_resolution: settings.camera_resolution,
            read_retry_delay: settings.read_retry_delay(),
        }
    }
}

struct Control {
    state: Mutex<ControlState>,
    changed: Condvar,
}

impl Control {
    fn new() -> Self {
        Self {
            state: Mutex::new(ControlState::default()),
            changed: Condvar::new(),
        }
    }

    /// A panic on the worker thread never leaves the flags half-written,
    /// so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, ControlState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, transition: impl FnOnce(&mut ControlState) -> bool) -> bool {
        let changed = transition(&mut self.lock());
        if changed {
            self.changed.notify_all();
        }
        changed
    }

    /// Blocks while paused or halted. Returns false once stopped.
    fn wait_for_work(&self) -> bool {
        let guard = self.lock();
        let guard = self
            .changed
            .wait_while(guard, |s| s.is_suspended())
            .unwrap_or_else(PoisonError::into_inner);
        guard.active
    }

    /// Sleeps up to `delay`, waking early on any command that stops work.
    fn back_off(&self, delay: Duration) {
        let guard = self.lock();
        let _ = self
            .changed
            .wait_timeout_while(guard, delay, |s| s.is_working())
            .unwrap_or_else(PoisonError::into_inner);
    }

    fn is_working(&self) -> bool {
        self.lock().is_working()
    }
}

/// Clears the active flag when the worker thread ends, including by panic.
struct DeactivateOnExit(Arc<Control>);

impl Drop for DeactivateOnExit {
    fn drop(&mut self) {
        self.0.update(ControlState::stop);
    }
}

/// Collaborators consumed by the one session a worker runs.
struct Session {
    connector: Box<dyn CameraConnector>,
    processor: FrameProcessor,
    publisher: Box<dyn FramePublisher>,
    logger: Box<dyn PipelineLogger>,
}

/// One capture session. Construct, [`start`](Self::start), issue commands,
/// then [`stop`](Self::stop) and [`wait`](Self::wait). A worker is never
/// restarted once its session has run.
pub struct CaptureWorker {
    config: WorkerConfig,
    control: Arc<Control>,
    session: Option<Session>,
    handle: Option<JoinHandle<()>>,
    roi: Option<Region>,
}

impl CaptureWorker {
    pub fn new(
        config: WorkerConfig,
        connector: Box<dyn CameraConnector>,
        processor: FrameProcessor,
        publisher: Box<dyn FramePublisher>,
    ) -> Self {
        Self {
            config,
            control: Arc::new(Control::new()),
            session: Some(Session {
                connector,
                processor,
                publisher,
                logger: Box::new(NullPipelineLogger),
            }),
            handle: None,
            roi: None,
        }
    }

    /// Replaces the pipeline logger. Only effective before `start`.
    pub fn with_logger(mut self, logger: Box<dyn PipelineLogger>) -> Self {
        if let Some(session) = self.session.as_mut() {
            session.logger = logger;
        }
        self
    }

    /// Opens the camera on the calling thread and spawns the capture loop.
    ///
    /// Fails without entering the loop when the camera cannot be opened; the
    /// worker then stays stopped and `start` may be retried.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.control.lock().active {
            return Err(CaptureError::AlreadyRunning);
        }
        let session = self.session.as_mut().ok_or(CaptureError::SessionConsumed)?;

        let port = &self.config.camera_port;
        let mut source = session
            .connector
            .open(port, self.config.camera_resolution)
            .map_err(|e| CaptureError::CameraUnavailable {
                port: port.clone(),
                reason: e.to_string(),
            })?;
        if !source.is_open() {
            return Err(CaptureError::CameraUnavailable {
                port: port.clone(),
                reason: "source did not open".to_string(),
            });
        }

        let (width, height) = source.dimensions();
        let roi = match Region::region_of_interest(width as i64, height as i64) {
            Ok(roi) => roi,
            Err(e) => {
                source.release();
                return Err(e.into());
            }
        };

        let Some(session) = self.session.take() else {
            return Err(CaptureError::SessionConsumed);
        };
        self.control.lock().activate();

        let capture = CaptureLoop {
            control: self.control.clone(),
            source,
            frame_size: (width, height),
            roi,
            processor: session.processor,
            publisher: session.publisher,
            logger: session.logger,
            retry_delay: self.config.read_retry_delay,
        };
        let handle = thread::Builder::new()
            .name("capture-worker".to_string())
            .spawn(move || capture.run())
            .map_err(|e| {
                self.control.update(ControlState::stop);
                CaptureError::Spawn(e)
            })?;

        log::info!(
            "Capture worker started on {port} ({width}x{height}, ROI {}x{} at {},{})",
            roi.width,
            roi.height,
            roi.x,
            roi.y
        );
        self.handle = Some(handle);
        self.roi = Some(roi);
        Ok(())
    }

    pub fn pause(&self) {
        self.command("pause", ControlState::pause);
    }

    pub fn resume(&self) {
        self.command("resume", ControlState::resume);
    }

    pub fn halt(&self) {
        self.command("halt", ControlState::halt);
    }

    pub fn end_halt(&self) {
        self.command("end halt", ControlState::end_halt);
    }

    /// Asks the loop to exit after its current iteration. Does not join.
    pub fn stop(&self) {
        self.command("stop", ControlState::stop);
    }

    /// Joins the worker thread. Returns immediately if it was never started.
    pub fn wait(&mut self) -> Result<(), CaptureError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| CaptureError::WorkerPanicked),
            None => Ok(()),
        }
    }

    pub fn state(&self) -> WorkerState {
        self.control.lock().state()
    }

    pub fn is_halted(&self) -> bool {
        let state = self.control.lock();
        state.active && state.halted
    }

    pub fn is_running(&self) -> bool {
        self.control.lock().is_working()
    }

    /// Region searched for faces, known once the camera has opened.
    pub fn roi(&self) -> Option<Region> {
        self.roi
    }

    fn command(&self, name: &str, transition: fn(&mut ControlState) -> bool) {
        let mut state = self.control.lock();
        let was_active = state.active;
        let changed = transition(&mut state);
        let now = state.state();
        drop(state);

        if changed {
            self.control.changed.notify_all();
            log::info!("Capture worker {name}: now {now}");
        } else if !was_active {
            log::debug!("Ignoring {name}: capture worker is stopped");
        } else {
            log::debug!("Ignoring {name}: capture worker already {now}");
        }
    }
}

impl Drop for CaptureWorker {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop();
            if self.wait().is_err() {
                log::error!("Capture worker panicked");
            }
        }
    }
}

/// Result of one loop iteration.
#[derive(Debug)]
enum IterationOutcome {
    Published(usize),
    /// The source produced no frame.
    ReadFailed(Option<String>),
    /// A frame was processed but not delivered: the worker left the running
    /// state meanwhile, or the consumer went away.
    Skipped,
    Failed(String),
}

/// State owned by the worker thread.
struct CaptureLoop {
    control: Arc<Control>,
    source: Box<dyn FrameSource>,
    /// Dimensions the source reported at start; the ROI is derived from them.
    frame_size: (u32, u32),
    roi: Region,
    processor: FrameProcessor,
    publisher: Box<dyn FramePublisher>,
    logger: Box<dyn PipelineLogger>,
    retry_delay: Duration,
}

impl CaptureLoop {
    fn run(mut self) {
        let _deactivate = DeactivateOnExit(self.control.clone());
        let mut failed_reads = 0usize;

        while self.control.wait_for_work() {
            match self.iterate() {
                IterationOutcome::Published(_) => {
                    if failed_reads > 0 {
                        log::info!("Camera delivered a frame after {failed_reads} failed reads");
                        failed_reads = 0;
                    }
                }
                IterationOutcome::ReadFailed(reason) => {
                    failed_reads += 1;
                    let reason = reason.as_deref().unwrap_or("no frame");
                    if failed_reads == 1 {
                        log::warn!("Camera read failed: {reason}");
                    } else {
                        log::debug!("Camera read failed ({failed_reads} in a row): {reason}");
                    }
                    self.control.back_off(self.retry_delay);
                }
                IterationOutcome::Skipped => {
                    log::debug!("Discarding processed frame: not delivered");
                }
                IterationOutcome::Failed(e) => log::warn!("Frame processing failed: {e}"),
            }
        }

        self.source.release();
        self.logger.summary();
        log::info!("Capture worker stopped");
    }

    fn iterate(&mut self) -> IterationOutcome {
        let started = Instant::now();
        let frame = match self.source.read() {
            Ok(Some(frame)) => frame,
            Ok(None) => return IterationOutcome::ReadFailed(None),
            Err(e) => return IterationOutcome::ReadFailed(Some(e.to_string())),
        };
        self.logger.timing("read", elapsed_ms(started));

        let size = (frame.width(), frame.height());
        if size != self.frame_size {
            return IterationOutcome::Failed(format!(
                "frame {} is {}x{}, camera opened at {}x{}",
                frame.index(),
                size.0,
                size.1,
                self.frame_size.0,
                self.frame_size.1
            ));
        }

        let published = match self
            .processor
            .process(&frame, &self.roi, self.logger.as_mut())
        {
            Ok(published) => published,
            Err(e) => return IterationOutcome::Failed(e.to_string()),
        };

        if !self.control.is_working() {
            return IterationOutcome::Skipped;
        }

        let started = Instant::now();
        let sequence = published.sequence;
        let control = &self.control;
        match self.publisher.publish(published, &|| control.is_working()) {
            Ok(Delivery::Delivered) => {}
            Ok(Delivery::Withdrawn) => return IterationOutcome::Skipped,
            Err(e) => return IterationOutcome::Failed(format!("publish: {e}")),
        }
        self.logger.timing("publish", elapsed_ms(started));
        self.logger.frame(sequence);
        IterationOutcome::Published(sequence)
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}
