use std::collections::BTreeMap;
use std::time::Instant;

/// Cross-cutting logger for capture loop events.
///
/// Lets each front end observe the loop (stdout summary, test recorders)
/// without the worker knowing how events are reported.
pub trait PipelineLogger: Send {
    /// Report that a frame was published. Live capture has no known total.
    fn frame(&mut self, sequence: usize);

    /// Record how long a named stage took for one frame.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Record a point-in-time metric (e.g. faces per frame).
    fn metric(&mut self, name: &str, value: f64);

    /// Emit an end-of-session summary. Default: no-op.
    fn summary(&self) {}
}

/// Silent logger that discards all events.
pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn frame(&mut self, _sequence: usize) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
}

/// Running count, sum and peak of one series.
///
/// A capture session can run for hours, so samples are folded in rather
/// than stored.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Aggregate {
    pub count: usize,
    pub total: f64,
    pub max: f64,
}

impl Aggregate {
    fn add(&mut self, value: f64) {
        self.count += 1;
        self.total += value;
        self.max = if self.count == 1 {
            value
        } else {
            self.max.max(value)
        };
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total / self.count as f64
        }
    }
}

/// CLI-oriented logger: per-stage timing and metric aggregates, periodic
/// progress through `log`, and a summary when the session ends.
///
/// Progress is logged every `throttle_frames` published frames.
pub struct StdoutPipelineLogger {
    throttle_frames: usize,
    timings: BTreeMap<String, Aggregate>,
    metrics: BTreeMap<String, Aggregate>,
    started: Instant,
    frames: usize,
    last_sequence: Option<usize>,
}

impl StdoutPipelineLogger {
    pub fn new(throttle_frames: usize) -> Self {
        Self {
            throttle_frames: throttle_frames.max(1),
            timings: BTreeMap::new(),
            metrics: BTreeMap::new(),
            started: Instant::now(),
            frames: 0,
            last_sequence: None,
        }
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Capture sequence number of the most recently published frame.
    pub fn last_sequence(&self) -> Option<usize> {
        self.last_sequence
    }

    pub fn timings_for(&self, stage: &str) -> Option<Aggregate> {
        self.timings.get(stage).copied()
    }

    pub fn metrics_for(&self, name: &str) -> Option<Aggregate> {
        self.metrics.get(name).copied()
    }

    /// Formatted session summary, or `None` before anything was recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.timings.is_empty() && self.metrics.is_empty() {
            return None;
        }
        let elapsed_s = self.started.elapsed().as_secs_f64();
        let mut lines = vec![format!(
            "Capture summary ({} frames published in {elapsed_s:.1}s):",
            self.frames
        )];

        for (stage, agg) in &self.timings {
            lines.push(format!(
                "  {stage:10} avg {:6.1}ms  max {:6.1}ms  ({} samples)",
                agg.mean(),
                agg.max,
                agg.count
            ));
        }
        for (name, agg) in &self.metrics {
            lines.push(format!("  {name}: avg {:.1}, max {:.0}", agg.mean(), agg.max));
        }
        if self.frames > 0 && elapsed_s > 0.0 {
            lines.push(format!(
                "  Published {:.1} frames/s",
                self.frames as f64 / elapsed_s
            ));
        }
        Some(lines.join("\n"))
    }
}

impl Default for StdoutPipelineLogger {
    fn default() -> Self {
        Self::new(100)
    }
}

impl PipelineLogger for StdoutPipelineLogger {
    fn frame(&mut self, sequence: usize) {
        self.frames += 1;
        self.last_sequence = Some(sequence);
        if self.frames % self.throttle_frames == 0 {
            log::info!("Published {} frames (capture #{sequence})", self.frames);
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .add(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics.entry(name.to_string()).or_default().add(value);
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n{text}");
        }
    }
}
