use std::collections::HashMap;
use std::time::Instant;

/// Countable things that happen during a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Lifecycle {
    Mount,
    Dismount,
    ClipKept,
    ClipDiscarded,
    ClipLeftInPlace,
    FaceCaptured,
    RecognitionFailed,
}

impl Lifecycle {
    fn label(self) -> &'static str {
        match self {
            Lifecycle::Mount => "mounts",
            Lifecycle::Dismount => "dismounts",
            Lifecycle::ClipKept => "clips kept",
            Lifecycle::ClipDiscarded => "clips discarded",
            Lifecycle::ClipLeftInPlace => "clips left in temp",
            Lifecycle::FaceCaptured => "faces captured",
            Lifecycle::RecognitionFailed => "recognition failures",
        }
    }
}

/// Cross-cutting logger for session loop events.
///
/// Decouples the orchestrator from specific output mechanisms so each
/// caller can observe a run without changing the orchestration code.
pub trait SessionLogger: Send {
    /// Report frame-level progress. `total` is 0 for live sources.
    fn progress(&mut self, current: usize, total: usize);

    /// Record how long a named stage took for one frame.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Count a lifecycle event.
    fn lifecycle(&mut self, event: Lifecycle);

    /// Log a human-readable status message.
    fn info(&mut self, message: &str);

    /// Emit an end-of-run summary. Default: no-op.
    fn summary(&self) {}
}

/// Silent logger that discards all events.
pub struct NullSessionLogger;

impl SessionLogger for NullSessionLogger {
    fn progress(&mut self, _current: usize, _total: usize) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn lifecycle(&mut self, _event: Lifecycle) {}
    fn info(&mut self, _message: &str) {}
}

/// CLI-oriented logger that tracks per-stage timing and lifecycle counts,
/// with a summary report at the end of the run.
///
/// Progress output is throttled to every `throttle_frames` frames.
pub struct StdoutSessionLogger {
    throttle_frames: usize,
    timings: HashMap<String, Vec<f64>>,
    counts: HashMap<Lifecycle, usize>,
    start_time: Instant,
    frames_seen: usize,
    messages: Vec<String>,
}

impl StdoutSessionLogger {
    pub fn new(throttle_frames: usize) -> Self {
        Self {
            throttle_frames: throttle_frames.max(1),
            timings: HashMap::new(),
            counts: HashMap::new(),
            start_time: Instant::now(),
            frames_seen: 0,
            messages: Vec::new(),
        }
    }

    pub fn count(&self, event: Lifecycle) -> usize {
        self.counts.get(&event).copied().unwrap_or(0)
    }

    /// Returns the timing data for a given stage.
    pub fn timings_for(&self, stage: &str) -> Option<&[f64]> {
        self.timings.get(stage).map(|v| v.as_slice())
    }

    /// Returns the formatted summary, or `None` if nothing was processed.
    pub fn summary_string(&self) -> Option<String> {
        if self.frames_seen == 0 && self.timings.is_empty() && self.counts.is_empty() {
            return None;
        }

        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        let frames = self.frames_seen;
        let mut lines = Vec::new();

        lines.push(format!(
            "Session summary ({frames} frames, {:.1}s total):",
            elapsed_ms / 1000.0
        ));

        let mut stages: Vec<_> = self.timings.keys().collect();
        stages.sort();
        for stage in stages {
            let durations = &self.timings[stage];
            let total_ms: f64 = durations.iter().sum();
            let avg_ms = if durations.is_empty() {
                0.0
            } else {
                total_ms / durations.len() as f64
            };
            lines.push(format!(
                "  {stage:12}: avg {avg_ms:6.1}ms  total {total_ms:7.0}ms  ({} calls)",
                durations.len()
            ));
        }

        let mut events: Vec<_> = self.counts.iter().collect();
        events.sort();
        for (event, count) in events {
            lines.push(format!("  {}: {count}", event.label()));
        }

        if frames > 0 && elapsed_ms > 0.0 {
            let fps = frames as f64 / (elapsed_ms / 1000.0);
            lines.push(format!("  Throughput: {fps:.1} fps"));
        }

        Some(lines.join("\n"))
    }
}

impl Default for StdoutSessionLogger {
    fn default() -> Self {
        Self::new(100)
    }
}

impl SessionLogger for StdoutSessionLogger {
    fn progress(&mut self, current: usize, total: usize) {
        self.frames_seen = self.frames_seen.max(current);
        if total > 0 {
            if current % self.throttle_frames == 0 || current == total {
                let pct = current as f64 / total as f64 * 100.0;
                log::info!("Processing: {current}/{total} frames ({pct:.1}%)");
            }
        } else if current % self.throttle_frames == 0 {
            log::info!("Processing: {current} frames");
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .push(duration_ms);
    }

    fn lifecycle(&mut self, event: Lifecycle) {
        *self.counts.entry(event).or_insert(0) += 1;
    }

    fn info(&mut self, message: &str) {
        self.messages.push(message.to_string());
        log::info!("{message}");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_null_logger_all_methods_are_noop() {
        let mut logger = NullSessionLogger;
        logger.progress(1, 10);
        logger.timing("detect", 5.0);
        logger.lifecycle(Lifecycle::Mount);
        logger.info("hello");
        logger.summary();
    }

    #[test]
    fn test_timing_records_values() {
        let mut logger = StdoutSessionLogger::new(10);
        logger.timing("detect", 20.0);
        logger.timing("detect", 30.0);
        logger.timing("recognize", 5.0);

        let detect = logger.timings_for("detect").unwrap();
        assert_eq!(detect.len(), 2);
        assert_relative_eq!(detect[1], 30.0);
        assert_eq!(logger.timings_for("recognize").unwrap().len(), 1);
        assert!(logger.timings_for("record").is_none());
    }

    #[test]
    fn test_lifecycle_counts() {
        let mut logger = StdoutSessionLogger::new(10);
        logger.lifecycle(Lifecycle::Mount);
        logger.lifecycle(Lifecycle::Mount);
        logger.lifecycle(Lifecycle::Dismount);
        assert_eq!(logger.count(Lifecycle::Mount), 2);
        assert_eq!(logger.count(Lifecycle::Dismount), 1);
        assert_eq!(logger.count(Lifecycle::ClipKept), 0);
    }

    #[test]
    fn test_summary_includes_stages_and_counts() {
        let mut logger = StdoutSessionLogger::new(10);
        logger.progress(10, 0);
        logger.timing("detect", 20.0);
        logger.lifecycle(Lifecycle::ClipKept);

        let summary = logger.summary_string().unwrap();
        assert!(summary.contains("Session summary (10 frames"));
        assert!(summary.contains("detect"));
        assert!(summary.contains("clips kept: 1"));
        assert!(summary.contains("fps"));
    }

    #[test]
    fn test_empty_summary_returns_none() {
        let logger = StdoutSessionLogger::new(10);
        assert!(logger.summary_string().is_none());
    }

    #[test]
    fn test_progress_tracks_frames_for_live_sources() {
        let mut logger = StdoutSessionLogger::new(10);
        for i in 1..=25 {
            logger.progress(i, 0);
        }
        assert_eq!(logger.frames_seen, 25);
    }

    #[test]
    fn test_info_stores_messages() {
        let mut logger = StdoutSessionLogger::new(10);
        logger.info("hello world");
        assert_eq!(logger.messages, vec!["hello world".to_string()]);
    }

    #[test]
    fn test_default_throttle() {
        assert_eq!(StdoutSessionLogger::default().throttle_frames, 100);
    }
}
