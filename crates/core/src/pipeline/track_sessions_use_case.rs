use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;

use crate::detection::domain::face_detector::FaceDetector;
use crate::enrollment::domain::face_capture::FaceCapture;
use crate::recognition::domain::recognition_voter::{PollOutcome, RecognitionVoter};
use crate::recording::domain::recorder::{FinalizeOutcome, Recorder};
use crate::shared::clock::Clock;
use crate::shared::face_box::FaceBox;
use crate::shared::frame::Frame;
use crate::tracking::domain::identity_tracker::IdentityTracker;
use crate::tracking::domain::session::{SessionEvent, SessionId};
use crate::video::domain::video_reader::VideoReader;

use super::control::{ControlCommand, FrameObserver, FrameReport};
use super::session_logger::{Lifecycle, SessionLogger};

/// Drives detection, session tracking, recognition voting, recording and
/// face capture over a stream of frames.
///
/// Frames are processed strictly in order. On a frame that both ends and
/// starts a session, the old session is finalized before the new one
/// opens, so at most one tally and one clip exist at any time.
pub struct TrackSessionsUseCase {
    detector: Box<dyn FaceDetector>,
    tracker: IdentityTracker,
    voter: RecognitionVoter,
    recorder: Recorder,
    capture: FaceCapture,
    logger: Box<dyn SessionLogger>,
    bbox_scale: f64,
    quit_requested: bool,
}

impl TrackSessionsUseCase {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        detector: Box<dyn FaceDetector>,
        tracker: IdentityTracker,
        voter: RecognitionVoter,
        recorder: Recorder,
        capture: FaceCapture,
        logger: Box<dyn SessionLogger>,
        bbox_scale: f64,
    ) -> Self {
        Self {
            detector,
            tracker,
            voter,
            recorder,
            capture,
            logger,
            bbox_scale,
            quit_requested: false,
        }
    }

    pub fn tracker(&self) -> &IdentityTracker {
        &self.tracker
    }

    pub fn voter(&self) -> &RecognitionVoter {
        &self.voter
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    pub fn capture(&self) -> &FaceCapture {
        &self.capture
    }

    pub fn quit_requested(&self) -> bool {
        self.quit_requested
    }

    /// Processes one frame observed at stream time `now`.
    pub fn process_frame(&mut self, frame: &Frame, now: Duration) -> FrameReport {
        let start = Instant::now();
        let face = match self.detector.detect(frame) {
            Ok(face) => face,
            Err(e) => {
                log::warn!("Detection failed on frame {}: {e}", frame.index());
                None
            }
        };
        self.logger.timing("detect", elapsed_ms(start));

        let update = self.tracker.update(frame, face, now);
        for event in &update.events {
            match event {
                SessionEvent::Dismount(t) => self.end_session(t.session_id),
                SessionEvent::Mount(t) => self.start_session(t.session_id, frame),
            }
        }

        if let Some(id) = update.active {
            self.poll_recognition(id, now);

            let start = Instant::now();
            self.recorder.feed_frame(frame);
            self.logger.timing("record", elapsed_ms(start));
        }

        if face.is_some() {
            self.capture_face(now);
        }

        let bounding_box =
            face.map(|f| f.adjusted(self.bbox_scale, frame.width(), frame.height()));
        self.report(frame.index(), now, update.active, bounding_box, update.events)
    }

    /// Applies an operator command between frames.
    pub fn apply(&mut self, command: ControlCommand) {
        match command {
            ControlCommand::SetRecording(enabled) => self.set_recording(enabled),
            ControlCommand::ToggleRecording => self.set_recording(!self.recorder.is_enabled()),
            ControlCommand::SetRecognition(enabled) => self.voter.set_enabled(enabled),
            ControlCommand::ToggleRecognition => self.voter.set_enabled(!self.voter.is_enabled()),
            ControlCommand::ToggleCapture => {
                self.capture.toggle();
            }
            ControlCommand::NextPerson => {
                self.capture.next_person();
            }
            ControlCommand::PreviousPerson => {
                self.capture.previous_person();
            }
            ControlCommand::ReloadGallery => match self.voter.reload() {
                Ok(n) => self.logger.info(&format!("Gallery reloaded: {n} identities")),
                Err(e) => self
                    .logger
                    .info(&format!("Gallery reload failed, recognition disabled: {e}")),
            },
            ControlCommand::Quit => self.quit_requested = true,
        }
    }

    /// Ends the active session, if any. Call once the stream is exhausted.
    pub fn shutdown(&mut self, now: Duration) -> Option<SessionEvent> {
        let event = self.tracker.finish(now)?;
        self.end_session(event.session_id());
        Some(event)
    }

    /// Runs the loop until the reader is exhausted or `Quit` arrives.
    ///
    /// Pending commands are drained before each frame. Frames that fail to
    /// decode are skipped. Returns the number of frames processed.
    pub fn run(
        &mut self,
        reader: &mut dyn VideoReader,
        total_frames: usize,
        clock: &mut dyn Clock,
        commands: Option<&Receiver<ControlCommand>>,
        observer: &mut dyn FrameObserver,
    ) -> usize {
        let mut processed = 0;
        let mut last_now = Duration::ZERO;

        for item in reader.frames() {
            if let Some(rx) = commands {
                for command in rx.try_iter() {
                    self.apply(command);
                }
            }
            if self.quit_requested {
                log::info!("Quit requested, stopping after {processed} frames");
                break;
            }

            let frame = match item {
                Ok(frame) => frame,
                Err(e) => {
                    log::warn!("Skipping undecodable frame: {e}");
                    continue;
                }
            };

            let now = clock.now(&frame);
            last_now = now;
            let report = self.process_frame(&frame, now);
            observer.on_frame(&report);

            processed += 1;
            self.logger.progress(processed, total_frames);
        }

        self.shutdown(last_now);
        self.logger.summary();
        processed
    }

    fn start_session(&mut self, id: SessionId, frame: &Frame) {
        self.logger.lifecycle(Lifecycle::Mount);
        self.voter.open(id);
        self.recorder.on_mount(id, frame.width(), frame.height());
    }

    fn end_session(&mut self, id: SessionId) {
        self.logger.lifecycle(Lifecycle::Dismount);
        let label = self.voter.current_label(id).to_string();
        let outcome = self.recorder.on_dismount(id, &label);
        self.log_outcome(outcome);

        if let Some(tally) = self.voter.close(id) {
            let (votes, avg) = tally
                .majority_entry()
                .map(|e| (e.votes, e.average_confidence()))
                .unwrap_or((0, 0.0));
            self.logger.info(&format!(
                "Session {} ended as {} ({votes}/{} votes, avg confidence {avg:.2})",
                id.short(),
                tally.majority(),
                tally.total_votes()
            ));
        }
    }

    fn poll_recognition(&mut self, id: SessionId, now: Duration) {
        let start = Instant::now();
        let crop = self.tracker.snapshot().map(|s| &s.face_crop);
        let outcome = self.voter.poll(id, crop, now);
        match outcome {
            PollOutcome::Voted(_) => self.logger.timing("recognize", elapsed_ms(start)),
            PollOutcome::Failed => {
                self.logger.lifecycle(Lifecycle::RecognitionFailed);
                self.logger.info("Recognition disabled after recognizer failure");
            }
            _ => {}
        }
    }

    fn capture_face(&mut self, now: Duration) {
        if !self.capture.is_enabled() {
            return;
        }
        let Some(snapshot) = self.tracker.snapshot() else {
            return;
        };
        if self.capture.maybe_capture(&snapshot.face_crop, now).is_some() {
            self.logger.lifecycle(Lifecycle::FaceCaptured);
        }
    }

    fn set_recording(&mut self, enabled: bool) {
        let label = self
            .tracker
            .active_id()
            .map(|id| self.voter.current_label(id).to_string())
            .unwrap_or_default();
        let outcome = self.recorder.set_enabled(enabled, &label);
        self.log_outcome(outcome);
    }

    fn log_outcome(&mut self, outcome: Option<FinalizeOutcome>) {
        match outcome {
            Some(FinalizeOutcome::Kept { path, label, duration }) => {
                self.logger.lifecycle(Lifecycle::ClipKept);
                self.logger.info(&format!(
                    "Kept {:.1}s clip for {label}: {}",
                    duration.as_secs_f64(),
                    path.display()
                ));
            }
            Some(FinalizeOutcome::Discarded { .. }) => {
                self.logger.lifecycle(Lifecycle::ClipDiscarded);
            }
            Some(FinalizeOutcome::LeftInPlace { path, error }) => {
                self.logger.lifecycle(Lifecycle::ClipLeftInPlace);
                self.logger
                    .info(&format!("Clip left at {}: {error}", path.display()));
            }
            None => {}
        }
    }

    fn report(
        &self,
        frame_index: usize,
        timestamp: Duration,
        session_id: Option<SessionId>,
        bounding_box: Option<FaceBox>,
        events: Vec<SessionEvent>,
    ) -> FrameReport {
        FrameReport {
            frame_index,
            timestamp,
            session_id,
            bounding_box,
            label: session_id.map(|id| self.voter.current_label(id).to_string()),
            recording_enabled: self.recorder.is_enabled(),
            recognition_enabled: self.voter.is_enabled(),
            capture_enabled: self.capture.is_enabled(),
            person_index: self.capture.person_index(),
            is_recording: self.recorder.is_recording(),
            events,
        }
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
