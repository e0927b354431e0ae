use std::collections::HashMap;
use std::time::Duration;

use crate::recognition::domain::face_recognizer::FaceRecognizer;
use crate::recognition::domain::vote_tally::VoteTally;
use crate::shared::constants::UNKNOWN_LABEL;
use crate::shared::frame::Frame;
use crate::shared::session_config::SessionConfig;
use crate::tracking::domain::session::SessionId;

/// What a call to [`RecognitionVoter::poll`] did.
#[derive(Clone, Debug, PartialEq)]
pub enum PollOutcome {
    Disabled,
    /// No tally is open for the session.
    NoSession,
    NotDue,
    /// The poll slot was used but there was no usable crop.
    NoCrop,
    /// A vote was cast for this label.
    Voted(String),
    /// The recognizer failed; recognition is now disabled.
    Failed,
}

/// Rate-limited majority voting over recognizer predictions, one tally per
/// session.
pub struct RecognitionVoter {
    recognizer: Box<dyn FaceRecognizer>,
    tallies: HashMap<SessionId, VoteTally>,
    poll_interval: Duration,
    acceptance_threshold: f64,
    enabled: bool,
}

impl RecognitionVoter {
    pub fn new(
        recognizer: Box<dyn FaceRecognizer>,
        poll_interval: Duration,
        acceptance_threshold: f64,
        enabled: bool,
    ) -> Self {
        Self {
            recognizer,
            tallies: HashMap::new(),
            poll_interval,
            acceptance_threshold,
            enabled,
        }
    }

    pub fn from_config(recognizer: Box<dyn FaceRecognizer>, config: &SessionConfig) -> Self {
        Self::new(
            recognizer,
            config.poll_interval(),
            config.acceptance_threshold,
            config.recognition_enabled,
        )
    }

    /// Starts a fresh tally for a newly mounted session.
    pub fn open(&mut self, session_id: SessionId) {
        self.tallies.insert(session_id, VoteTally::new());
    }

    /// Removes and returns the tally of a dismounted session.
    pub fn close(&mut self, session_id: SessionId) -> Option<VoteTally> {
        self.tallies.remove(&session_id)
    }

    pub fn tally(&self, session_id: SessionId) -> Option<&VoteTally> {
        self.tallies.get(&session_id)
    }

    pub fn open_sessions(&self) -> usize {
        self.tallies.len()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            log::info!("Recognition {}", if enabled { "enabled" } else { "disabled" });
        }
        self.enabled = enabled;
    }

    /// Majority label of the session, or `"unknown"` when it has no votes.
    pub fn current_label(&self, session_id: SessionId) -> &str {
        self.tallies
            .get(&session_id)
            .map_or(UNKNOWN_LABEL, |t| t.majority())
    }

    /// Casts at most one vote per poll interval for the session.
    ///
    /// Predictions at or below the acceptance threshold count as a vote for
    /// `"unknown"`. A recognizer error disables recognition until it is
    /// re-enabled.
    pub fn poll(
        &mut self,
        session_id: SessionId,
        face_crop: Option<&Frame>,
        now: Duration,
    ) -> PollOutcome {
        if !self.enabled {
            return PollOutcome::Disabled;
        }
        let Some(tally) = self.tallies.get_mut(&session_id) else {
            return PollOutcome::NoSession;
        };
        if !tally.is_due(now, self.poll_interval) {
            return PollOutcome::NotDue;
        }
        tally.mark_polled(now);

        let Some(crop) = face_crop.filter(|c| !c.is_empty()) else {
            return PollOutcome::NoCrop;
        };

        match self.recognizer.predict(crop) {
            Ok(prediction) => {
                let label = if prediction.normalized_confidence > self.acceptance_threshold {
                    prediction.label
                } else {
                    UNKNOWN_LABEL.to_string()
                };
                tally.record(&label, prediction.raw_confidence);
                log::debug!(
                    "Session {}: vote {} ({:.1}), majority {}",
                    session_id.short(),
                    label,
                    prediction.normalized_confidence,
                    tally.majority()
                );
                PollOutcome::Voted(label)
            }
            Err(e) => {
                log::warn!("Recognition failed, disabling: {e}");
                self.enabled = false;
                PollOutcome::Failed
            }
        }
    }

    /// Rebuilds the recognizer's known identities.
    ///
    /// Recognition is enabled when the reload succeeds and disabled when it
    /// fails.
    pub fn reload(&mut self) -> Result<usize, Box<dyn std::error::Error>> {
        match self.recognizer.reload() {
            Ok(count) => {
                log::info!("Reloaded {count} known identities");
                self.set_enabled(true);
                Ok(count)
            }
            Err(e) => {
                log::warn!("Reload failed, disabling recognition: {e}");
                self.set_enabled(false);
                Err(e)
            }
        }
    }
}
