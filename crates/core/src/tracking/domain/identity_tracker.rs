use std::time::Duration;

use crate::shared::face_box::FaceBox;
use crate::shared::frame::Frame;
use crate::shared::session_config::SessionConfig;

use super::session::{FaceSession, SessionEvent, SessionId, Snapshot, Transition};

/// Result of feeding one frame to the tracker.
#[derive(Debug, Default)]
pub struct TrackerUpdate {
    pub active: Option<SessionId>,
    /// Lifecycle events in the order they must be handled. A face swap
    /// yields `Dismount(old)` followed by `Mount(new)`.
    pub events: Vec<SessionEvent>,
}

/// Single-target tracker deciding whether each detection continues the
/// current face session or starts a new one.
///
/// A detection continues the session when it arrives within the grace
/// window of the previous one and its centroid moved less than the shift
/// limit on both axes. Missing detections are tolerated for up to the grace
/// window before the session is dismounted.
pub struct IdentityTracker {
    grace_window: Duration,
    max_center_shift: i32,
    bbox_scale: f64,
    session: Option<FaceSession>,
    last_detection_at: Option<Duration>,
    snapshot: Option<Snapshot>,
}

impl IdentityTracker {
    pub fn new(grace_window: Duration, max_center_shift: i32, bbox_scale: f64) -> Self {
        Self {
            grace_window,
            max_center_shift,
            bbox_scale,
            session: None,
            last_detection_at: None,
            snapshot: None,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(
            config.grace_window(),
            config.max_center_shift_px,
            config.bbox_scale,
        )
    }

    pub fn active(&self) -> Option<&FaceSession> {
        self.session.as_ref()
    }

    pub fn active_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(|s| s.id)
    }

    /// Snapshot of the most recent detection of the active session.
    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    pub fn update(&mut self, frame: &Frame, face: Option<FaceBox>, now: Duration) -> TrackerUpdate {
        let Some(face) = face else {
            return self.update_without_detection(now);
        };

        let center = face.center();
        let crop_box = face.adjusted(self.bbox_scale, frame.width(), frame.height());
        let snapshot = Snapshot {
            face_crop: frame.crop(&crop_box),
            full_frame: frame.clone(),
        };

        let same_face = match (&self.session, self.last_detection_at) {
            (Some(session), Some(last)) => {
                now.saturating_sub(last) < self.grace_window
                    && session.center.is_near(&center, self.max_center_shift)
            }
            _ => false,
        };

        let mut events = Vec::new();
        if !same_face {
            events.extend(self.dismount(now));
            let id = SessionId::new();
            log::info!("Face session mounted: {id}");
            self.session = Some(FaceSession {
                id,
                center,
                last_seen_at: now,
                created_at: now,
            });
            events.push(SessionEvent::Mount(Transition {
                session_id: id,
                at: now,
                snapshot: Some(snapshot.clone()),
            }));
        }

        if let Some(session) = self.session.as_mut() {
            session.center = center;
            session.last_seen_at = now;
        }
        self.last_detection_at = Some(now);
        self.snapshot = Some(snapshot);

        TrackerUpdate {
            active: self.active_id(),
            events,
        }
    }

    /// Ends the active session at end of stream.
    pub fn finish(&mut self, now: Duration) -> Option<SessionEvent> {
        self.dismount(now)
    }

    fn update_without_detection(&mut self, now: Duration) -> TrackerUpdate {
        let expired = match self.last_detection_at {
            Some(last) => now.saturating_sub(last) > self.grace_window,
            None => true,
        };
        if !expired {
            return TrackerUpdate {
                active: self.active_id(),
                events: Vec::new(),
            };
        }
        TrackerUpdate {
            active: None,
            events: self.dismount(now).into_iter().collect(),
        }
    }

    fn dismount(&mut self, now: Duration) -> Option<SessionEvent> {
        let session = self.session.take()?;
        log::info!("Face session dismounted: {}", session.id);
        Some(SessionEvent::Dismount(Transition {
            session_id: session.id,
            at: now,
            snapshot: self.snapshot.take(),
        }))
    }
}
