use std::fmt;
use std::time::Duration;

use uuid::Uuid;

use crate::shared::face_box::Point;
use crate::shared::frame::Frame;

/// Opaque identifier minted when a face session mounts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Last six characters of the id, for overlays and file names.
    pub fn short(&self) -> String {
        let full = self.0.simple().to_string();
        full[full.len() - 6..].to_string()
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The face currently being followed.
#[derive(Clone, Debug)]
pub struct FaceSession {
    pub id: SessionId,
    pub center: Point,
    pub last_seen_at: Duration,
    pub created_at: Duration,
}

impl FaceSession {
    pub fn age(&self, now: Duration) -> Duration {
        now.saturating_sub(self.created_at)
    }
}

/// Frames captured at the last positive detection.
#[derive(Clone, Debug)]
pub struct Snapshot {
    /// Square crop around the face, as handed to recognition.
    pub face_crop: Frame,
    pub full_frame: Frame,
}

/// Payload shared by mount and dismount events.
#[derive(Clone, Debug)]
pub struct Transition {
    pub session_id: SessionId,
    pub at: Duration,
    pub snapshot: Option<Snapshot>,
}

/// Lifecycle event emitted by the identity tracker.
#[derive(Clone, Debug)]
pub enum SessionEvent {
    Mount(Transition),
    Dismount(Transition),
}

impl SessionEvent {
    pub fn session_id(&self) -> SessionId {
        match self {
            SessionEvent::Mount(t) | SessionEvent::Dismount(t) => t.session_id,
        }
    }

    pub fn transition(&self) -> &Transition {
        match self {
            SessionEvent::Mount(t) | SessionEvent::Dismount(t) => t,
        }
    }

    pub fn is_mount(&self) -> bool {
        matches!(self, SessionEvent::Mount(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
    }

    #[test]
    fn test_short_is_suffix_of_simple_form() {
        let id = SessionId::new();
        let short = id.short();
        assert_eq!(short.len(), 6);
        assert!(id.to_string().replace('-', "").ends_with(&short));
    }

    #[test]
    fn test_event_accessors() {
        let id = SessionId::new();
        let event = SessionEvent::Dismount(Transition {
            session_id: id,
            at: Duration::from_secs(2),
            snapshot: None,
        });
        assert_eq!(event.session_id(), id);
        assert!(!event.is_mount());
        assert_eq!(event.transition().at, Duration::from_secs(2));
    }

    #[test]
    fn test_session_age_saturates() {
        let session = FaceSession {
            id: SessionId::new(),
            center: Point::new(0, 0),
            last_seen_at: Duration::from_secs(5),
            created_at: Duration::from_secs(5),
        };
        assert_eq!(session.age(Duration::from_secs(7)), Duration::from_secs(2));
        assert_eq!(session.age(Duration::from_secs(1)), Duration::ZERO);
    }
}
