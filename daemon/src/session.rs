//! The recording session state machine.
//!
//! ```text
//!          start() [hand in view]
//!   Idle ─────────────────────────► Active
//!    ▲                                │
//!    └──────── stop() / teardown ─────┘
//! ```

use log::info;
use shared::{CaptureError, RecordingInterval, SessionSnapshot, SessionStatus};
use std::time::SystemTime;
use uuid::Uuid;

#[derive(Debug)]
pub struct RecordingSession {
    id: Option<Uuid>,
    status: SessionStatus,
    interval: RecordingInterval,
    recording_label: String,
    captures_count: u64,
    started_at: Option<SystemTime>,
    /// Bumped on every start so work belonging to an earlier session can be told apart.
    generation: u64,
}

impl RecordingSession {
    pub fn new(interval: RecordingInterval, label: &str) -> Self {
        Self {
            id: None,
            status: SessionStatus::Idle,
            interval,
            recording_label: label.to_string(),
            captures_count: 0,
            started_at: None,
            generation: 0,
        }
    }

    /// Idle → Active. Requires a hand in view; the label is frozen for the whole session.
    pub fn start(&mut self, label: &str, hand_in_view: bool) -> Result<Uuid, CaptureError> {
        if self.is_active() {
            return Err(CaptureError::Validation("recording already active".to_string()));
        }
        if !hand_in_view {
            return Err(CaptureError::no_hand());
        }

        let id = Uuid::new_v4();
        self.id = Some(id);
        self.status = SessionStatus::Active;
        self.recording_label = label.to_string();
        self.captures_count = 0;
        self.started_at = Some(SystemTime::now());
        self.generation += 1;

        info!(
            "Recording session {} started: label {}, every {}ms",
            id,
            self.recording_label,
            self.interval.as_millis()
        );
        Ok(id)
    }

    /// Active → Idle. Returns the number of captures taken, or `None` if nothing was recording.
    pub fn stop(&mut self) -> Option<u64> {
        if !self.is_active() {
            return None;
        }
        self.status = SessionStatus::Idle;
        info!(
            "Recording session {} stopped after {} captures",
            self.id.map(|id| id.to_string()).unwrap_or_default(),
            self.captures_count
        );
        Some(self.captures_count)
    }

    /// Changes the capture interval. Ignored while a session is active.
    pub fn set_interval(&mut self, interval: RecordingInterval) -> bool {
        if self.is_active() {
            return false;
        }
        self.interval = interval;
        true
    }

    /// Counts a capture accepted for the session of `generation`.
    ///
    /// Captures that finish after a newer session has started are not counted against it.
    pub fn record_capture(&mut self, generation: u64) -> bool {
        if generation != self.generation {
            return false;
        }
        self.captures_count += 1;
        true
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    pub fn interval(&self) -> RecordingInterval {
        self.interval
    }

    pub fn recording_label(&self) -> &str {
        &self.recording_label
    }

    pub fn captures_count(&self) -> u64 {
        self.captures_count
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            status: self.status,
            interval: self.interval,
            recording_label: self.recording_label.clone(),
            captures_count: self.captures_count,
            started_at: self.started_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_requires_a_hand() {
        let mut session = RecordingSession::new(RecordingInterval::OneSecond, "A");
        let err = session.start("E", false).unwrap_err();

        assert_eq!(err, CaptureError::no_hand());
        assert!(!session.is_active());
        assert_eq!(session.recording_label(), "A");
        assert_eq!(session.generation(), 0);
    }

    #[test]
    fn start_resets_count_and_freezes_label() {
        let mut session = RecordingSession::new(RecordingInterval::OneSecond, "A");
        session.start("E", true).unwrap();
        session.record_capture(session.generation());
        session.record_capture(session.generation());
        assert_eq!(session.stop(), Some(2));

        session.start("I", true).unwrap();
        assert_eq!(session.captures_count(), 0);
        assert_eq!(session.recording_label(), "I");
        assert!(session.snapshot().started_at.is_some());
    }

    #[test]
    fn double_start_is_rejected() {
        let mut session = RecordingSession::new(RecordingInterval::OneSecond, "A");
        session.start("A", true).unwrap();
        assert!(matches!(session.start("E", true), Err(CaptureError::Validation(_))));
        assert_eq!(session.recording_label(), "A");
    }

    #[test]
    fn interval_is_frozen_while_active() {
        let mut session = RecordingSession::new(RecordingInterval::OneSecond, "A");
        assert!(session.set_interval(RecordingInterval::HalfSecond));

        session.start("A", true).unwrap();
        assert!(!session.set_interval(RecordingInterval::ThreeSeconds));
        assert_eq!(session.interval(), RecordingInterval::HalfSecond);

        session.stop();
        assert!(session.set_interval(RecordingInterval::ThreeSeconds));
    }

    #[test]
    fn stop_when_idle_is_a_no_op() {
        let mut session = RecordingSession::new(RecordingInterval::OneSecond, "A");
        assert_eq!(session.stop(), None);
    }

    #[test]
    fn captures_from_an_earlier_session_are_not_counted() {
        let mut session = RecordingSession::new(RecordingInterval::OneSecond, "A");
        session.start("A", true).unwrap();
        let first = session.generation();
        session.stop();
        session.start("E", true).unwrap();

        assert!(!session.record_capture(first));
        assert_eq!(session.captures_count(), 0);
    }
}
