//! Detection gate: tracks whether a hand is in view and renders the annotated preview.

use embedded_graphics::text::Alignment;
use log::debug;
use shared::{DetectionResult, DetectionState};

use crate::overlay::{DisplaySurface, LANDMARK_COLOR, PLACEHOLDER_COLOR, TEXT_COLOR};
use crate::video::Frame;

const PLACEHOLDER: &str = "Move your hands in front of the camera";

pub struct DetectionGate {
    state: DetectionState,
    surface: DisplaySurface,
    frame: Option<Frame>,
}

impl DetectionGate {
    pub fn new(surface: DisplaySurface) -> Self {
        Self {
            state: DetectionState::default(),
            surface,
            frame: None,
        }
    }

    /// Processes the detector's result for `frame`.
    ///
    /// Replaces the detection state and redraws the preview in the same call, so the overlay
    /// always matches the frame under it. `recording` carries the running capture count while a
    /// session is active.
    pub fn on_detection_result(
        &mut self,
        frame: Frame,
        result: &DetectionResult,
        recording: Option<u64>,
    ) {
        self.state = DetectionState::from_result(result);
        debug!("Frame {}: {}", frame.sequence, self.state.status);

        self.surface.draw_frame(&frame);
        self.frame = Some(frame);
        self.render_overlay(result, recording);
        self.surface.present();
    }

    fn render_overlay(&mut self, result: &DetectionResult, recording: Option<u64>) {
        let width = self.surface.width() as i32;
        let height = self.surface.height() as i32;

        if result.hands.is_empty() {
            self.surface
                .draw_text(width / 2, height / 2, PLACEHOLDER, PLACEHOLDER_COLOR, Alignment::Center);
            return;
        }

        for hand in &result.hands {
            self.surface.draw_hand(hand);
        }

        if let Some(captures) = recording {
            self.surface.draw_text(
                width / 2,
                40,
                &format!("REC: {} captures", captures),
                LANDMARK_COLOR,
                Alignment::Center,
            );
        }

        let top = if recording.is_some() { 70 } else { 30 };
        self.surface.draw_text(
            15,
            top,
            &format!("Hands detected: {}", self.state.hands_detected),
            TEXT_COLOR,
            Alignment::Left,
        );
        for (index, hand) in result.hands.iter().enumerate() {
            self.surface.draw_text(
                15,
                top + 25 * (index as i32 + 1),
                &format!("{} ({:.1}%)", hand.handedness, hand.confidence * 100.0),
                TEXT_COLOR,
                Alignment::Left,
            );
        }
    }

    pub fn is_gate_open(&self) -> bool {
        self.state.hands_detected > 0
    }

    pub fn state(&self) -> &DetectionState {
        &self.state
    }

    /// The most recent source frame (without the overlay).
    pub fn current_frame(&self) -> Option<&Frame> {
        self.frame.as_ref()
    }

    pub fn surface(&self) -> &DisplaySurface {
        &self.surface
    }
}
