//! Input handling module
//!
//! Maps keyboard and gamepad input to the fixed yaw, recentering and quit.

use gilrs::{Axis, Button, Event, EventType, Gilrs};
use log::{debug, info};
use winit::event::{ElementState, KeyEvent};
use winit::keyboard::{Key, NamedKey};

const STICK_DEADZONE: f32 = 0.1;

/// Input collected since the last frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameInput {
    /// Turn direction in [-1, 1]; positive turns left.
    pub turn: f32,
    pub recenter: bool,
}

pub struct InputState {
    gilrs: Option<Gilrs>,
    turn_left: bool,
    turn_right: bool,
    right_stick_x: f32,
    recenter_requested: bool,
    quit_requested: bool,
}

impl InputState {
    pub fn new() -> Self {
        let gilrs = match Gilrs::new() {
            Ok(g) => {
                info!("Gamepad system initialized");
                Some(g)
            }
            Err(e) => {
                info!("No gamepad support: {:?}", e);
                None
            }
        };
        Self::with_gamepads(gilrs)
    }

    fn with_gamepads(gilrs: Option<Gilrs>) -> Self {
        Self {
            gilrs,
            turn_left: false,
            turn_right: false,
            right_stick_x: 0.0,
            recenter_requested: false,
            quit_requested: false,
        }
    }

    /// Poll for gamepad events
    pub fn update(&mut self) {
        // Collect events first to avoid borrow checker issues
        let events: Vec<_> = match &mut self.gilrs {
            Some(gilrs) => std::iter::from_fn(|| gilrs.next_event())
                .map(|Event { event, .. }| event)
                .collect(),
            None => Vec::new(),
        };

        for event in events {
            match event {
                EventType::ButtonPressed(button, _) => self.handle_button(button, true),
                EventType::ButtonReleased(button, _) => self.handle_button(button, false),
                EventType::AxisChanged(axis, value, _) => self.handle_axis(axis, value),
                EventType::Disconnected => {
                    info!("Gamepad disconnected");
                    self.right_stick_x = 0.0;
                }
                _ => {}
            }
        }
    }

    fn handle_button(&mut self, button: Button, pressed: bool) {
        match button {
            Button::LeftThumb if pressed => self.request_recenter(),
            Button::DPadLeft => self.turn_left = pressed,
            Button::DPadRight => self.turn_right = pressed,
            _ => {}
        }
    }

    fn handle_axis(&mut self, axis: Axis, value: f32) {
        let value = if value.abs() < STICK_DEADZONE { 0.0 } else { value };
        if axis == Axis::RightStickX {
            self.right_stick_x = value;
        }
    }

    pub fn handle_keyboard_input(&mut self, event: &KeyEvent) {
        self.handle_key(&event.logical_key, event.state == ElementState::Pressed);
    }

    fn handle_key(&mut self, key: &Key, pressed: bool) {
        match key {
            Key::Named(NamedKey::ArrowLeft) => self.turn_left = pressed,
            Key::Named(NamedKey::ArrowRight) => self.turn_right = pressed,
            Key::Named(NamedKey::Escape) if pressed => self.quit_requested = true,
            Key::Character(c) if pressed && c.eq_ignore_ascii_case("r") => self.request_recenter(),
            _ => {}
        }
    }

    fn request_recenter(&mut self) {
        debug!("Recenter requested");
        self.recenter_requested = true;
    }

    pub fn quit_requested(&self) -> bool {
        self.quit_requested
    }

    /// Current turn input and any recenter request since the last call.
    pub fn take_frame_input(&mut self) -> FrameInput {
        let keys = f32::from(u8::from(self.turn_left)) - f32::from(u8::from(self.turn_right));
        FrameInput {
            turn: (keys - self.right_stick_x).clamp(-1.0, 1.0),
            recenter: std::mem::take(&mut self.recenter_requested),
        }
    }
}

impl Default for InputState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> InputState {
        InputState::with_gamepads(None)
    }

    #[test]
    fn test_held_arrow_keys_turn() {
        let mut state = input();
        state.handle_key(&Key::Named(NamedKey::ArrowLeft), true);
        assert_eq!(state.take_frame_input().turn, 1.0);
        // Still held on the next frame.
        assert_eq!(state.take_frame_input().turn, 1.0);
        state.handle_key(&Key::Named(NamedKey::ArrowRight), true);
        assert_eq!(state.take_frame_input().turn, 0.0);
        state.handle_key(&Key::Named(NamedKey::ArrowLeft), false);
        assert_eq!(state.take_frame_input().turn, -1.0);
    }

    #[test]
    fn test_recenter_is_reported_once() {
        let mut state = input();
        state.handle_key(&Key::Character("r".into()), true);
        assert!(state.take_frame_input().recenter);
        assert!(!state.take_frame_input().recenter);
        state.handle_button(Button::LeftThumb, true);
        assert!(state.take_frame_input().recenter);
    }

    #[test]
    fn test_stick_deadzone_and_direction() {
        let mut state = input();
        state.handle_axis(Axis::RightStickX, 0.05);
        assert_eq!(state.take_frame_input().turn, 0.0);
        state.handle_axis(Axis::RightStickX, 0.5);
        assert_eq!(state.take_frame_input().turn, -0.5);
        state.handle_key(&Key::Named(NamedKey::ArrowRight), true);
        assert_eq!(state.take_frame_input().turn, -1.0);
    }

    #[test]
    fn test_escape_requests_quit() {
        let mut state = input();
        assert!(!state.quit_requested());
        state.handle_key(&Key::Named(NamedKey::Escape), true);
        assert!(state.quit_requested());
    }
}
