//! Input handling for keyboard and mouse.
//!
//! [`InputState`] is owned by the application and updated from window
//! events. Scenes receive the same events through the [`InputHandler`]
//! capability trait, so the active scene can be swapped without touching
//! the event loop.

use std::collections::HashSet;

pub use winit::keyboard::KeyCode;

/// Mouse button identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Other,
}

impl From<winit::event::MouseButton> for MouseButton {
    fn from(button: winit::event::MouseButton) -> Self {
        match button {
            winit::event::MouseButton::Left => MouseButton::Left,
            winit::event::MouseButton::Right => MouseButton::Right,
            winit::event::MouseButton::Middle => MouseButton::Middle,
            _ => MouseButton::Other,
        }
    }
}

/// Event callbacks a scene may implement.
///
/// All methods default to no-ops. Positions are in physical pixels and
/// deltas are relative to the previous mouse event.
pub trait InputHandler {
    fn on_key_down(&mut self, _key: KeyCode) {}

    fn on_key_up(&mut self, _key: KeyCode) {}

    /// Pointer moved with no button held.
    fn on_mouse_move(&mut self, _x: f32, _y: f32, _dx: f32, _dy: f32) {}

    /// Pointer moved with at least one button held.
    fn on_mouse_drag(&mut self, _x: f32, _y: f32, _dx: f32, _dy: f32) {}

    fn on_mouse_button_down(&mut self, _button: MouseButton) {}

    fn on_mouse_button_up(&mut self, _button: MouseButton) {}

    /// Vertical scroll in lines; positive is away from the user.
    fn on_scroll(&mut self, _delta: f32) {}
}

/// Tracks the current state of keyboard and mouse input.
#[derive(Debug, Default)]
pub struct InputState {
    pressed_keys: HashSet<KeyCode>,
    just_pressed_keys: HashSet<KeyCode>,
    just_released_keys: HashSet<KeyCode>,

    pressed_buttons: HashSet<MouseButton>,
    just_pressed_buttons: HashSet<MouseButton>,

    mouse_position: Option<(f32, f32)>,
    mouse_delta: (f32, f32),
    scroll_delta: f32,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call at the beginning of each frame to clear per-frame state.
    pub fn begin_frame(&mut self) {
        self.just_pressed_keys.clear();
        self.just_released_keys.clear();
        self.just_pressed_buttons.clear();
        self.mouse_delta = (0.0, 0.0);
        self.scroll_delta = 0.0;
    }

    /// Records a key press. Returns false for auto-repeat of a held key.
    pub fn on_key_pressed(&mut self, key: KeyCode) -> bool {
        if self.pressed_keys.insert(key) {
            self.just_pressed_keys.insert(key);
            true
        } else {
            false
        }
    }

    /// Records a key release. Returns false if the key was not held.
    pub fn on_key_released(&mut self, key: KeyCode) -> bool {
        if self.pressed_keys.remove(&key) {
            self.just_released_keys.insert(key);
            true
        } else {
            false
        }
    }

    pub fn on_mouse_pressed(&mut self, button: MouseButton) {
        if self.pressed_buttons.insert(button) {
            self.just_pressed_buttons.insert(button);
        }
    }

    pub fn on_mouse_released(&mut self, button: MouseButton) {
        self.pressed_buttons.remove(&button);
    }

    /// Records a pointer position and returns the delta from the previous
    /// one. The first event after startup yields a zero delta.
    pub fn on_mouse_moved(&mut self, x: f32, y: f32) -> (f32, f32) {
        let delta = match self.mouse_position {
            Some((old_x, old_y)) => (x - old_x, y - old_y),
            None => (0.0, 0.0),
        };
        self.mouse_position = Some((x, y));
        self.mouse_delta.0 += delta.0;
        self.mouse_delta.1 += delta.1;
        delta
    }

    pub fn on_scroll(&mut self, delta: f32) {
        self.scroll_delta += delta;
    }

    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.pressed_keys.contains(&key)
    }

    pub fn is_key_just_pressed(&self, key: KeyCode) -> bool {
        self.just_pressed_keys.contains(&key)
    }

    pub fn is_key_just_released(&self, key: KeyCode) -> bool {
        self.just_released_keys.contains(&key)
    }

    pub fn is_mouse_pressed(&self, button: MouseButton) -> bool {
        self.pressed_buttons.contains(&button)
    }

    pub fn is_mouse_just_pressed(&self, button: MouseButton) -> bool {
        self.just_pressed_buttons.contains(&button)
    }

    /// True while any mouse button is held.
    pub fn any_mouse_pressed(&self) -> bool {
        !self.pressed_buttons.is_empty()
    }

    pub fn mouse_position(&self) -> (f32, f32) {
        self.mouse_position.unwrap_or_default()
    }

    /// Accumulated pointer movement since [`InputState::begin_frame`].
    pub fn mouse_delta(&self) -> (f32, f32) {
        self.mouse_delta
    }

    pub fn scroll_delta(&self) -> f32 {
        self.scroll_delta
    }
}
