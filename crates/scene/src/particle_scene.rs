//! The particle field scene: camera, timer and particle speed driven by input.

use streak_core::Timer;
use streak_core::config::{CameraConfig, ParticleConfig};
use streak_platform::{InputHandler, InputState, KeyCode, MouseButton};
use streak_renderer::PushConstants;
use tracing::{debug, info};

use crate::camera::{Camera, FpsController, MovementInput};

/// Requests the scene cannot carry out itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SceneAction {
    /// Stop the frame loop and exit
    Quit,
    /// Flip frame capture on or off
    ToggleCapture,
}

/// Particle speed presets.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Speeds {
    min: f32,
    mid: f32,
    top: f32,
}

/// Scene state for the particle viewer.
///
/// Implements [`InputHandler`] for discrete events; held movement keys are
/// sampled once per frame in [`ParticleScene::update`].
pub struct ParticleScene {
    camera: Camera,
    controller: FpsController,
    timer: Timer,
    speeds: Speeds,
    /// Speed restored when the boost button is released
    base_speed: f32,
    particle_speed: f32,
    grid: (u32, u32),
    actions: Vec<SceneAction>,
}

impl ParticleScene {
    pub fn new(particles: &ParticleConfig, camera: &CameraConfig) -> Self {
        let speeds = Speeds {
            min: particles.speed_min,
            mid: particles.speed_mid,
            top: particles.speed_top,
        };
        Self {
            camera: Camera::from_config(camera),
            controller: FpsController::from_config(camera),
            timer: Timer::new(),
            speeds,
            base_speed: speeds.min,
            particle_speed: speeds.min,
            grid: (particles.grid_x, particles.grid_y),
            actions: Vec::new(),
        }
    }

    /// Advance the timer and apply held movement keys.
    pub fn update(&mut self, input: &InputState) {
        self.timer.tick();
        let movement = MovementInput {
            forward: axis(input, KeyCode::KeyW, KeyCode::KeyS),
            right: axis(input, KeyCode::KeyD, KeyCode::KeyA),
            up: axis(input, KeyCode::Space, KeyCode::KeyC),
            sprint: input.is_key_pressed(KeyCode::ShiftLeft),
        };
        self.controller
            .update_camera(&mut self.camera, movement, self.timer.delta_secs());
    }

    /// Push constants for the frame about to be rendered.
    pub fn push_constants(&self) -> PushConstants {
        PushConstants {
            view_proj: self.camera.view_projection_matrix(),
            dt: self.timer.delta_secs(),
            particle_speed: self.particle_speed,
            res_x: self.grid.0,
            res_y: self.grid.1,
        }
    }

    /// Track the surface size for the projection aspect ratio.
    pub fn on_resize(&mut self, width: u32, height: u32) {
        self.camera.set_viewport(width, height);
    }

    /// Drain the actions requested since the last call.
    pub fn take_actions(&mut self) -> Vec<SceneAction> {
        std::mem::take(&mut self.actions)
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    pub fn particle_speed(&self) -> f32 {
        self.particle_speed
    }

    fn look(&mut self, dx: f32, dy: f32) {
        self.controller
            .process_mouse_movement(&mut self.camera, dx, dy);
    }
}

fn axis(input: &InputState, positive: KeyCode, negative: KeyCode) -> f32 {
    let mut value = 0.0;
    if input.is_key_pressed(positive) {
        value += 1.0;
    }
    if input.is_key_pressed(negative) {
        value -= 1.0;
    }
    value
}

impl InputHandler for ParticleScene {
    fn on_key_down(&mut self, key: KeyCode) {
        match key {
            KeyCode::Escape => self.actions.push(SceneAction::Quit),
            KeyCode::KeyP => {
                self.timer.toggle();
                info!(paused = self.timer.is_paused(), "Timer toggled");
            }
            KeyCode::KeyR => self.actions.push(SceneAction::ToggleCapture),
            _ => {}
        }
    }

    fn on_mouse_move(&mut self, _x: f32, _y: f32, dx: f32, dy: f32) {
        self.look(dx, dy);
    }

    fn on_mouse_drag(&mut self, _x: f32, _y: f32, dx: f32, dy: f32) {
        self.look(dx, dy);
    }

    fn on_mouse_button_down(&mut self, button: MouseButton) {
        if button == MouseButton::Right {
            self.particle_speed = self.speeds.top;
        }
    }

    fn on_mouse_button_up(&mut self, button: MouseButton) {
        if button == MouseButton::Right {
            self.particle_speed = self.base_speed;
        }
    }

    fn on_scroll(&mut self, delta: f32) {
        if delta == 0.0 {
            return;
        }
        self.base_speed = if delta > 0.0 {
            self.speeds.mid
        } else {
            self.speeds.min
        };
        if self.particle_speed != self.speeds.top {
            self.particle_speed = self.base_speed;
        }
        debug!(base_speed = self.base_speed, "Particle speed preset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene() -> ParticleScene {
        ParticleScene::new(&ParticleConfig::default(), &CameraConfig::default())
    }

    #[test]
    fn test_initial_constants() {
        let scene = scene();
        let particles = ParticleConfig::default();
        let constants = scene.push_constants();
        assert_eq!(constants.particle_speed, particles.speed_min);
        assert_eq!(constants.res_x, particles.grid_x);
        assert_eq!(constants.res_y, particles.grid_y);
        assert_eq!(constants.dt, 0.0);
    }

    #[test]
    fn test_escape_and_r_queue_actions() {
        let mut scene = scene();
        scene.on_key_down(KeyCode::KeyR);
        scene.on_key_down(KeyCode::Escape);
        scene.on_key_down(KeyCode::KeyX);
        assert_eq!(
            scene.take_actions(),
            vec![SceneAction::ToggleCapture, SceneAction::Quit]
        );
        assert!(scene.take_actions().is_empty());
    }

    #[test]
    fn test_p_toggles_timer() {
        let mut scene = scene();
        assert!(!scene.timer().is_paused());
        scene.on_key_down(KeyCode::KeyP);
        assert!(scene.timer().is_paused());
        scene.on_key_down(KeyCode::KeyP);
        assert!(!scene.timer().is_paused());
    }

    #[test]
    fn test_right_button_boosts_speed() {
        let mut scene = scene();
        let particles = ParticleConfig::default();
        scene.on_mouse_button_down(MouseButton::Right);
        assert_eq!(scene.particle_speed(), particles.speed_top);
        scene.on_mouse_button_up(MouseButton::Right);
        assert_eq!(scene.particle_speed(), particles.speed_min);

        scene.on_mouse_button_down(MouseButton::Left);
        assert_eq!(scene.particle_speed(), particles.speed_min);
    }

    #[test]
    fn test_scroll_selects_base_speed() {
        let mut scene = scene();
        let particles = ParticleConfig::default();
        scene.on_scroll(1.0);
        assert_eq!(scene.particle_speed(), particles.speed_mid);

        // Boost survives a scroll and releases to the new base
        scene.on_mouse_button_down(MouseButton::Right);
        scene.on_scroll(-1.0);
        assert_eq!(scene.particle_speed(), particles.speed_top);
        scene.on_mouse_button_up(MouseButton::Right);
        assert_eq!(scene.particle_speed(), particles.speed_min);
    }

    #[test]
    fn test_mouse_motion_turns_camera() {
        let mut scene = scene();
        scene.on_mouse_move(0.0, 0.0, 20.0, 0.0);
        assert!(scene.camera().forward().x > 0.0);
        scene.on_mouse_drag(0.0, 0.0, 0.0, 30.0);
        assert!(scene.camera().forward().y < 0.0);
    }

    #[test]
    fn test_resize_updates_aspect() {
        let mut scene = scene();
        scene.on_resize(1000, 500);
        assert_eq!(scene.camera().aspect, 2.0);
    }

    #[test]
    fn test_update_without_keys_keeps_position() {
        let mut scene = scene();
        let input = InputState::new();
        scene.update(&input);
        scene.update(&input);
        assert_eq!(scene.camera().position, glam::Vec3::ZERO);
    }

    #[test]
    fn test_axis_cancels_opposite_keys() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::KeyW);
        assert_eq!(axis(&input, KeyCode::KeyW, KeyCode::KeyS), 1.0);
        input.on_key_pressed(KeyCode::KeyS);
        assert_eq!(axis(&input, KeyCode::KeyW, KeyCode::KeyS), 0.0);
    }
}
