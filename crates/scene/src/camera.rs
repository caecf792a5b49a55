//! Perspective camera and first-person controller.

use glam::{Mat4, Quat, Vec3};
use streak_core::config::CameraConfig;

/// Largest pitch magnitude, just short of straight up or down.
const PITCH_LIMIT: f32 = 89.0 * std::f32::consts::PI / 180.0;

/// A perspective camera for rendering the scene.
#[derive(Clone, Debug)]
pub struct Camera {
    /// Camera position in world space
    pub position: Vec3,
    /// Camera rotation
    pub rotation: Quat,
    /// Vertical field of view in radians
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            fov_y: 90.0_f32.to_radians(),
            aspect: 16.0 / 9.0,
            near: 1.0,
            far: 1000.0,
        }
    }
}

impl Camera {
    /// Create a new camera with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a camera at the origin with the configured lens.
    pub fn from_config(config: &CameraConfig) -> Self {
        Self {
            fov_y: config.fov_degrees.to_radians(),
            near: config.near,
            far: config.far,
            ..Self::default()
        }
    }

    /// Update the aspect ratio from a surface size. Zero-sized surfaces are ignored.
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }

    /// Get the view matrix.
    pub fn view_matrix(&self) -> Mat4 {
        let target = self.position + self.forward();
        Mat4::look_at_rh(self.position, target, Vec3::Y)
    }

    /// Get the projection matrix (with Vulkan Y-flip).
    pub fn projection_matrix(&self) -> Mat4 {
        let mut proj = Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far);
        // Flip Y for Vulkan coordinate system
        proj.y_axis.y *= -1.0;
        proj
    }

    /// Get the view-projection matrix.
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Get the forward direction vector.
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    /// Get the right direction vector.
    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    /// Get the up direction vector.
    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }
}

// ============================================================================
// First-person controller
// ============================================================================

/// Per-frame movement intent, each axis in `-1.0..=1.0`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MovementInput {
    pub forward: f32,
    pub right: f32,
    pub up: f32,
    pub sprint: bool,
}

/// First-person camera controller.
///
/// Yaw turns around world up; pitch is clamped short of the poles so the
/// view matrix never degenerates.
#[derive(Clone, Debug)]
pub struct FpsController {
    yaw: f32,
    pitch: f32,
    walk_speed: f32,
    sprint_speed: f32,
    sensitivity: f32,
}

impl Default for FpsController {
    fn default() -> Self {
        Self::with_settings(40.0, 100.0, 0.01)
    }
}

impl FpsController {
    /// Create a controller with explicit speeds (units per second) and
    /// mouse sensitivity (radians per pixel).
    pub fn with_settings(walk_speed: f32, sprint_speed: f32, sensitivity: f32) -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.0,
            walk_speed,
            sprint_speed,
            sensitivity,
        }
    }

    pub fn from_config(config: &CameraConfig) -> Self {
        Self::with_settings(
            config.walk_speed,
            config.sprint_speed,
            config.mouse_sensitivity,
        )
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn pitch_angle(&self) -> f32 {
        self.pitch
    }

    /// Turn right by `angle` radians.
    pub fn rotate(&mut self, camera: &mut Camera, angle: f32) {
        self.yaw += angle;
        self.apply_rotation(camera);
    }

    /// Tilt down by `angle` radians.
    pub fn pitch(&mut self, camera: &mut Camera, angle: f32) {
        self.pitch = (self.pitch + angle).clamp(-PITCH_LIMIT, PITCH_LIMIT);
        self.apply_rotation(camera);
    }

    /// Apply a mouse motion in pixels.
    pub fn process_mouse_movement(&mut self, camera: &mut Camera, dx: f32, dy: f32) {
        self.yaw += dx * self.sensitivity;
        self.pitch = (self.pitch + dy * self.sensitivity).clamp(-PITCH_LIMIT, PITCH_LIMIT);
        self.apply_rotation(camera);
    }

    /// Move along the view direction.
    pub fn walk(&self, camera: &mut Camera, distance: f32) {
        camera.position += camera.forward() * distance;
    }

    /// Move sideways, positive to the right.
    pub fn strafe(&self, camera: &mut Camera, distance: f32) {
        camera.position += camera.right() * distance;
    }

    /// Move along world up.
    pub fn fly(&self, camera: &mut Camera, distance: f32) {
        camera.position += Vec3::Y * distance;
    }

    /// Advance the camera by one frame of movement input.
    pub fn update_camera(&self, camera: &mut Camera, input: MovementInput, delta_time: f32) {
        let speed = if input.sprint {
            self.sprint_speed
        } else {
            self.walk_speed
        };
        let step = speed * delta_time;
        self.walk(camera, input.forward * step);
        self.strafe(camera, input.right * step);
        self.fly(camera, input.up * step);
    }

    fn apply_rotation(&self, camera: &mut Camera) {
        camera.rotation = Quat::from_rotation_y(-self.yaw) * Quat::from_rotation_x(-self.pitch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-5;

    #[test]
    fn test_default_camera_looks_down_negative_z() {
        let camera = Camera::new();
        assert!((camera.forward() - Vec3::NEG_Z).length() < EPS);
        assert!((camera.right() - Vec3::X).length() < EPS);
    }

    #[test]
    fn test_projection_flips_y() {
        let camera = Camera::new();
        let plain = Mat4::perspective_rh(camera.fov_y, camera.aspect, camera.near, camera.far);
        let flipped = camera.projection_matrix();
        assert_eq!(flipped.y_axis.y, -plain.y_axis.y);
        assert_eq!(flipped.x_axis.x, plain.x_axis.x);
    }

    #[test]
    fn test_set_viewport_ignores_zero_size() {
        let mut camera = Camera::new();
        camera.set_viewport(800, 400);
        assert_eq!(camera.aspect, 2.0);
        camera.set_viewport(0, 400);
        assert_eq!(camera.aspect, 2.0);
    }

    #[test]
    fn test_from_config_uses_lens_settings() {
        let config = CameraConfig::default();
        let camera = Camera::from_config(&config);
        assert_eq!(camera.fov_y, config.fov_degrees.to_radians());
        assert_eq!(camera.near, config.near);
        assert_eq!(camera.far, config.far);
    }

    #[test]
    fn test_rotate_turns_right() {
        let mut camera = Camera::new();
        let mut controller = FpsController::default();
        controller.rotate(&mut camera, 0.5);
        assert!(camera.forward().x > 0.0);
        assert!(camera.forward().y.abs() < EPS);
    }

    #[test]
    fn test_positive_pitch_looks_down() {
        let mut camera = Camera::new();
        let mut controller = FpsController::default();
        controller.pitch(&mut camera, 0.3);
        assert!(camera.forward().y < 0.0);
    }

    #[test]
    fn test_pitch_is_clamped() {
        let mut camera = Camera::new();
        let mut controller = FpsController::default();
        controller.pitch(&mut camera, 10.0);
        assert_eq!(controller.pitch_angle(), PITCH_LIMIT);
        controller.pitch(&mut camera, -20.0);
        assert_eq!(controller.pitch_angle(), -PITCH_LIMIT);
        // The view matrix stays finite at the limit
        assert!(camera.view_matrix().is_finite());
    }

    #[test]
    fn test_mouse_movement_scales_by_sensitivity() {
        let mut camera = Camera::new();
        let mut controller = FpsController::with_settings(1.0, 2.0, 0.01);
        controller.process_mouse_movement(&mut camera, 10.0, -5.0);
        assert!((controller.yaw() - 0.1).abs() < EPS);
        assert!((controller.pitch_angle() + 0.05).abs() < EPS);
    }

    #[test]
    fn test_update_camera_walks_and_sprints() {
        let mut camera = Camera::new();
        let controller = FpsController::with_settings(40.0, 100.0, 0.01);

        let walk = MovementInput {
            forward: 1.0,
            ..Default::default()
        };
        controller.update_camera(&mut camera, walk, 0.5);
        assert!((camera.position - Vec3::new(0.0, 0.0, -20.0)).length() < EPS);

        let sprint = MovementInput {
            right: -1.0,
            up: 1.0,
            sprint: true,
            ..Default::default()
        };
        controller.update_camera(&mut camera, sprint, 0.1);
        assert!((camera.position - Vec3::new(-10.0, 10.0, -20.0)).length() < 1e-4);
    }

    #[test]
    fn test_fly_ignores_pitch() {
        let mut camera = Camera::new();
        let mut controller = FpsController::default();
        controller.pitch(&mut camera, 0.7);
        controller.fly(&mut camera, 3.0);
        assert!((camera.position - Vec3::new(0.0, 3.0, 0.0)).length() < EPS);
    }
}
