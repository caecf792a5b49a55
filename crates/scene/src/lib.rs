//! Scene state for streak.
//!
//! - Perspective camera and first-person controller
//! - The particle field scene, which turns input into per-frame push constants

pub mod camera;
mod particle_scene;

pub use camera::{Camera, FpsController, MovementInput};
pub use particle_scene::{ParticleScene, SceneAction};
