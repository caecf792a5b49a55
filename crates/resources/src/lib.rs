//! Resource loading.
//!
//! This crate handles loading of external assets:
//! - Background images, resized to the particle grid and converted to
//!   floating point RGBA

pub mod background;
mod error;

pub use background::Background;
pub use error::{ResourceError, ResourceResult};
