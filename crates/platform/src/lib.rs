//! Platform layer for streak.
//!
//! - Window management via winit
//! - Vulkan surface creation from raw window handles
//! - Input state and the [`InputHandler`] capability trait

mod input;
mod window;

pub use input::{InputHandler, InputState, KeyCode, MouseButton};
pub use window::{Surface, Window};

// Re-export winit types that users might need
pub use winit::event::{ElementState, MouseScrollDelta, WindowEvent};
pub use winit::event_loop::{ActiveEventLoop, EventLoop};
