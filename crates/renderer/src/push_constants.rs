//! Per-frame push constant block for the particle shaders.
//!
//! Must match `layout(push_constant)` in `shaders/particles.vert` exactly.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

/// Per-frame constants, rebuilt by value every frame.
///
/// # Memory Layout
///
/// - Offset 0: view-projection matrix (64 bytes)
/// - Offset 64: delta time in seconds
/// - Offset 68: particle speed
/// - Offset 72: particle grid width
/// - Offset 76: particle grid height
/// - Total size: 80 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PushConstants {
    pub view_proj: Mat4,
    pub dt: f32,
    pub particle_speed: f32,
    pub res_x: u32,
    pub res_y: u32,
}

impl PushConstants {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_constants_size() {
        // Mat4 (64) + 2 * f32 + 2 * u32 = 80 bytes, within the 128 byte minimum
        assert_eq!(PushConstants::SIZE, 80);
        assert!(PushConstants::SIZE <= 128);
    }

    #[test]
    fn test_push_constants_field_offsets() {
        let constants = PushConstants {
            view_proj: Mat4::IDENTITY,
            dt: 0.5,
            particle_speed: 100.0,
            res_x: 960,
            res_y: 955,
        };
        let bytes = constants.as_bytes();
        assert_eq!(bytes.len(), PushConstants::SIZE);
        assert_eq!(&bytes[64..68], &0.5f32.to_ne_bytes());
        assert_eq!(&bytes[68..72], &100.0f32.to_ne_bytes());
        assert_eq!(&bytes[72..76], &960u32.to_ne_bytes());
        assert_eq!(&bytes[76..80], &955u32.to_ne_bytes());
    }
}
