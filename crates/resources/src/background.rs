//! Background image sampled by the particle shaders.
//!
//! The image is stretched to exactly the particle grid (aspect ratio is not
//! preserved) and stored as linear `[r, g, b, a]` floats in `0.0..=1.0`,
//! row-major from the top-left corner.

use std::path::Path;

use image::imageops::FilterType;
use tracing::{info, warn};

use crate::error::{ResourceError, ResourceResult};

/// Floating point RGBA texels of a `width * height` image.
#[derive(Clone, Debug, PartialEq)]
pub struct Background {
    width: u32,
    height: u32,
    texels: Vec<[f32; 4]>,
}

impl Background {
    /// Loads `path` and resizes it to `width` x `height`.
    ///
    /// # Errors
    ///
    /// Returns an error if the size is empty, the file is missing, or the
    /// image cannot be decoded.
    pub fn load(path: &Path, width: u32, height: u32) -> ResourceResult<Self> {
        check_size(width, height)?;
        if !path.exists() {
            return Err(ResourceError::FileNotFound(path.to_path_buf()));
        }

        let img = image::open(path)?;
        let (src_w, src_h) = (img.width(), img.height());
        let rgba = img
            .resize_exact(width, height, FilterType::Triangle)
            .to_rgba32f();

        let texels = rgba
            .pixels()
            .map(|p| [p[0], p[1], p[2], p[3]])
            .collect();

        info!(
            "Loaded background {:?}: {}x{} -> {}x{}",
            path, src_w, src_h, width, height
        );

        Ok(Self {
            width,
            height,
            texels,
        })
    }

    /// Loads `path`, falling back to [`Background::gradient`] on any error.
    ///
    /// # Errors
    ///
    /// Returns an error only if the size is empty.
    pub fn load_or_gradient(path: &Path, width: u32, height: u32) -> ResourceResult<Self> {
        match Self::load(path, width, height) {
            Ok(background) => Ok(background),
            Err(ResourceError::InvalidSize { width, height }) => {
                Err(ResourceError::InvalidSize { width, height })
            }
            Err(e) => {
                warn!("Background unavailable ({}), using a gradient", e);
                Self::gradient(width, height)
            }
        }
    }

    /// A horizontal red ramp over a vertical blue ramp.
    ///
    /// # Errors
    ///
    /// Returns an error if the size is empty.
    pub fn gradient(width: u32, height: u32) -> ResourceResult<Self> {
        check_size(width, height)?;

        let fx = (width.max(2) - 1) as f32;
        let fy = (height.max(2) - 1) as f32;
        let texels = (0..height)
            .flat_map(|y| {
                (0..width).map(move |x| {
                    let u = x as f32 / fx;
                    let v = y as f32 / fy;
                    [u, 0.25, v, 1.0]
                })
            })
            .collect();

        Ok(Self {
            width,
            height,
            texels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn texels(&self) -> &[[f32; 4]] {
        &self.texels
    }

    /// Raw bytes for upload, 16 per texel.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.texels)
    }
}

fn check_size(width: u32, height: u32) -> ResourceResult<()> {
    if width == 0 || height == 0 {
        return Err(ResourceError::InvalidSize { width, height });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gradient_dimensions() {
        let bg = Background::gradient(8, 4).unwrap();
        assert_eq!(bg.width(), 8);
        assert_eq!(bg.height(), 4);
        assert_eq!(bg.texels().len(), 32);
        assert_eq!(bg.as_bytes().len(), 32 * 16);
    }

    #[test]
    fn test_gradient_corners() {
        let bg = Background::gradient(3, 3).unwrap();
        assert_eq!(bg.texels()[0], [0.0, 0.25, 0.0, 1.0]);
        assert_eq!(bg.texels()[8], [1.0, 0.25, 1.0, 1.0]);
    }

    #[test]
    fn test_single_texel_gradient() {
        let bg = Background::gradient(1, 1).unwrap();
        assert_eq!(bg.texels(), &[[0.0, 0.25, 0.0, 1.0]]);
    }

    #[test]
    fn test_empty_size_rejected() {
        assert!(matches!(
            Background::gradient(0, 4),
            Err(ResourceError::InvalidSize { width: 0, height: 4 })
        ));
    }

    #[test]
    fn test_missing_file_falls_back() {
        let bg = Background::load_or_gradient(Path::new("does/not/exist.jpg"), 4, 2).unwrap();
        assert_eq!(bg, Background::gradient(4, 2).unwrap());
    }

    #[test]
    fn test_missing_file_is_reported() {
        let result = Background::load(Path::new("does/not/exist.jpg"), 4, 2);
        assert!(matches!(result, Err(ResourceError::FileNotFound(_))));
    }
}
