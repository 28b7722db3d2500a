//! GPU backends behind a single trait seam.
//!
//! - `glsl` validates assembled programs on the CPU through naga and formats
//!   diagnostics as `ERROR: <col>:<line>: <message>` lines.
//! - `headless` keeps bookkeeping only (no device) and backs `check` and the
//!   test suite.
//! - `context`, `pipeline` and `backend` drive a real `wgpu` device that renders
//!   into an offscreen RGBA8 target.

mod backend;
mod context;
pub mod glsl;
mod headless;
mod pipeline;

pub use backend::WgpuBackend;
pub use context::{GpuSettings, MemoryHint, PowerHint};
pub use headless::{DrawRecord, HeadlessBackend, TextureRecord};

use crate::error::BackendError;
use crate::types::{ScanlineOrder, CHANNEL_COUNT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFormat {
    Rgba8,
    R8,
}

impl TextureFormat {
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            TextureFormat::Rgba8 => 4,
            TextureFormat::R8 => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

impl TextureDesc {
    pub fn rgba(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            format: TextureFormat::Rgba8,
        }
    }

    pub fn r8(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            format: TextureFormat::R8,
        }
    }

    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel() as usize
    }

    pub(crate) fn check_pixels(&self, pixels: &[u8]) -> Result<(), BackendError> {
        if self.width == 0 || self.height == 0 {
            return Err(BackendError::Texture(format!(
                "texture must be non-empty, got {}x{}",
                self.width, self.height
            )));
        }
        if pixels.len() != self.byte_len() {
            return Err(BackendError::Texture(format!(
                "expected {} bytes for {}x{} {:?}, got {}",
                self.byte_len(),
                self.width,
                self.height,
                self.format,
                pixels.len()
            )));
        }
        Ok(())
    }
}

/// Everything a single full-screen draw needs.
#[derive(Debug, Clone, Copy)]
pub struct DrawCall<'a> {
    pub program: ProgramHandle,
    pub standard: &'a [u8],
    pub custom: &'a [u8],
    pub channels: [TextureHandle; CHANNEL_COUNT],
}

/// Operations the engine needs from a graphics device.
///
/// Handles are only meaningful to the backend that issued them and are all
/// invalidated by [`GpuBackend::restore`].
pub trait GpuBackend {
    /// Compiles and links an assembled fragment program. Failures return
    /// [`BackendError::ShaderCompile`] carrying the compiler log.
    fn compile_program(&mut self, source: &str) -> Result<ProgramHandle, BackendError>;

    fn release_program(&mut self, program: ProgramHandle);

    fn create_texture(
        &mut self,
        desc: &TextureDesc,
        pixels: &[u8],
    ) -> Result<TextureHandle, BackendError>;

    /// Replaces the contents of a texture without reallocating it; `desc`
    /// must match the dimensions it was created with.
    fn update_texture(
        &mut self,
        texture: TextureHandle,
        desc: &TextureDesc,
        pixels: &[u8],
    ) -> Result<(), BackendError>;

    fn release_texture(&mut self, texture: TextureHandle);

    fn resize(&mut self, width: u32, height: u32) -> Result<(), BackendError>;

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<(), BackendError>;

    /// RGBA8 contents of the render target, `width * height * 4` bytes.
    fn read_pixels(&mut self, order: ScanlineOrder) -> Result<Vec<u8>, BackendError>;

    /// Re-creates device resources after a loss. Every previously issued
    /// handle is invalid afterwards.
    fn restore(&mut self) -> Result<(), BackendError>;

    fn is_lost(&self) -> bool {
        false
    }
}

/// Reverses row order of a tightly packed RGBA8 image.
pub(crate) fn flip_rows(pixels: &mut [u8], width: u32, height: u32) {
    let row = width as usize * 4;
    let height = height as usize;
    for top in 0..height / 2 {
        let bottom = height - 1 - top;
        let (upper, lower) = pixels.split_at_mut(bottom * row);
        upper[top * row..top * row + row].swap_with_slice(&mut lower[..row]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flip_rows_reverses_scanlines() {
        let mut pixels: Vec<u8> = (0..3).flat_map(|row| [row as u8; 8]).collect();
        flip_rows(&mut pixels, 2, 3);
        assert_eq!(&pixels[..8], &[2; 8]);
        assert_eq!(&pixels[8..16], &[1; 8]);
        assert_eq!(&pixels[16..], &[0; 8]);
    }

    #[test]
    fn texture_desc_validates_payload_length() {
        let desc = TextureDesc::r8(4, 2);
        assert!(desc.check_pixels(&[0; 8]).is_ok());
        assert!(desc.check_pixels(&[0; 7]).is_err());
        assert!(TextureDesc::rgba(0, 1).check_pixels(&[]).is_err());
    }
}
