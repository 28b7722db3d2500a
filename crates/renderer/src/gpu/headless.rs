use std::collections::{HashMap, HashSet};

use crate::error::BackendError;
use crate::types::{ScanlineOrder, CHANNEL_COUNT};

use super::glsl::validate_fragment;
use super::{DrawCall, GpuBackend, ProgramHandle, TextureDesc, TextureHandle};

/// Book-kept state of one texture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureRecord {
    pub desc: TextureDesc,
    pub pixels: Vec<u8>,
    /// Number of in-place updates since creation.
    pub updates: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub program: ProgramHandle,
    pub standard: Vec<u8>,
    pub custom: Vec<u8>,
    pub channels: [TextureHandle; CHANNEL_COUNT],
}

/// Device-free backend: programs are validated with naga, textures and draws
/// are recorded for inspection, and read-back returns a black frame.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    next_id: u64,
    width: u32,
    height: u32,
    programs: HashSet<ProgramHandle>,
    textures: HashMap<TextureHandle, TextureRecord>,
    draws: Vec<DrawRecord>,
    allocations: usize,
    lost: bool,
}

impl HeadlessBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    pub fn texture(&self, handle: TextureHandle) -> Option<&TextureRecord> {
        self.textures.get(&handle)
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    /// Total textures ever created, including released ones.
    pub fn allocations(&self) -> usize {
        self.allocations
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn draws(&self) -> &[DrawRecord] {
        &self.draws
    }

    pub fn last_draw(&self) -> Option<&DrawRecord> {
        self.draws.last()
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Simulates the device going away; every call fails until `restore`.
    pub fn lose_device(&mut self) {
        self.lost = true;
    }

    fn issue(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn ensure_alive(&self) -> Result<(), BackendError> {
        if self.lost {
            Err(BackendError::DeviceLost)
        } else {
            Ok(())
        }
    }
}

impl GpuBackend for HeadlessBackend {
    fn compile_program(&mut self, source: &str) -> Result<ProgramHandle, BackendError> {
        self.ensure_alive()?;
        validate_fragment(source).map_err(|log| BackendError::ShaderCompile { log })?;
        let handle = ProgramHandle(self.issue());
        self.programs.insert(handle);
        Ok(handle)
    }

    fn release_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program);
    }

    fn create_texture(
        &mut self,
        desc: &TextureDesc,
        pixels: &[u8],
    ) -> Result<TextureHandle, BackendError> {
        self.ensure_alive()?;
        desc.check_pixels(pixels)?;
        let handle = TextureHandle(self.issue());
        self.textures.insert(
            handle,
            TextureRecord {
                desc: *desc,
                pixels: pixels.to_vec(),
                updates: 0,
            },
        );
        self.allocations += 1;
        Ok(handle)
    }

    fn update_texture(
        &mut self,
        texture: TextureHandle,
        desc: &TextureDesc,
        pixels: &[u8],
    ) -> Result<(), BackendError> {
        self.ensure_alive()?;
        desc.check_pixels(pixels)?;
        let record = self
            .textures
            .get_mut(&texture)
            .ok_or_else(|| BackendError::Texture(format!("unknown texture {texture:?}")))?;
        if record.desc != *desc {
            return Err(BackendError::Texture(format!(
                "update of {:?} does not match allocation {:?}",
                desc, record.desc
            )));
        }
        record.pixels.copy_from_slice(pixels);
        record.updates += 1;
        Ok(())
    }

    fn release_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture);
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), BackendError> {
        self.width = width;
        self.height = height;
        Ok(())
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<(), BackendError> {
        self.ensure_alive()?;
        if !self.programs.contains(&call.program) {
            return Err(BackendError::Draw(format!("unknown program {:?}", call.program)));
        }
        if let Some(missing) = call
            .channels
            .iter()
            .find(|texture| !self.textures.contains_key(*texture))
        {
            return Err(BackendError::Draw(format!("unknown texture {missing:?}")));
        }
        self.draws.push(DrawRecord {
            program: call.program,
            standard: call.standard.to_vec(),
            custom: call.custom.to_vec(),
            channels: call.channels,
        });
        Ok(())
    }

    fn read_pixels(&mut self, _order: ScanlineOrder) -> Result<Vec<u8>, BackendError> {
        self.ensure_alive()?;
        Ok(vec![0; self.width as usize * self.height as usize * 4])
    }

    fn restore(&mut self) -> Result<(), BackendError> {
        self.programs.clear();
        self.textures.clear();
        self.lost = false;
        Ok(())
    }

    fn is_lost(&self) -> bool {
        self.lost
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_texture_lifetime_and_updates() {
        let mut backend = HeadlessBackend::new(4, 4);
        let desc = TextureDesc::rgba(1, 1);
        let handle = backend.create_texture(&desc, &[1, 2, 3, 4]).unwrap();
        backend.update_texture(handle, &desc, &[5, 6, 7, 8]).unwrap();
        let record = backend.texture(handle).unwrap();
        assert_eq!(record.pixels, vec![5, 6, 7, 8]);
        assert_eq!(record.updates, 1);
        assert!(backend
            .update_texture(handle, &TextureDesc::rgba(2, 1), &[0; 8])
            .is_err());
        backend.release_texture(handle);
        assert_eq!(backend.live_textures(), 0);
        assert_eq!(backend.allocations(), 1);
    }

    #[test]
    fn read_back_matches_viewport() {
        let mut backend = HeadlessBackend::new(3, 2);
        assert_eq!(backend.read_pixels(ScanlineOrder::TopDown).unwrap().len(), 24);
        backend.resize(5, 5).unwrap();
        assert_eq!(backend.read_pixels(ScanlineOrder::BottomUp).unwrap().len(), 100);
    }

    #[test]
    fn lost_device_rejects_work_until_restored() {
        let mut backend = HeadlessBackend::new(1, 1);
        backend.lose_device();
        assert!(backend.is_lost());
        assert_eq!(
            backend.create_texture(&TextureDesc::rgba(1, 1), &[0; 4]),
            Err(BackendError::DeviceLost)
        );
        backend.restore().unwrap();
        assert!(backend.create_texture(&TextureDesc::rgba(1, 1), &[0; 4]).is_ok());
    }
}
