use bytemuck::{Pod, Zeroable};
use chrono::{Datelike, Local, Timelike};
use directives::{BaseType, ParameterDefinition};

use crate::types::CHANNEL_COUNT;

/// CPU mirror of the `StandardInputs` block declared in the program header.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct StandardUniforms {
    pub resolution: [f32; 3],
    pub time: f32,
    pub time_delta: f32,
    pub frame: i32,
    pub frame_rate: f32,
    pub beat: f32,
    pub mouse: [f32; 4],
    pub date: [f32; 4],
    pub channel_resolution: [[f32; 4]; CHANNEL_COUNT],
}

impl StandardUniforms {
    pub fn new(width: u32, height: u32) -> Self {
        let mut uniforms = Self::zeroed();
        uniforms.set_resolution(width, height);
        for index in 0..CHANNEL_COUNT {
            uniforms.set_channel_resolution(index, [0.0, 0.0, 1.0]);
        }
        uniforms.refresh_date();
        uniforms
    }

    pub fn set_resolution(&mut self, width: u32, height: u32) {
        self.resolution = [width as f32, height as f32, 1.0];
    }

    pub fn set_channel_resolution(&mut self, index: usize, resolution: [f32; 3]) {
        if let Some(slot) = self.channel_resolution.get_mut(index) {
            *slot = [resolution[0], resolution[1], resolution[2], 0.0];
        }
    }

    /// Writes `(year, month, day, seconds since midnight)` in local time.
    pub fn refresh_date(&mut self) {
        let local_now = Local::now();
        let seconds_since_midnight = local_now.num_seconds_from_midnight() as f32
            + local_now.nanosecond() as f32 / 1_000_000_000.0;
        self.date = [
            local_now.year() as f32,
            local_now.month() as f32,
            local_now.day() as f32,
            seconds_since_midnight,
        ];
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

/// Byte offset of one uniform value inside the custom block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub u32);

/// std140 alignment and size of a single (non-array) member.
fn std140_scalar(base: BaseType) -> (u32, u32) {
    match base {
        BaseType::Int | BaseType::Float => (4, 4),
        BaseType::Vec2 => (8, 8),
        BaseType::Vec3 | BaseType::Color => (16, 12),
        BaseType::Vec4 => (16, 16),
    }
}

const STD140_ARRAY_STRIDE: u32 = 16;

fn align_up(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}

/// Largest custom block a program may declare; the minimum uniform binding
/// size every wgpu device supports.
pub const MAX_CUSTOM_BLOCK_BYTES: u32 = 65_536;

/// Computes one location per element for each definition, in declaration
/// order, plus the total block size rounded up to 16 bytes. `None` when the
/// block would not fit in [`MAX_CUSTOM_BLOCK_BYTES`].
pub fn std140_layout(
    params: &[ParameterDefinition],
) -> Option<(Vec<Vec<UniformLocation>>, u32)> {
    let mut offset = 0u32;
    let mut locations = Vec::with_capacity(params.len());

    for param in params {
        match param.array_size {
            Some(len) => {
                let len = u32::try_from(len).ok()?;
                offset = align_up(offset, STD140_ARRAY_STRIDE);
                let end = STD140_ARRAY_STRIDE
                    .checked_mul(len)
                    .and_then(|bytes| offset.checked_add(bytes))
                    .filter(|end| *end <= MAX_CUSTOM_BLOCK_BYTES)?;
                let elements = (0..len)
                    .map(|index| UniformLocation(offset + index * STD140_ARRAY_STRIDE))
                    .collect();
                offset = end;
                locations.push(elements);
            }
            None => {
                let (alignment, size) = std140_scalar(param.base_type);
                offset = align_up(offset, alignment);
                locations.push(vec![UniformLocation(offset)]);
                offset += size;
                if offset > MAX_CUSTOM_BLOCK_BYTES {
                    return None;
                }
            }
        }
    }

    Some((locations, align_up(offset, 16)))
}

/// Byte image of the custom parameter block with typed writers.
#[derive(Debug, Clone, Default)]
pub struct CustomUniformBlock {
    bytes: Vec<u8>,
    writes: usize,
}

impl CustomUniformBlock {
    pub fn new(size: u32) -> Self {
        Self {
            bytes: vec![0; size as usize],
            writes: 0,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Typed writes performed since the last [`Self::begin_frame`].
    pub fn write_count(&self) -> usize {
        self.writes
    }

    pub fn begin_frame(&mut self) {
        self.writes = 0;
    }

    pub fn set_int(&mut self, location: UniformLocation, value: i32) {
        self.put(location, bytemuck::bytes_of(&value));
    }

    pub fn set_float(&mut self, location: UniformLocation, value: f32) {
        self.put(location, bytemuck::bytes_of(&value));
    }

    pub fn set_vec2(&mut self, location: UniformLocation, value: [f32; 2]) {
        self.put(location, bytemuck::cast_slice(&value));
    }

    pub fn set_vec3(&mut self, location: UniformLocation, value: [f32; 3]) {
        self.put(location, bytemuck::cast_slice(&value));
    }

    pub fn set_vec4(&mut self, location: UniformLocation, value: [f32; 4]) {
        self.put(location, bytemuck::cast_slice(&value));
    }

    pub fn read_f32(&self, location: UniformLocation, component: usize) -> Option<f32> {
        let start = location.0 as usize + component * 4;
        let bytes = self.bytes.get(start..start + 4)?;
        Some(f32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_i32(&self, location: UniformLocation) -> Option<i32> {
        let start = location.0 as usize;
        let bytes = self.bytes.get(start..start + 4)?;
        Some(i32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn put(&mut self, location: UniformLocation, data: &[u8]) {
        let start = location.0 as usize;
        let Some(target) = self.bytes.get_mut(start..start + data.len()) else {
            tracing::warn!(offset = start, len = data.len(), "uniform write outside custom block");
            return;
        };
        target.copy_from_slice(data);
        self.writes += 1;
    }
}
