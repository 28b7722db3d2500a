use std::collections::HashMap;

use anyhow::{Context, Result};
use wgpu::util::{DeviceExt, TextureDataOrder};

use crate::error::BackendError;
use crate::types::{ScanlineOrder, CHANNEL_COUNT};

use super::context::{GpuContext, GpuSettings};
use super::glsl::validate_fragment;
use super::pipeline::{build_channel_entries, PipelineLayouts, TARGET_FORMAT};
use super::{
    flip_rows, DrawCall, GpuBackend, ProgramHandle, TextureDesc, TextureFormat, TextureHandle,
};

const STANDARD_BLOCK_SIZE: u64 = std::mem::size_of::<crate::uniforms::StandardUniforms>() as u64;
const MIN_CUSTOM_BLOCK_SIZE: u64 = 16;

struct RenderTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

impl RenderTarget {
    fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("offscreen color target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            width,
            height,
        }
    }
}

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    desc: TextureDesc,
}

struct UniformBuffers {
    standard: wgpu::Buffer,
    custom: wgpu::Buffer,
    custom_capacity: u64,
    bind_group: wgpu::BindGroup,
}

impl UniformBuffers {
    fn new(device: &wgpu::Device, layouts: &PipelineLayouts, custom_capacity: u64) -> Self {
        let standard = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("standard uniform buffer"),
            size: STANDARD_BLOCK_SIZE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let custom = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("custom uniform buffer"),
            size: custom_capacity,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("uniform bind group"),
            layout: &layouts.uniform_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: crate::compile::STANDARD_BINDING,
                    resource: standard.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: crate::compile::CUSTOM_BINDING,
                    resource: custom.as_entire_binding(),
                },
            ],
        });
        Self {
            standard,
            custom,
            custom_capacity,
            bind_group,
        }
    }
}

/// Renders assembled programs on a real GPU into an offscreen RGBA8 target.
pub struct WgpuBackend {
    settings: GpuSettings,
    context: GpuContext,
    layouts: PipelineLayouts,
    sampler: wgpu::Sampler,
    target: RenderTarget,
    uniforms: UniformBuffers,
    programs: HashMap<ProgramHandle, wgpu::RenderPipeline>,
    textures: HashMap<TextureHandle, GpuTexture>,
    next_id: u64,
}

impl WgpuBackend {
    pub fn new(width: u32, height: u32, settings: GpuSettings) -> Result<Self> {
        let context = GpuContext::new(settings)?;
        let max = context.max_texture_dimension;
        if width == 0 || height == 0 || width > max || height > max {
            anyhow::bail!(
                "render target {width}x{height} is outside the supported range 1..={max}"
            );
        }
        Self::from_context(settings, context, width, height).context("failed to set up renderer")
    }

    fn from_context(
        settings: GpuSettings,
        context: GpuContext,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let layouts = PipelineLayouts::new(&context.device);
        let sampler = create_channel_sampler(&context.device);
        let target = RenderTarget::new(&context.device, width, height);
        let uniforms = UniformBuffers::new(&context.device, &layouts, MIN_CUSTOM_BLOCK_SIZE);
        Ok(Self {
            settings,
            context,
            layouts,
            sampler,
            target,
            uniforms,
            programs: HashMap::new(),
            textures: HashMap::new(),
            next_id: 0,
        })
    }

    fn issue(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn ensure_alive(&self) -> Result<(), BackendError> {
        if self.context.is_lost() {
            Err(BackendError::DeviceLost)
        } else {
            Ok(())
        }
    }

    fn write_uniforms(&mut self, standard: &[u8], custom: &[u8]) {
        let needed = (custom.len() as u64).max(MIN_CUSTOM_BLOCK_SIZE);
        if needed > self.uniforms.custom_capacity {
            let capacity = needed.div_ceil(16) * 16;
            tracing::debug!(capacity, "growing custom uniform buffer");
            self.uniforms = UniformBuffers::new(&self.context.device, &self.layouts, capacity);
        }
        self.context
            .queue
            .write_buffer(&self.uniforms.standard, 0, standard);
        if !custom.is_empty() {
            self.context
                .queue
                .write_buffer(&self.uniforms.custom, 0, custom);
        }
    }
}

fn create_channel_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("channel sampler"),
        address_mode_u: wgpu::AddressMode::Repeat,
        address_mode_v: wgpu::AddressMode::Repeat,
        address_mode_w: wgpu::AddressMode::Repeat,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    })
}

fn wgpu_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::R8 => wgpu::TextureFormat::R8Unorm,
    }
}

impl GpuBackend for WgpuBackend {
    fn compile_program(&mut self, source: &str) -> Result<ProgramHandle, BackendError> {
        self.ensure_alive()?;
        validate_fragment(source).map_err(|log| BackendError::ShaderCompile { log })?;

        self.context
            .device
            .push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = self.layouts.build_pipeline(&self.context.device, source);
        if let Some(error) = pollster::block_on(self.context.device.pop_error_scope()) {
            return Err(BackendError::ShaderCompile {
                log: format!("ERROR: 0:0: {error}\n"),
            });
        }

        let handle = ProgramHandle(self.issue());
        self.programs.insert(handle, pipeline);
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
        let max = self.context.max_texture_dimension;
        if desc.width > max || desc.height > max {
            return Err(BackendError::Texture(format!(
                "{}x{} exceeds the device limit of {max}",
                desc.width, desc.height
            )));
        }

        let id = self.issue();
        let texture = self.context.device.create_texture_with_data(
            &self.context.queue,
            &wgpu::TextureDescriptor {
                label: Some(&format!("channel texture #{id}")),
                size: wgpu::Extent3d {
                    width: desc.width,
                    height: desc.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu_format(desc.format),
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            TextureDataOrder::LayerMajor,
            pixels,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let handle = TextureHandle(id);
        self.textures.insert(
            handle,
            GpuTexture {
                texture,
                view,
                desc: *desc,
            },
        );
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
        let entry = self
            .textures
            .get(&texture)
            .ok_or_else(|| BackendError::Texture(format!("unknown texture {texture:?}")))?;
        if entry.desc != *desc {
            return Err(BackendError::Texture(format!(
                "update of {:?} does not match allocation {:?}",
                desc, entry.desc
            )));
        }

        self.context.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &entry.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(desc.width * desc.format.bytes_per_pixel()),
                rows_per_image: Some(desc.height),
            },
            wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn release_texture(&mut self, texture: TextureHandle) {
        if let Some(entry) = self.textures.remove(&texture) {
            entry.texture.destroy();
        }
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), BackendError> {
        let max = self.context.max_texture_dimension;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(BackendError::Texture(format!(
                "render target {width}x{height} is outside the supported range 1..={max}"
            )));
        }
        if (width, height) != (self.target.width, self.target.height) {
            self.target = RenderTarget::new(&self.context.device, width, height);
        }
        Ok(())
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<(), BackendError> {
        self.ensure_alive()?;
        self.write_uniforms(call.standard, call.custom);

        let pipeline = self
            .programs
            .get(&call.program)
            .ok_or_else(|| BackendError::Draw(format!("unknown program {:?}", call.program)))?;

        let mut views = Vec::with_capacity(CHANNEL_COUNT);
        for handle in &call.channels {
            let entry = self
                .textures
                .get(handle)
                .ok_or_else(|| BackendError::Draw(format!("unknown texture {handle:?}")))?;
            views.push(&entry.view);
        }
        let views: [&wgpu::TextureView; CHANNEL_COUNT] = views
            .try_into()
            .map_err(|_| BackendError::Draw("channel view count mismatch".into()))?;

        let channel_bind_group =
            self.context
                .device
                .create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("channel bind group"),
                    layout: &self.layouts.channel_layout,
                    entries: &build_channel_entries(&views, &self.sampler),
                });

        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("render encoder"),
                });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("render pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.target.view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            render_pass.set_pipeline(pipeline);
            render_pass.set_bind_group(0, &self.uniforms.bind_group, &[]);
            render_pass.set_bind_group(1, &channel_bind_group, &[]);
            render_pass.draw(0..3, 0..1);
        }
        self.context.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn read_pixels(&mut self, order: ScanlineOrder) -> Result<Vec<u8>, BackendError> {
        self.ensure_alive()?;
        let width = self.target.width;
        let height = self.target.height;
        let unpadded_row = width * 4;
        let padded_row = unpadded_row.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
            * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

        let buffer = self.context.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("read-back buffer"),
            size: padded_row as u64 * height as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("read-back encoder"),
                });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.context.queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (sender, receiver) = crossbeam_channel::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            forward_map_result(&sender, result);
        });
        self.context
            .device
            .poll(wgpu::PollType::Wait)
            .map_err(|err| BackendError::Readback(err.to_string()))?;
        receiver
            .recv()
            .map_err(|err| BackendError::Readback(err.to_string()))?
            .map_err(|err| BackendError::Readback(err.to_string()))?;

        let mut pixels = Vec::with_capacity((unpadded_row * height) as usize);
        {
            let mapped = slice.get_mapped_range();
            for row in mapped.chunks(padded_row as usize) {
                pixels.extend_from_slice(&row[..unpadded_row as usize]);
            }
        }
        buffer.unmap();

        if order == ScanlineOrder::BottomUp {
            flip_rows(&mut pixels, width, height);
        }
        Ok(pixels)
    }

    fn restore(&mut self) -> Result<(), BackendError> {
        let context = GpuContext::new(self.settings).map_err(|err| {
            tracing::warn!(error = %format!("{err:#}"), "failed to recreate GPU device");
            BackendError::DeviceLost
        })?;
        let (width, height) = (self.target.width, self.target.height);
        let rebuilt = Self::from_context(self.settings, context, width, height).map_err(|err| {
            tracing::warn!(error = %format!("{err:#}"), "failed to rebuild renderer state");
            BackendError::DeviceLost
        })?;
        let next_id = self.next_id;
        *self = rebuilt;
        self.next_id = next_id;
        Ok(())
    }

    fn is_lost(&self) -> bool {
        self.context.is_lost()
    }
}

/// Hands a buffer-map result to the waiting reader; false when it gave up.
fn forward_map_result<T>(sender: &crossbeam_channel::Sender<T>, result: T) -> bool {
    match sender.send(result) {
        Ok(()) => true,
        Err(_) => {
            tracing::warn!("read-back finished after its reader went away");
            false
        }
    }
}
