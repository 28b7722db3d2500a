use std::time::Instant;

use directives::{ParamValue, ParameterDefinition, ParameterValues, ParsedSource};
use tracing::{debug, info, warn};

use crate::assets::TextureLibrary;
use crate::channels::media::{MediaDevices, NoMediaDevices};
use crate::channels::{ChannelEvent, ChannelManager, ChannelOptions, ChannelRequest};
use crate::error::{BackendError, ChannelError, EngineError, ParameterError};
use crate::gpu::{DrawCall, GpuBackend};
use crate::mouse::MouseState;
use crate::params::ParameterStore;
use crate::program::{compile, ProgramBinding};
use crate::timing::TimingState;
use crate::types::{ChannelKind, EngineOptions, FrameStats, ScanlineOrder, CHANNEL_COUNT};
use crate::uniforms::{CustomUniformBlock, StandardUniforms};

struct ActiveProgram {
    binding: ProgramBinding,
    parsed: ParsedSource,
}

/// Owns every piece of renderer state: the backend, the active program and
/// its parameters, the four channels, and the clock.
///
/// Single threaded; call [`ShaderEngine::render`] once per frame from the
/// thread that owns the engine.
pub struct ShaderEngine<B: GpuBackend> {
    backend: B,
    devices: Box<dyn MediaDevices>,
    channels: ChannelManager,
    program: Option<ActiveProgram>,
    params: ParameterStore,
    last_good_source: Option<String>,
    timing: TimingState,
    mouse: MouseState,
    standard: StandardUniforms,
    custom: CustomUniformBlock,
    width: u32,
    height: u32,
    device_lost: bool,
}

impl<B: GpuBackend> ShaderEngine<B> {
    pub fn new(mut backend: B, options: EngineOptions) -> Result<Self, EngineError> {
        backend.resize(options.width, options.height)?;
        let channels = ChannelManager::new(
            &mut backend,
            ChannelOptions {
                library: options.texture_dir.clone().map(TextureLibrary::new),
                noise_size: options.noise_size,
                noise_seed: options.noise_seed,
            },
        )?;
        info!(
            width = options.width,
            height = options.height,
            speed = options.speed,
            "shader engine ready"
        );
        Ok(Self {
            backend,
            devices: Box::new(NoMediaDevices),
            channels,
            program: None,
            params: ParameterStore::default(),
            last_good_source: None,
            timing: TimingState::new(options.speed, options.fps_window),
            mouse: MouseState::default(),
            standard: StandardUniforms::new(options.width, options.height),
            custom: CustomUniformBlock::default(),
            width: options.width,
            height: options.height,
            device_lost: false,
        })
    }

    /// Replaces the provider used for camera, microphone and stream channels.
    pub fn with_media_devices(mut self, devices: Box<dyn MediaDevices>) -> Self {
        self.devices = devices;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Compiles `source` and makes it the active program.
    ///
    /// On failure the previous program, its parameter values and the channel
    /// bindings stay untouched.
    pub fn compile(&mut self, source: &str) -> Result<(), EngineError> {
        if self.check_device_lost() {
            return Err(EngineError::DeviceLost);
        }
        self.install_program(source, false)
    }

    fn install_program(&mut self, source: &str, keep_values: bool) -> Result<(), EngineError> {
        let compiled = match compile(&mut self.backend, source) {
            Ok(compiled) => compiled,
            Err(error) => {
                if self.check_device_lost() {
                    return Err(EngineError::DeviceLost);
                }
                warn!(
                    line = ?error.line,
                    message = %error.message,
                    "compile failed; keeping previous program"
                );
                return Err(error.into());
            }
        };

        if let Some(previous) = self.program.take() {
            self.backend.release_program(previous.binding.handle);
        }

        let mut params = ParameterStore::new(compiled.parsed.params.clone());
        if keep_values {
            params.carry_over_from(std::mem::take(&mut self.params));
        }
        self.params = params;
        self.custom = CustomUniformBlock::new(compiled.binding.block_size);

        for directive in &compiled.parsed.textures {
            let request = ChannelRequest::from(&directive.source);
            if self.channels.request(directive.channel) == Some(&request) {
                continue;
            }
            self.channels.bind(
                &mut self.backend,
                self.devices.as_mut(),
                directive.channel,
                request,
            )?;
        }

        info!(
            params = compiled.parsed.params.len(),
            textures = compiled.parsed.textures.len(),
            "program active"
        );
        self.program = Some(ActiveProgram {
            binding: compiled.binding,
            parsed: compiled.parsed,
        });
        self.last_good_source = Some(source.to_string());
        Ok(())
    }

    pub fn has_program(&self) -> bool {
        self.program.is_some()
    }

    /// Directives of the active program.
    pub fn parsed_source(&self) -> Option<&ParsedSource> {
        self.program.as_ref().map(|program| &program.parsed)
    }

    pub fn last_good_source(&self) -> Option<&str> {
        self.last_good_source.as_deref()
    }

    pub fn parameters(&self) -> &[ParameterDefinition] {
        self.params.definitions()
    }

    pub fn parameter_values(&self) -> &ParameterValues {
        self.params.values()
    }

    /// Type-checked write picked up by the next frame. `index` selects one
    /// element of an array parameter.
    pub fn set_parameter(
        &mut self,
        name: &str,
        index: Option<usize>,
        value: ParamValue,
    ) -> Result<(), ParameterError> {
        self.params.set(name, index, value).inspect_err(|error| {
            debug!(%error, "parameter write ignored");
        })
    }

    pub fn bind_channel(
        &mut self,
        index: usize,
        request: ChannelRequest,
    ) -> Result<(), ChannelError> {
        self.channels
            .bind(&mut self.backend, self.devices.as_mut(), index, request)
    }

    pub fn unbind_channel(&mut self, index: usize) -> Result<(), ChannelError> {
        self.channels.unbind(&mut self.backend, index)
    }

    pub fn channel_kind(&self, index: usize) -> Option<ChannelKind> {
        self.channels.kind(index)
    }

    pub fn channel_resolution(&self, index: usize) -> Option<[f32; 3]> {
        self.channels.resolution(index)
    }

    /// Acquisition outcomes since the previous call.
    pub fn take_channel_events(&mut self) -> Vec<ChannelEvent> {
        self.channels.take_events()
    }

    pub fn play(&mut self, now: Instant) {
        self.timing.play(now);
    }

    pub fn pause(&mut self, now: Instant) {
        self.timing.pause(now);
    }

    pub fn reset(&mut self, now: Instant) {
        self.timing.reset(now);
    }

    pub fn seek(&mut self, seconds: f64, now: Instant) {
        self.timing.seek(seconds, now);
    }

    pub fn set_speed(&mut self, speed: f32, now: Instant) {
        self.timing.set_speed(speed, now);
    }

    pub fn is_playing(&self) -> bool {
        self.timing.is_playing()
    }

    pub fn speed(&self) -> f32 {
        self.timing.speed()
    }

    pub fn frame_count(&self) -> u64 {
        self.timing.frame_count()
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), EngineError> {
        self.backend.resize(width, height)?;
        self.width = width;
        self.height = height;
        debug!(width, height, "viewport resized");
        Ok(())
    }

    /// Cursor position in viewport pixels, origin at the top-left.
    pub fn mouse_moved(&mut self, x: f32, y: f32) {
        self.mouse.cursor_moved(x, y);
    }

    pub fn mouse_button(&mut self, pressed: bool) {
        self.mouse.button(pressed);
    }

    /// Runs one frame: channel refresh, uniform sync, draw.
    pub fn render(&mut self, now: Instant) -> FrameStats {
        self.tick(now, true)
    }

    /// Everything [`Self::render`] does except the draw.
    pub fn advance_time_only(&mut self, now: Instant) -> FrameStats {
        self.tick(now, false)
    }

    fn tick(&mut self, now: Instant, draw: bool) -> FrameStats {
        if self.check_device_lost() {
            return FrameStats {
                time: self.timing.time_at(now) as f32,
                delta: 0.0,
                fps: self.timing.fps(),
                frame: self.timing.frame_count(),
                beat: 0.0,
                drawn: false,
            };
        }

        self.channels.refresh(&mut self.backend, now);
        let clock = self.timing.advance(now);
        let frame = self.timing.frame_count();
        let beat = self.channels.beat_estimate();

        self.standard.set_resolution(self.width, self.height);
        self.standard.time = clock.time;
        self.standard.time_delta = clock.delta;
        self.standard.frame = frame as i32;
        self.standard.frame_rate = clock.fps;
        self.standard.beat = beat;
        self.standard.mouse = self.mouse.as_uniform(self.height as f32);
        self.standard.refresh_date();
        for index in 0..CHANNEL_COUNT {
            let resolution = self.channels.resolution(index).unwrap_or([0.0, 0.0, 1.0]);
            self.standard.set_channel_resolution(index, resolution);
        }

        let mut drawn = false;
        if let Some(program) = &self.program {
            self.custom.begin_frame();
            program
                .binding
                .write_values(self.params.values(), &mut self.custom);

            if draw {
                let call = DrawCall {
                    program: program.binding.handle,
                    standard: self.standard.as_bytes(),
                    custom: self.custom.as_bytes(),
                    channels: self.channels.textures(),
                };
                match self.backend.draw(&call) {
                    Ok(()) => drawn = true,
                    Err(BackendError::DeviceLost) => self.mark_device_lost(),
                    Err(error) => warn!(%error, "draw failed"),
                }
            }
        }

        self.timing.complete_frame();
        FrameStats {
            time: clock.time,
            delta: clock.delta,
            fps: clock.fps,
            frame,
            beat,
            drawn,
        }
    }

    /// RGBA8 read-back of the last frame, `width * height * 4` bytes.
    pub fn read_pixels(&mut self, order: ScanlineOrder) -> Result<Vec<u8>, EngineError> {
        if self.check_device_lost() {
            return Err(EngineError::DeviceLost);
        }
        self.backend.read_pixels(order).map_err(|error| match error {
            BackendError::DeviceLost => {
                self.mark_device_lost();
                EngineError::DeviceLost
            }
            other => other.into(),
        })
    }

    pub fn is_device_lost(&self) -> bool {
        self.device_lost
    }

    /// Stops rendering until [`Self::notify_device_restored`].
    pub fn notify_device_lost(&mut self) {
        self.mark_device_lost();
    }

    /// Restores the backend, re-creates channel textures and recompiles the
    /// last good program. Parameter values survive when its definitions are
    /// unchanged.
    pub fn notify_device_restored(&mut self) -> Result<(), EngineError> {
        self.backend.restore()?;
        // Handles issued before the loss are gone with the old device.
        self.program = None;
        self.channels.rebuild(&mut self.backend)?;
        self.device_lost = false;
        info!("GPU device restored");

        if let Some(source) = self.last_good_source.clone() {
            self.install_program(&source, true)?;
        }
        Ok(())
    }

    fn check_device_lost(&mut self) -> bool {
        if !self.device_lost && self.backend.is_lost() {
            self.mark_device_lost();
        }
        self.device_lost
    }

    fn mark_device_lost(&mut self) {
        if !self.device_lost {
            warn!("GPU device lost; rendering paused");
        }
        self.device_lost = true;
    }
}

impl<B: GpuBackend> Drop for ShaderEngine<B> {
    fn drop(&mut self) {
        if let Some(program) = self.program.take() {
            self.backend.release_program(program.binding.handle);
        }
        self.channels.teardown_all(&mut self.backend);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::gpu::HeadlessBackend;
    use crate::uniforms::UniformLocation;

    const PROGRAM: &str = "// @param gain float 0.5 [0, 1]\n// @param tint color [1, 0.5, 0.25]\nvoid mainImage(out vec4 fragColor, in vec2 fragCoord) {\n    fragColor = vec4(tint * gain, 1.0);\n}\n";

    fn engine() -> ShaderEngine<HeadlessBackend> {
        let options = EngineOptions {
            width: 64,
            height: 32,
            noise_size: 4,
            noise_seed: Some(1),
            ..EngineOptions::default()
        };
        ShaderEngine::new(HeadlessBackend::new(1, 1), options).unwrap()
    }

    fn standard_of(engine: &ShaderEngine<HeadlessBackend>) -> StandardUniforms {
        let draw = engine.backend().last_draw().expect("a draw");
        bytemuck::pod_read_unaligned::<StandardUniforms>(&draw.standard)
    }

    #[test]
    fn hundred_ticks_at_sixty_hertz_and_double_speed() {
        let mut engine = engine();
        engine.compile(PROGRAM).unwrap();
        let start = Instant::now();
        let step = Duration::from_secs_f64(1.0 / 60.0);
        engine.set_speed(2.0, start);

        let mut last = None;
        for tick in 0..100u32 {
            last = Some(engine.render(start + step * tick));
        }
        let stats = last.unwrap();

        assert_eq!(engine.frame_count(), 100);
        assert_eq!(stats.frame, 99);
        assert!(stats.drawn);
        assert_eq!(engine.backend().draws().len(), 100);
        let elapsed = (step * 99).as_secs_f32();
        assert!(
            (stats.time - elapsed * 2.0).abs() < 1e-3,
            "time {} after {elapsed}s",
            stats.time
        );
        assert!((55.0..65.0).contains(&stats.fps), "fps {}", stats.fps);
        assert_eq!(standard_of(&engine).time, stats.time);
    }

    #[test]
    fn pausing_at_two_seconds_keeps_time_continuous() {
        let mut engine = engine();
        engine.compile(PROGRAM).unwrap();
        let start = Instant::now();
        let step = Duration::from_secs_f64(1.0 / 60.0);
        let pause_at = start + Duration::from_secs(2);

        engine.render(start);
        let before = engine.render(pause_at).time;
        assert!((before - 2.0).abs() < 1e-4);

        engine.pause(pause_at);
        let frames = engine.frame_count();
        let held = engine.render(pause_at + Duration::from_secs(3)).time;
        assert!((held - 2.0).abs() < 1e-4);
        assert_eq!(engine.frame_count(), frames);

        let resume_at = pause_at + Duration::from_secs(5);
        engine.play(resume_at);
        let resumed = engine.render(resume_at).time;
        assert!((resumed - 2.0).abs() < 1e-4);
        let next = engine.render(resume_at + step).time;
        assert!(((next - resumed) - step.as_secs_f32()).abs() < 1e-4);
        assert_eq!(engine.frame_count(), frames + 2);
    }

    #[test]
    fn compile_exposes_parameters_with_defaults() {
        let mut engine = engine();
        engine.compile(PROGRAM).unwrap();
        assert!(engine.has_program());
        let names: Vec<_> = engine.parameters().iter().map(|def| def.name.as_str()).collect();
        assert_eq!(names, ["gain", "tint"]);
        assert_eq!(
            engine.parameter_values().get("gain"),
            Some(&ParamValue::Float(0.5))
        );
    }

    #[test]
    fn failed_compile_keeps_the_previous_program() {
        let mut engine = engine();
        engine.compile(PROGRAM).unwrap();
        engine.set_parameter("gain", None, ParamValue::Float(0.9)).unwrap();

        let broken = "// @param other int 1\nvoid mainImage(out vec4 c, in vec2 p) {\n    c = nope;\n}\n";
        let Err(EngineError::Compile(error)) = engine.compile(broken) else {
            panic!("expected a compile error");
        };
        assert_eq!(error.line, Some(3));

        assert_eq!(engine.backend().live_programs(), 1);
        assert_eq!(engine.parameters().len(), 2);
        assert_eq!(
            engine.parameter_values().get("gain"),
            Some(&ParamValue::Float(0.9))
        );
        assert_eq!(engine.last_good_source(), Some(PROGRAM));
        assert!(engine.render(Instant::now()).drawn);
    }

    #[test]
    fn recompile_releases_the_old_program_and_resets_values() {
        let mut engine = engine();
        engine.compile(PROGRAM).unwrap();
        engine.set_parameter("gain", None, ParamValue::Float(0.9)).unwrap();
        engine.compile(PROGRAM).unwrap();
        assert_eq!(engine.backend().live_programs(), 1);
        assert_eq!(
            engine.parameter_values().get("gain"),
            Some(&ParamValue::Float(0.5))
        );
    }

    #[test]
    fn render_pushes_standard_inputs() {
        let mut engine = engine();
        engine.compile(PROGRAM).unwrap();
        engine.mouse_moved(10.0, 4.0);
        engine.mouse_button(true);
        engine.mouse_button(false);

        let start = Instant::now();
        let first = engine.render(start);
        assert!(first.drawn);
        assert_eq!(first.frame, 0);
        assert_eq!(first.time, 0.0);
        assert_eq!(first.beat, 0.0);

        let second = engine.render(start + Duration::from_millis(250));
        assert_eq!(second.frame, 1);
        assert!((second.time - 0.25).abs() < 1e-4);
        assert!((second.delta - 0.25).abs() < 1e-4);

        let uniforms = standard_of(&engine);
        assert_eq!(uniforms.resolution, [64.0, 32.0, 1.0]);
        assert_eq!(uniforms.frame, 1);
        assert_eq!(uniforms.mouse, [10.0, 28.0, -10.0, -28.0]);
        assert_eq!(uniforms.channel_resolution[0], [0.0, 0.0, 1.0, 0.0]);
        assert!(uniforms.date[1] >= 1.0 && uniforms.date[1] <= 12.0);
    }

    #[test]
    fn parameter_writes_reach_the_custom_block() {
        let mut engine = engine();
        engine.compile(PROGRAM).unwrap();
        engine.set_parameter("gain", None, ParamValue::Int(1)).unwrap();
        assert!(matches!(
            engine.set_parameter("tint", None, ParamValue::Float(1.0)),
            Err(ParameterError::ShapeMismatch { .. })
        ));
        engine.render(Instant::now());

        let draw = engine.backend().last_draw().unwrap();
        let mut block = CustomUniformBlock::new(draw.custom.len() as u32);
        block.set_float(UniformLocation(0), 1.0);
        block.set_vec3(UniformLocation(16), [1.0, 0.5, 0.25]);
        assert_eq!(draw.custom, block.as_bytes());
    }

    #[test]
    fn paused_engine_freezes_time_and_frame() {
        let mut engine = engine();
        engine.compile(PROGRAM).unwrap();
        let start = Instant::now();
        engine.render(start);
        engine.pause(start + Duration::from_millis(100));
        let a = engine.render(start + Duration::from_millis(200));
        let b = engine.render(start + Duration::from_millis(900));
        assert_eq!(a.frame, b.frame);
        assert_eq!(a.time, b.time);
        assert!(b.drawn);
        engine.play(start + Duration::from_millis(1000));
        assert!(engine.is_playing());
    }

    #[test]
    fn ticks_without_a_program_still_advance_time() {
        let mut engine = engine();
        let start = Instant::now();
        engine.render(start);
        let stats = engine.render(start + Duration::from_millis(500));
        assert!(!stats.drawn);
        assert!((stats.time - 0.5).abs() < 1e-4);
        assert!(engine.backend().draws().is_empty());
    }

    #[test]
    fn advance_time_only_skips_the_draw() {
        let mut engine = engine();
        engine.compile(PROGRAM).unwrap();
        let stats = engine.advance_time_only(Instant::now());
        assert!(!stats.drawn);
        assert_eq!(engine.frame_count(), 1);
        assert!(engine.backend().draws().is_empty());
    }

    #[test]
    fn texture_directives_bind_channels_once() {
        let source = "// @texture iChannel1 noise-rgb\nvoid mainImage(out vec4 c, in vec2 p) { c = texture(iChannel1, p / iResolution.xy); }\n";
        let mut engine = engine();
        engine.compile(source).unwrap();
        assert_eq!(engine.channel_kind(1), Some(ChannelKind::ProceduralNoise));
        assert_eq!(engine.channel_resolution(1), Some([4.0, 4.0, 1.0]));
        let allocations = engine.backend().allocations();
        engine.compile(source).unwrap();
        assert_eq!(engine.backend().allocations(), allocations);

        engine.render(Instant::now());
        assert_eq!(standard_of(&engine).channel_resolution[1], [4.0, 4.0, 1.0, 0.0]);
    }

    #[test]
    fn missing_library_texture_reports_an_event_and_still_compiles() {
        let source = "// @texture 0 file rock.png\nvoid mainImage(out vec4 c, in vec2 p) { c = vec4(1.0); }\n";
        let mut engine = engine();
        engine.compile(source).unwrap();
        assert_eq!(engine.channel_kind(0), Some(ChannelKind::Empty));
        let events = engine.take_channel_events();
        assert_eq!(events.len(), 1);
        assert!(events[0].outcome.is_err());
        assert!(engine.render(Instant::now()).drawn);
    }

    #[test]
    fn bad_channel_index_is_an_error() {
        let mut engine = engine();
        assert_eq!(engine.unbind_channel(7), Err(ChannelError::InvalidIndex(7)));
    }

    #[test]
    fn read_back_matches_the_viewport() {
        let mut engine = engine();
        let pixels = engine.read_pixels(ScanlineOrder::TopDown).unwrap();
        assert_eq!(pixels.len(), 64 * 32 * 4);
        engine.resize(16, 8).unwrap();
        let pixels = engine.read_pixels(ScanlineOrder::BottomUp).unwrap();
        assert_eq!(pixels.len(), 16 * 8 * 4);
        assert_eq!(engine.size(), (16, 8));
    }

    #[test]
    fn device_loss_pauses_until_restored() {
        let mut engine = engine();
        engine.compile(PROGRAM).unwrap();
        engine
            .bind_channel(2, ChannelRequest::Noise(directives::BuiltinPattern::Noise))
            .unwrap();
        engine.set_parameter("gain", None, ParamValue::Float(0.75)).unwrap();

        engine.backend_mut().lose_device();
        let stats = engine.render(Instant::now());
        assert!(!stats.drawn);
        assert!(engine.is_device_lost());
        assert_eq!(engine.compile(PROGRAM), Err(EngineError::DeviceLost));
        assert_eq!(
            engine.read_pixels(ScanlineOrder::TopDown),
            Err(EngineError::DeviceLost)
        );

        engine.notify_device_restored().unwrap();
        assert!(!engine.is_device_lost());
        assert!(engine.has_program());
        assert_eq!(engine.backend().live_programs(), 1);
        assert_eq!(
            engine.parameter_values().get("gain"),
            Some(&ParamValue::Float(0.75))
        );
        assert_eq!(engine.channel_kind(2), Some(ChannelKind::ProceduralNoise));
        assert!(engine.render(Instant::now()).drawn);
    }

    #[test]
    fn explicit_loss_notification_stops_drawing() {
        let mut engine = engine();
        engine.compile(PROGRAM).unwrap();
        engine.notify_device_lost();
        assert!(!engine.render(Instant::now()).drawn);
        engine.notify_device_restored().unwrap();
        assert!(engine.render(Instant::now()).drawn);
    }
}
