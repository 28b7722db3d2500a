//! Channel source manager: four texture slots (`iChannel0-3`), each fed by
//! one source at a time.
//!
//! Every slot owns exactly one texture handle, its own or the shared 1x1
//! black placeholder. Rebinding always tears the previous source down first,
//! so a failed acquisition leaves the slot empty rather than half configured.
//! Camera, microphone and stream acquisition may complete asynchronously;
//! completions are picked up in [`ChannelManager::refresh`] and outcomes are
//! queued as [`ChannelEvent`]s.

mod gif;
pub mod media;
mod noise;
mod spectrum;

use std::path::PathBuf;
use std::time::Instant;

use directives::{BuiltinPattern, TextureSource, FFT_SIZES};
use image::imageops::flip_vertical_in_place;
use tracing::{debug, info, warn};

use crate::assets::{is_video, TextureLibrary};
use crate::error::{AcquireError, BackendError, ChannelError};
use crate::gpu::{flip_rows, GpuBackend, TextureDesc, TextureHandle};
use crate::types::{ChannelKind, CHANNEL_COUNT};

use self::gif::GifVideo;
use self::media::{
    AudioCapture, FrameSource, LatestFrame, MediaDevices, PendingAcquisition, StreamConnection,
    StreamFeed, VideoFrame,
};
use self::spectrum::SpectrumAnalyser;

pub use self::media::Acquisition;

const EMPTY_RESOLUTION: [f32; 3] = [0.0, 0.0, 1.0];
const OPAQUE_BLACK: [u8; 4] = [0, 0, 0, 255];

/// What to bind to a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelRequest {
    /// Still image decoded from disk (png, jpeg, bmp, first gif frame).
    Image(PathBuf),
    /// Name inside the texture library; `.gif` entries play as video.
    Library(String),
    /// Animated GIF played in a loop.
    Video(PathBuf),
    /// Already decoded still image.
    Pixels(VideoFrame),
    Camera { device: Option<String> },
    Microphone { fft_size: usize },
    Stream { source: String },
    Noise(BuiltinPattern),
}

impl From<&TextureSource> for ChannelRequest {
    fn from(source: &TextureSource) -> Self {
        match source {
            TextureSource::Builtin { pattern } => ChannelRequest::Noise(*pattern),
            TextureSource::File { name } => ChannelRequest::Library(name.clone()),
            TextureSource::Microphone { fft_size } => ChannelRequest::Microphone {
                fft_size: *fft_size,
            },
        }
    }
}

/// Outcome of an acquisition, reported once it is known.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelEvent {
    pub channel: usize,
    pub kind: ChannelKind,
    pub outcome: Result<(), AcquireError>,
}

/// Settings shared by every slot.
#[derive(Debug, Clone, Default)]
pub struct ChannelOptions {
    pub library: Option<TextureLibrary>,
    pub noise_size: u32,
    pub noise_seed: Option<u64>,
}

enum ChannelState {
    Empty,
    StaticImage,
    VideoFile {
        source: Box<dyn FrameSource>,
    },
    LiveCamera {
        source: Box<dyn FrameSource>,
    },
    Microphone {
        capture: Box<dyn AudioCapture>,
        analyser: SpectrumAnalyser,
    },
    NetworkStream {
        connection: Box<dyn StreamConnection>,
        frames: LatestFrame,
    },
    ProceduralNoise,
}

impl ChannelState {
    fn kind(&self) -> ChannelKind {
        match self {
            ChannelState::Empty => ChannelKind::Empty,
            ChannelState::StaticImage => ChannelKind::StaticImage,
            ChannelState::VideoFile { .. } => ChannelKind::VideoFile,
            ChannelState::LiveCamera { .. } => ChannelKind::LiveCamera,
            ChannelState::Microphone { .. } => ChannelKind::Microphone,
            ChannelState::NetworkStream { .. } => ChannelKind::NetworkStream,
            ChannelState::ProceduralNoise => ChannelKind::ProceduralNoise,
        }
    }

    fn stop(self) {
        match self {
            ChannelState::VideoFile { mut source } | ChannelState::LiveCamera { mut source } => {
                source.stop()
            }
            ChannelState::Microphone { mut capture, .. } => capture.stop(),
            ChannelState::NetworkStream { mut connection, .. } => connection.close(),
            ChannelState::Empty | ChannelState::StaticImage | ChannelState::ProceduralNoise => {}
        }
    }
}

enum PendingSource {
    Camera(PendingAcquisition<Box<dyn FrameSource>>),
    Microphone {
        pending: PendingAcquisition<Box<dyn AudioCapture>>,
        fft_size: usize,
    },
    Stream {
        pending: PendingAcquisition<Box<dyn StreamConnection>>,
        frames: LatestFrame,
    },
}

impl PendingSource {
    fn kind(&self) -> ChannelKind {
        match self {
            PendingSource::Camera(_) => ChannelKind::LiveCamera,
            PendingSource::Microphone { .. } => ChannelKind::Microphone,
            PendingSource::Stream { .. } => ChannelKind::NetworkStream,
        }
    }

    /// Drops the acquisition, releasing anything that completed already.
    fn cancel(self) {
        match self {
            PendingSource::Camera(pending) => {
                if let Some(mut source) = pending.cancel() {
                    source.stop();
                }
            }
            PendingSource::Microphone { pending, .. } => {
                if let Some(mut capture) = pending.cancel() {
                    capture.stop();
                }
            }
            PendingSource::Stream { pending, .. } => {
                if let Some(mut connection) = pending.cancel() {
                    connection.close();
                }
            }
        }
    }
}

/// Result of polling a pending acquisition.
enum Completion {
    Waiting(PendingSource),
    Ready(ChannelState),
    Failed(ChannelKind, AcquireError),
}

impl PendingSource {
    fn poll(self) -> Completion {
        match self {
            PendingSource::Camera(pending) => match pending.poll() {
                None => Completion::Waiting(PendingSource::Camera(pending)),
                Some(Ok(source)) => Completion::Ready(ChannelState::LiveCamera { source }),
                Some(Err(error)) => Completion::Failed(ChannelKind::LiveCamera, error),
            },
            PendingSource::Microphone { pending, fft_size } => match pending.poll() {
                None => Completion::Waiting(PendingSource::Microphone { pending, fft_size }),
                Some(Ok(capture)) => Completion::Ready(ChannelState::Microphone {
                    capture,
                    analyser: SpectrumAnalyser::new(fft_size),
                }),
                Some(Err(error)) => Completion::Failed(ChannelKind::Microphone, error),
            },
            PendingSource::Stream { pending, frames } => match pending.poll() {
                None => Completion::Waiting(PendingSource::Stream { pending, frames }),
                Some(Ok(connection)) => {
                    Completion::Ready(ChannelState::NetworkStream { connection, frames })
                }
                Some(Err(error)) => Completion::Failed(ChannelKind::NetworkStream, error),
            },
        }
    }
}

struct ChannelSlot {
    state: ChannelState,
    pending: Option<PendingSource>,
    request: Option<ChannelRequest>,
    texture: Option<TextureHandle>,
    /// Last upload, kept to re-create the texture after device loss.
    uploaded: Option<(TextureDesc, Vec<u8>)>,
    resolution: [f32; 3],
}

impl Default for ChannelSlot {
    fn default() -> Self {
        Self {
            state: ChannelState::Empty,
            pending: None,
            request: None,
            texture: None,
            uploaded: None,
            resolution: EMPTY_RESOLUTION,
        }
    }
}

impl ChannelSlot {
    /// Uploads `pixels`, reallocating only when the shape changed.
    fn upload<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        desc: TextureDesc,
        pixels: Vec<u8>,
    ) -> Result<(), BackendError> {
        let same_shape = matches!(&self.uploaded, Some((current, _)) if *current == desc);
        match self.texture {
            Some(texture) if same_shape => backend.update_texture(texture, &desc, &pixels)?,
            current => {
                let texture = backend.create_texture(&desc, &pixels)?;
                if let Some(old) = current {
                    backend.release_texture(old);
                }
                self.texture = Some(texture);
            }
        }
        self.resolution = [desc.width as f32, desc.height as f32, 1.0];
        self.uploaded = Some((desc, pixels));
        Ok(())
    }

    fn upload_frame<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        mut frame: VideoFrame,
    ) -> Result<(), BackendError> {
        flip_rows(&mut frame.pixels, frame.width, frame.height);
        self.upload(backend, TextureDesc::rgba(frame.width, frame.height), frame.pixels)
    }

    /// Returns the slot to `Empty` on the placeholder.
    fn teardown<B: GpuBackend + ?Sized>(&mut self, backend: &mut B) {
        std::mem::replace(&mut self.state, ChannelState::Empty).stop();
        if let Some(pending) = self.pending.take() {
            pending.cancel();
        }
        if let Some(texture) = self.texture.take() {
            backend.release_texture(texture);
        }
        self.uploaded = None;
        self.request = None;
        self.resolution = EMPTY_RESOLUTION;
    }
}

pub struct ChannelManager {
    slots: [ChannelSlot; CHANNEL_COUNT],
    placeholder: TextureHandle,
    options: ChannelOptions,
    events: Vec<ChannelEvent>,
}

impl ChannelManager {
    pub fn new<B: GpuBackend + ?Sized>(
        backend: &mut B,
        options: ChannelOptions,
    ) -> Result<Self, BackendError> {
        let placeholder = backend.create_texture(&TextureDesc::rgba(1, 1), &OPAQUE_BLACK)?;
        Ok(Self {
            slots: Default::default(),
            placeholder,
            options,
            events: Vec::new(),
        })
    }

    fn check_index(index: usize) -> Result<(), ChannelError> {
        if index < CHANNEL_COUNT {
            Ok(())
        } else {
            Err(ChannelError::InvalidIndex(index))
        }
    }

    /// Tears the channel down and starts acquiring `request`.
    ///
    /// Only an invalid index is an error; acquisition outcomes arrive as
    /// [`ChannelEvent`]s.
    pub fn bind<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        devices: &mut dyn MediaDevices,
        index: usize,
        request: ChannelRequest,
    ) -> Result<(), ChannelError> {
        Self::check_index(index)?;
        self.slots[index].teardown(backend);
        debug!(channel = index, ?request, "binding channel");

        let kind = request_kind(&request);
        match self.acquire(backend, devices, index, &request) {
            Ok(()) => {
                let slot = &mut self.slots[index];
                slot.request = Some(request);
                if slot.pending.is_none() {
                    self.report(index, kind, Ok(()));
                }
            }
            Err(error) => {
                self.slots[index].teardown(backend);
                self.report(index, kind, Err(error));
            }
        }
        Ok(())
    }

    pub fn unbind<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        index: usize,
    ) -> Result<(), ChannelError> {
        Self::check_index(index)?;
        self.slots[index].teardown(backend);
        debug!(channel = index, "channel unbound");
        Ok(())
    }

    fn acquire<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        devices: &mut dyn MediaDevices,
        index: usize,
        request: &ChannelRequest,
    ) -> Result<(), AcquireError> {
        match request {
            ChannelRequest::Image(path) => {
                let pixels = load_image(path)?;
                let slot = &mut self.slots[index];
                let desc = TextureDesc::rgba(pixels.width(), pixels.height());
                slot.upload(backend, desc, pixels.into_raw())?;
                slot.state = ChannelState::StaticImage;
            }
            ChannelRequest::Library(name) => {
                let library = self.options.library.as_ref().ok_or_else(|| {
                    AcquireError::NotFound(format!("no texture library for '{name}'"))
                })?;
                let path = library.resolve(name)?;
                let resolved = if is_video(&path) {
                    ChannelRequest::Video(path)
                } else {
                    ChannelRequest::Image(path)
                };
                self.acquire(backend, devices, index, &resolved)?;
            }
            ChannelRequest::Video(path) => {
                let video = GifVideo::open(path)?;
                self.slots[index].state = ChannelState::VideoFile {
                    source: Box::new(video),
                };
            }
            ChannelRequest::Pixels(frame) => {
                if !frame.is_well_formed() {
                    return Err(AcquireError::Decode(format!(
                        "{}x{} frame with {} bytes",
                        frame.width,
                        frame.height,
                        frame.pixels.len()
                    )));
                }
                let slot = &mut self.slots[index];
                slot.upload_frame(backend, frame.clone())?;
                slot.state = ChannelState::StaticImage;
            }
            ChannelRequest::Camera { device } => match devices.open_camera(device.as_deref()) {
                Acquisition::Ready(result) => {
                    let source = result?;
                    self.slots[index].state = ChannelState::LiveCamera { source };
                }
                Acquisition::Pending(pending) => {
                    self.slots[index].pending = Some(PendingSource::Camera(pending));
                }
            },
            ChannelRequest::Microphone { fft_size } => {
                if !FFT_SIZES.contains(fft_size) {
                    return Err(AcquireError::DeviceUnavailable(format!(
                        "unsupported FFT size {fft_size}"
                    )));
                }
                match devices.open_microphone() {
                    Acquisition::Ready(result) => {
                        let capture = result?;
                        self.install(
                            backend,
                            index,
                            ChannelState::Microphone {
                                capture,
                                analyser: SpectrumAnalyser::new(*fft_size),
                            },
                        )?;
                    }
                    Acquisition::Pending(pending) => {
                        self.slots[index].pending = Some(PendingSource::Microphone {
                            pending,
                            fft_size: *fft_size,
                        });
                    }
                }
            }
            ChannelRequest::Stream { source } => {
                let (feed, frames) = StreamFeed::channel();
                match devices.connect_stream(source, feed) {
                    Acquisition::Ready(result) => {
                        let connection = result?;
                        self.install(
                            backend,
                            index,
                            ChannelState::NetworkStream { connection, frames },
                        )?;
                    }
                    Acquisition::Pending(pending) => {
                        self.slots[index].pending =
                            Some(PendingSource::Stream { pending, frames });
                    }
                }
            }
            ChannelRequest::Noise(pattern) => {
                let seed = self
                    .options
                    .noise_seed
                    .map(|seed| seed.wrapping_add(index as u64));
                let frame = noise::synthesize(*pattern, self.options.noise_size, seed);
                let slot = &mut self.slots[index];
                let desc = TextureDesc::rgba(frame.width, frame.height);
                slot.upload(backend, desc, frame.pixels)?;
                slot.state = ChannelState::ProceduralNoise;
            }
        }
        Ok(())
    }

    /// Puts an acquired live source into the slot with its initial texture.
    fn install<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        index: usize,
        state: ChannelState,
    ) -> Result<(), BackendError> {
        let slot = &mut self.slots[index];
        match &state {
            ChannelState::Microphone { analyser, .. } => {
                slot.upload(backend, analyser.desc(), analyser.buffer().to_vec())?;
            }
            ChannelState::NetworkStream { .. } => {
                slot.upload(backend, TextureDesc::rgba(1, 1), OPAQUE_BLACK.to_vec())?;
                slot.resolution = EMPTY_RESOLUTION;
            }
            _ => {}
        }
        slot.state = state;
        Ok(())
    }

    /// Applies finished acquisitions and pulls new data from live sources.
    pub fn refresh<B: GpuBackend + ?Sized>(&mut self, backend: &mut B, now: Instant) {
        for index in 0..CHANNEL_COUNT {
            self.poll_pending(backend, index);
            if let Err(error) = self.refresh_slot(backend, index, now) {
                warn!(channel = index, %error, "channel update failed");
            }
        }
    }

    fn poll_pending<B: GpuBackend + ?Sized>(&mut self, backend: &mut B, index: usize) {
        let Some(pending) = self.slots[index].pending.take() else {
            return;
        };
        match pending.poll() {
            Completion::Waiting(pending) => self.slots[index].pending = Some(pending),
            Completion::Ready(state) => {
                let kind = state.kind();
                match self.install(backend, index, state) {
                    Ok(()) => self.report(index, kind, Ok(())),
                    Err(error) => {
                        self.slots[index].teardown(backend);
                        self.report(index, kind, Err(error.into()));
                    }
                }
            }
            Completion::Failed(kind, error) => {
                self.slots[index].teardown(backend);
                self.report(index, kind, Err(error));
            }
        }
    }

    fn refresh_slot<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        index: usize,
        now: Instant,
    ) -> Result<(), BackendError> {
        let slot = &mut self.slots[index];
        let frame = match &mut slot.state {
            ChannelState::VideoFile { source } | ChannelState::LiveCamera { source } => {
                source.poll_frame(now)
            }
            // Only the newest queued frame is uploaded.
            ChannelState::NetworkStream { frames, .. } => frames.take(),
            ChannelState::Microphone { capture, analyser } => {
                let samples = capture.drain_samples();
                analyser.process(&samples);
                let desc = analyser.desc();
                let buffer = analyser.buffer().to_vec();
                return slot.upload(backend, desc, buffer);
            }
            ChannelState::Empty | ChannelState::StaticImage | ChannelState::ProceduralNoise => None,
        };

        match frame {
            Some(frame) if frame.is_well_formed() => slot.upload_frame(backend, frame),
            Some(frame) => {
                warn!(
                    channel = index,
                    width = frame.width,
                    height = frame.height,
                    bytes = frame.pixels.len(),
                    "dropping malformed frame"
                );
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn report(&mut self, channel: usize, kind: ChannelKind, outcome: Result<(), AcquireError>) {
        match &outcome {
            Ok(()) => info!(channel, %kind, "channel source acquired"),
            Err(error) => warn!(channel, %kind, %error, "channel acquisition failed"),
        }
        self.events.push(ChannelEvent {
            channel,
            kind,
            outcome,
        });
    }

    pub fn take_events(&mut self) -> Vec<ChannelEvent> {
        std::mem::take(&mut self.events)
    }

    /// Current kind; a channel still waiting on its acquisition is `Empty`.
    pub fn kind(&self, index: usize) -> Option<ChannelKind> {
        self.slots.get(index).map(|slot| slot.state.kind())
    }

    pub fn resolution(&self, index: usize) -> Option<[f32; 3]> {
        self.slots.get(index).map(|slot| slot.resolution)
    }

    /// The request a channel was last bound with, while it is bound.
    pub fn request(&self, index: usize) -> Option<&ChannelRequest> {
        self.slots.get(index).and_then(|slot| slot.request.as_ref())
    }

    pub fn is_pending(&self, index: usize) -> bool {
        self.slots
            .get(index)
            .is_some_and(|slot| slot.pending.is_some())
    }

    /// Kind the channel will have once its in-flight acquisition completes.
    pub fn pending_kind(&self, index: usize) -> Option<ChannelKind> {
        self.slots
            .get(index)
            .and_then(|slot| slot.pending.as_ref())
            .map(PendingSource::kind)
    }

    pub fn textures(&self) -> [TextureHandle; CHANNEL_COUNT] {
        std::array::from_fn(|index| self.slots[index].texture.unwrap_or(self.placeholder))
    }

    pub fn placeholder(&self) -> TextureHandle {
        self.placeholder
    }

    /// Beat of the first microphone channel, or 0.
    pub fn beat_estimate(&self) -> f32 {
        self.slots
            .iter()
            .find_map(|slot| match &slot.state {
                ChannelState::Microphone { analyser, .. } => Some(analyser.beat()),
                _ => None,
            })
            .unwrap_or(0.0)
    }

    /// Re-creates the placeholder and every channel texture after the backend
    /// was restored. Previously issued handles are assumed gone.
    pub fn rebuild<B: GpuBackend + ?Sized>(&mut self, backend: &mut B) -> Result<(), BackendError> {
        self.placeholder = backend.create_texture(&TextureDesc::rgba(1, 1), &OPAQUE_BLACK)?;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            slot.texture = None;
            if let Some((desc, pixels)) = &slot.uploaded {
                slot.texture = Some(backend.create_texture(desc, pixels)?);
                debug!(
                    channel = index,
                    width = desc.width,
                    height = desc.height,
                    "channel texture rebuilt"
                );
            }
        }
        Ok(())
    }

    pub fn teardown_all<B: GpuBackend + ?Sized>(&mut self, backend: &mut B) {
        for slot in &mut self.slots {
            slot.teardown(backend);
        }
        backend.release_texture(self.placeholder);
    }
}

fn request_kind(request: &ChannelRequest) -> ChannelKind {
    match request {
        ChannelRequest::Image(_) | ChannelRequest::Pixels(_) => ChannelKind::StaticImage,
        ChannelRequest::Library(name) => {
            if is_video(std::path::Path::new(name)) {
                ChannelKind::VideoFile
            } else {
                ChannelKind::StaticImage
            }
        }
        ChannelRequest::Video(_) => ChannelKind::VideoFile,
        ChannelRequest::Camera { .. } => ChannelKind::LiveCamera,
        ChannelRequest::Microphone { .. } => ChannelKind::Microphone,
        ChannelRequest::Stream { .. } => ChannelKind::NetworkStream,
        ChannelRequest::Noise(_) => ChannelKind::ProceduralNoise,
    }
}

/// Decodes an image as RGBA8 with the bottom row first.
fn load_image(path: &std::path::Path) -> Result<image::RgbaImage, AcquireError> {
    let image = image::open(path).map_err(|error| match error {
        image::ImageError::IoError(io) if io.kind() == std::io::ErrorKind::NotFound => {
            AcquireError::NotFound(path.display().to_string())
        }
        image::ImageError::IoError(io) if io.kind() == std::io::ErrorKind::PermissionDenied => {
            AcquireError::PermissionDenied(path.display().to_string())
        }
        other => AcquireError::Decode(format!("{}: {other}", path.display())),
    })?;
    let mut rgba = image.to_rgba8();
    flip_vertical_in_place(&mut rgba);
    Ok(rgba)
}
