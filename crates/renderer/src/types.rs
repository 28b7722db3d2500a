use std::path::PathBuf;
use std::time::Duration;

/// Programs may sample four input channels (`iChannel0-3`).
pub const CHANNEL_COUNT: usize = directives::CHANNEL_SLOTS;

/// What currently feeds a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Empty,
    StaticImage,
    VideoFile,
    LiveCamera,
    Microphone,
    NetworkStream,
    ProceduralNoise,
}

impl ChannelKind {
    pub fn label(self) -> &'static str {
        match self {
            ChannelKind::Empty => "empty",
            ChannelKind::StaticImage => "image",
            ChannelKind::VideoFile => "video",
            ChannelKind::LiveCamera => "camera",
            ChannelKind::Microphone => "microphone",
            ChannelKind::NetworkStream => "stream",
            ChannelKind::ProceduralNoise => "noise",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Row order of pixels returned by `read_pixels`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanlineOrder {
    /// First row is the top of the viewport.
    #[default]
    TopDown,
    /// First row is the bottom of the viewport.
    BottomUp,
}

/// Per-frame statistics returned from a render tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameStats {
    /// Program time in seconds, after speed scaling.
    pub time: f32,
    /// Wall-clock seconds since the previous tick.
    pub delta: f32,
    /// Frames per second measured over the rolling window.
    pub fps: f32,
    /// Frame index pushed to the program.
    pub frame: u64,
    pub beat: f32,
    /// False when nothing was drawn (no program, device lost, draw failure).
    pub drawn: bool,
}

/// Start-up options for [`crate::ShaderEngine`].
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOptions {
    pub width: u32,
    pub height: u32,
    pub speed: f32,
    pub fps_window: Duration,
    /// Root of the stored-file texture library.
    pub texture_dir: Option<PathBuf>,
    pub noise_size: u32,
    /// Fixed seed for procedural noise; random when `None`.
    pub noise_seed: Option<u64>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            width: 800,
            height: 450,
            speed: 1.0,
            fps_window: Duration::from_secs(1),
            texture_dir: None,
            noise_size: 256,
            noise_seed: None,
        }
    }
}
