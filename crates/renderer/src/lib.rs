//! Renderer for live-tunable fragment programs.
//!
//! A program is a GLSL `mainImage` body annotated with `// @param` and
//! `// @texture` directives. The engine wraps it with the standard inputs and
//! a custom uniform block, compiles it on a [`GpuBackend`], feeds its four
//! channels, and keeps uniforms in sync every frame:
//!
//! ```text
//!   source ──▶ directives::parse_directives ──▶ compile::assemble_program
//!                                                     │
//!                                                     ▼
//!   ShaderEngine::compile ──▶ program::compile ──▶ GpuBackend::compile_program
//!          │
//!          ▼
//!   ShaderEngine::render(now)
//!          ├─▶ ChannelManager::refresh      (video, camera, mic, stream)
//!          ├─▶ TimingState::advance         (time, delta, fps)
//!          ├─▶ StandardUniforms + CustomUniformBlock
//!          └─▶ GpuBackend::draw ──▶ FrameStats
//! ```
//!
//! [`WgpuBackend`] renders offscreen on a real device; [`HeadlessBackend`]
//! validates programs on the CPU and records what would have been drawn.

pub mod assets;
pub mod channels;
pub mod compile;
mod engine;
pub mod error;
pub mod gpu;
mod mouse;
mod params;
pub mod program;
mod timing;
mod types;
pub mod uniforms;

pub use assets::TextureLibrary;
pub use channels::media::{
    AcquireResult, Acquisition, AudioCapture, Completer, FrameSource, MediaDevices,
    NoMediaDevices, PendingAcquisition, StreamConnection, StreamFeed, VideoFrame,
};
pub use channels::{ChannelEvent, ChannelManager, ChannelOptions, ChannelRequest};
pub use compile::{assemble_program, parse_compile_log, AssembledProgram};
pub use engine::ShaderEngine;
pub use error::{
    AcquireError, BackendError, ChannelError, CompileError, EngineError, ParameterError,
};
pub use gpu::{
    GpuBackend, GpuSettings, HeadlessBackend, MemoryHint, PowerHint, ProgramHandle,
    TextureHandle, WgpuBackend,
};
pub use program::{compile as compile_program, CompiledProgram, ProgramBinding};
pub use types::{ChannelKind, EngineOptions, FrameStats, ScanlineOrder, CHANNEL_COUNT};
