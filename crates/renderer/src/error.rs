use thiserror::Error;

/// Failure reported by a GPU backend.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    #[error("shader compilation failed:\n{log}")]
    ShaderCompile { log: String },
    #[error("texture operation failed: {0}")]
    Texture(String),
    #[error("draw failed: {0}")]
    Draw(String),
    #[error("pixel read-back failed: {0}")]
    Readback(String),
    #[error("GPU device lost")]
    DeviceLost,
}

/// A program that failed to compile, with the line remapped into user source.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{}", describe_compile_error(.line, .message))]
pub struct CompileError {
    /// 1-based line in the user's source, `None` when the error lies in
    /// generated code or carries no position.
    pub line: Option<usize>,
    pub message: String,
    /// Unmodified compiler log.
    pub raw: String,
}

fn describe_compile_error(line: &Option<usize>, message: &str) -> String {
    match line {
        Some(line) => format!("line {line}: {message}"),
        None => message.to_string(),
    }
}

/// Why a channel source could not be acquired.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AcquireError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("backend failure: {0}")]
    Backend(String),
}

impl From<BackendError> for AcquireError {
    fn from(error: BackendError) -> Self {
        AcquireError::Backend(error.to_string())
    }
}

/// A rejected parameter write. The stored value is left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParameterError {
    #[error("unknown parameter '{name}'")]
    Unknown { name: String },
    #[error("index {index} out of range for parameter '{name}' with {len} element(s)")]
    IndexOutOfRange {
        name: String,
        index: usize,
        len: usize,
    },
    #[error("value does not match the shape of parameter '{name}' (expected {expected})")]
    ShapeMismatch { name: String, expected: String },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChannelError {
    #[error("channel index {0} is out of range")]
    InvalidIndex(usize),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("GPU device lost; waiting for restoration")]
    DeviceLost,
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
}
