use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse preset catalog: {0}")]
    Json(#[from] serde_json::Error),
    #[error("preset catalog has no presets")]
    Empty,
    #[error("no preset named {0:?}")]
    UnknownPreset(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error("FFT size must be a power of two >= 16, got {0}")]
    NonPowerOfTwo(usize),
    #[error("analyzer needs at least one band")]
    NoBands,
    #[error("invalid band cutoffs {low} Hz .. {high} Hz")]
    BadCutoffs { low: f32, high: f32 },
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("enumerate input devices: {0}")]
    Devices(#[from] cpal::DevicesError),
    #[error("no input device matching: {0}")]
    DeviceNotFound(String),
    #[error("no default input device found")]
    NoDefaultDevice,
    #[error("get default input config: {0}")]
    Config(#[from] cpal::DefaultStreamConfigError),
    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),
    #[error("build input stream: {0}")]
    Build(#[from] cpal::BuildStreamError),
    #[error("start input stream: {0}")]
    Play(#[from] cpal::PlayStreamError),
    #[error("system audio capture: {0}")]
    System(String),
    #[error("--source system is only supported on macOS")]
    SystemUnsupported,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("render target size must be non-zero, got {w}x{h}")]
    ZeroSize { w: usize, h: usize },
    #[error("allocate {bytes} bytes for {w}x{h} render targets")]
    Alloc { w: usize, h: usize, bytes: usize },
    #[error("GPU: {0}")]
    Gpu(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    #[error("unexpected character {ch:?} at {pos}")]
    BadChar { ch: char, pos: usize },
    #[error("malformed number at {pos}")]
    BadNumber { pos: usize },
    #[error("expected {expected} at {pos}, found {found}")]
    Expected {
        expected: &'static str,
        found: String,
        pos: usize,
    },
    #[error("cannot assign to this expression at {pos}")]
    NotAssignable { pos: usize },
    #[error("unknown function {name}() at {pos}")]
    UnknownFunction { name: String, pos: usize },
    #[error("{name}() takes {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error("too many variables")]
    TooManySlots,
    #[error("expression nested too deeply")]
    TooDeep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    #[error("loop iteration budget exhausted")]
    LoopBudget,
    #[error("evaluation stack overflow")]
    StackOverflow,
    #[error("evaluation stack underflow")]
    StackUnderflow,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Analyzer(#[from] AnalyzerError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}
