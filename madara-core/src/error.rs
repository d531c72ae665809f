//! Error taxonomy for the knowledge runtime.
//!
//! KaRL evaluation itself never returns `Result` for per-node failures —
//! runtime errors are logged and the offending node yields `Record::Empty`
//! (see `karl::eval`). These types are for the operations that *do* have a
//! meaningful failure to report: compilation, checkpoint I/O, and typed
//! `Any` access.

/// A single fatal structural problem found while pruning a compiled tree.
///
/// Compile errors abort compilation of the expression that produced them;
/// they never poison the `Context` the expression would have run against.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CompileError {
    #[error("division has no left operand")]
    DivideMissingLeft,
    #[error("division has no right operand")]
    DivideMissingRight,
    #[error("modulo has no left operand")]
    ModuloMissingLeft,
    #[error("modulo has no right operand")]
    ModuloMissingRight,
    #[error("division results in a permanent divide by zero")]
    ConstantDivideByZero,
    #[error("modulo results in a permanent divide by zero")]
    ConstantModuloByZero,
    #[error("binary operator '{op}' is missing an operand")]
    MissingOperand { op: &'static str },
    #[error("malformed for-loop header: {reason}")]
    MalformedForLoop { reason: String },
    #[error("unknown system call '#{name}'")]
    UnknownSystemCall { name: String },
    #[error("system call '#{name}' called with {got} argument(s), expected {expected}")]
    SystemCallArity {
        name: String,
        expected: &'static str,
        got: usize,
    },
    #[error("unbalanced braces in expandable segment")]
    UnbalancedBraces,
    #[error("unexpected token: {0}")]
    UnexpectedToken(String),
    #[error("unexpected end of input")]
    UnexpectedEof,
}

/// Raised when a typed read of an `Any` record observes a mismatched tag,
/// an undecoded payload with no registered codec, or an empty value.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum BadAnyAccess {
    #[error("Any value tagged '{found}' does not match requested type '{expected}'")]
    TagMismatch { expected: String, found: String },
    #[error("Any tag '{tag}' has no registered codec")]
    UnregisteredTag { tag: String },
    #[error("Any payload is empty")]
    Empty,
}

/// Surfaced to callers by the filter chain / transport façade. The core
/// never originates these itself; it only defines the shape a transport
/// implementation reports through.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("send rejected: {reason}")]
    SendRejected { reason: String },
    #[error("bandwidth budget exhausted for this interval")]
    BandwidthExhausted,
    #[error("peer '{0}' is banned")]
    PeerBanned(String),
}

/// Errors from the checkpoint codec (§6 of the spec — header/state layout).
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("bad checkpoint magic (expected 'KaRL')")]
    BadMagic,
    #[error("unsupported checkpoint version {0}")]
    UnsupportedVersion(u32),
    #[error("truncated checkpoint: expected {expected} more byte(s)")]
    Truncated { expected: usize },
    #[error("invalid record type tag {0}")]
    InvalidRecordType(u32),
    #[error("invalid UTF-8 in checkpoint string field")]
    InvalidUtf8,
}

/// Top-level error type returned by the library boundary (`Kb`,
/// `Interpreter::compile`). The CLI and other callers wrap this in
/// `anyhow::Context` as needed.
#[derive(Debug, thiserror::Error)]
pub enum MadaraError {
    #[error("compile error(s): {0:?}")]
    Compile(Vec<CompileError>),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error(transparent)]
    BadAny(#[from] BadAnyAccess),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}
