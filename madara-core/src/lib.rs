//! Core Knowledge Base runtime: typed records, the thread-safe shared
//! `Context`, the embedded KaRL expression language, dissemination filter
//! chains, and checkpoint I/O. See `Kb` for the composed façade.

pub mod checkpoint;
pub mod config;
pub mod context;
pub mod error;
pub mod filters;
pub mod karl;
pub mod kb;
pub mod record;

pub use config::CoreConfig;
pub use context::Context;
pub use error::MadaraError;
pub use karl::Interpreter;
pub use kb::Kb;
pub use record::Record;
