#![forbid(unsafe_code)]

//! Control core for interactive `codex proto` agent sessions.

pub mod channel;
pub mod config;
pub mod diff;
pub mod errors;
pub mod proto;
pub mod session;
pub mod sink;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
