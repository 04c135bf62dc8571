//! Turns declarative ad animation specs into rendered videos through
//! pluggable render backends.

pub mod backends;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod jobs;
pub mod server;
pub mod timeline;
pub mod types;

pub use backends::{BackendAvailability, BackendKind, BackendRegistry, VideoBackend};
pub use config::Config;
pub use types::{AnimationElement, AnimationSpecs, VideoResult};
