// Engine module - Controller, sync loop, auto-pause, configuration

pub mod auto_pause;
pub mod config;
pub mod controller;
pub mod sync;

pub use auto_pause::{AutoPauseAction, AutoPauseController};
pub use config::{ConfigError, EngineConfig};
pub use controller::PlaybackController;
pub use sync::{PlayheadSink, SyncLoop, SyncOutcome};
