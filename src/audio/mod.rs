// Audio module - External audio players, registry reconciliation, deferred starts

pub mod manager;
pub mod player;
pub mod registry;

pub use manager::{AudioFileEntry, AudioFileManager, MuteTransition};
pub use player::{AudioPlayer, PlayerError};
pub use registry::{AudioFileDesc, AudioRegistryProvider, FileId, PlayerFactory};
