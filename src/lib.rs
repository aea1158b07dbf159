// ScorePlay - Synchronized playback of note sequences and audio recordings

pub mod audio;
pub mod engine;
pub mod messaging;
pub mod scheduler;
pub mod transport;

// Re-export commonly used types for convenience
pub use audio::{AudioFileDesc, AudioPlayer, AudioRegistryProvider, PlayerFactory};
pub use engine::{EngineConfig, PlaybackController, PlayheadSink, SyncOutcome};
pub use messaging::{Notification, NotificationConsumer, create_notification_channel};
pub use scheduler::{NoteEvent, NoteSink, NoteSource, NoteTrigger, TrackId};
pub use transport::{
    LoopWindow, ManualTime, MonotonicTime, PlaybackState, TimeSource, TransportClock,
};
