// Scheduler module - Note model, transport-relative timeline, note player

pub mod note;
pub mod player;
pub mod timeline;

pub use note::{NoteEvent, NoteSource, TrackId};
pub use player::{NotePlayer, NoteSink, NoteTrigger, SchedulerStats, TriggerError};
pub use timeline::{BuildOutcome, TimelineEvent, build_timeline};
