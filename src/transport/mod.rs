// Transport module - Clock, time-domain mapping, loop window, shared state

pub mod clock;
pub mod loop_window;
pub mod state;
pub mod timemap;

pub use clock::{ManualTime, MonotonicTime, TimeSource, TransportClock};
pub use loop_window::LoopWindow;
pub use state::{OperationGuards, PlaybackState};
