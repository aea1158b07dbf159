// Notification types - Engine -> observer state-change events
// Fire-and-forget: observers refresh displays from these, correctness never
// depends on delivery.

/// State change pushed to the host's observer channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Notification {
    /// Playhead moved discretely (seek, restart, loop wrap); continuous
    /// motion goes through the playhead sink instead
    PositionChanged(f64),
    DurationChanged(f64),
    PlayStateChanged(bool),
    TempoChanged { bpm: f64, rate_percent: f64 },
    /// Non-repeating playback reached the end
    Completed,
}
