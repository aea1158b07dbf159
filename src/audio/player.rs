// Audio player trait - Boundary to the host's buffered playback backend
// The engine owns when and where a player starts; the host owns decoding,
// mixing and the pitch-preserving time-stretch DSP behind this trait.

/// Failure reported by a player backend.
#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    #[error("audio buffer not ready")]
    NotReady,
    #[error("player backend failure: {0}")]
    Backend(String),
}

/// One buffered external audio source.
///
/// `start_at` takes the buffer offset in the recording's own timeline
/// (visual seconds) and an absolute host time the output should begin at.
/// Rate changes go through `set_stretch_rate`, which must time-stretch
/// rather than resample so tempo changes do not shift pitch.
pub trait AudioPlayer {
    fn start_at(&mut self, offset_secs: f64, when_host: f64) -> Result<(), PlayerError>;

    /// Stop output immediately. Safe to call when not playing.
    fn stop(&mut self);

    /// Pitch-preserving playback rate, 1.0 = original speed.
    fn set_stretch_rate(&mut self, ratio: f64);

    fn set_volume(&mut self, volume: f32);

    fn set_pan(&mut self, pan: f32);

    /// Whether the underlying buffer is decoded and startable.
    fn is_ready(&self) -> bool;

    /// Current buffer position in seconds, if playing. Feeds drift
    /// estimation.
    fn position(&self) -> Option<f64>;

    /// Decoded buffer length in seconds, if known.
    fn buffer_duration(&self) -> Option<f64>;
}
