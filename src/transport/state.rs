// Playback state - The single shared state record and per-operation guards
// Exclusively owned by the playback controller; collaborators receive it by
// reference and mutate only the fields documented as theirs (the sync loop
// owns `current_time_visual` while playing).

use super::timemap;

/// Shared playback state.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackState {
    pub is_playing: bool,
    pub is_repeating: bool,
    /// Playhead position in the visual timeline, seconds, >= 0
    pub current_time_visual: f64,
    /// Max over note content and audible external-audio buffers
    pub duration_visual: f64,
    pub tempo_bpm: f64,
    /// Baseline tempo fixed at load time, immutable afterwards
    pub original_tempo_bpm: f64,
    /// Kept in lockstep with `tempo_bpm / original_tempo_bpm`
    pub playback_rate_percent: f64,
    pub master_volume: f32,
    /// Monotonically increasing epoch of scheduled audio
    pub generation: u64,
}

impl PlaybackState {
    pub fn new(original_tempo_bpm: f64) -> Self {
        let original = timemap::clamp_tempo(original_tempo_bpm, 120.0);
        Self {
            is_playing: false,
            is_repeating: false,
            current_time_visual: 0.0,
            duration_visual: 0.0,
            tempo_bpm: original,
            original_tempo_bpm: original,
            playback_rate_percent: 100.0,
            master_volume: 1.0,
            generation: 0,
        }
    }

    /// Ratio the visual timeline advances at relative to transport time.
    pub fn rate_ratio(&self) -> f64 {
        self.tempo_bpm / self.original_tempo_bpm
    }

    /// Apply a tempo change keeping tempo and rate percent in lockstep.
    ///
    /// The rate clamp is authoritative: the tempo is first clamped to its own
    /// range, then rounded to whatever the clamped rate allows, so
    /// `tempo / original == rate / 100` holds after every setter.
    pub fn apply_tempo(&mut self, bpm: f64) {
        let tempo = timemap::clamp_tempo(bpm, self.tempo_bpm);
        let percent = timemap::clamp_rate_percent(tempo / self.original_tempo_bpm * 100.0);
        self.playback_rate_percent = percent;
        self.tempo_bpm = self.original_tempo_bpm * percent / 100.0;
    }

    /// Apply a rate change (percent of the original tempo), same lockstep.
    pub fn apply_rate_percent(&mut self, percent: f64) {
        let percent = timemap::clamp_rate_percent(percent);
        self.apply_tempo(self.original_tempo_bpm * percent / 100.0);
    }

    pub fn to_transport(&self, visual: f64) -> f64 {
        timemap::to_transport(visual, self.tempo_bpm, self.original_tempo_bpm)
    }

    pub fn to_visual(&self, transport: f64) -> f64 {
        timemap::to_visual(transport, self.tempo_bpm, self.original_tempo_bpm)
    }
}

/// Transient flags for the operation currently in flight.
///
/// `is_restarting` doubles as the re-entrancy lock on `play()`; a second call
/// while the first is mid-protocol is ignored rather than double-scheduled.
#[derive(Debug, Clone, Copy, Default)]
pub struct OperationGuards {
    pub is_seeking: bool,
    pub is_restarting: bool,
    /// Host time of the last generation bump
    pub last_operation: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_defaults() {
        let state = PlaybackState::new(96.0);
        assert!(!state.is_playing);
        assert_eq!(state.tempo_bpm, 96.0);
        assert_eq!(state.original_tempo_bpm, 96.0);
        assert_eq!(state.playback_rate_percent, 100.0);
        assert_eq!(state.generation, 0);
    }

    #[test]
    fn test_tempo_rate_lockstep() {
        let mut state = PlaybackState::new(120.0);
        state.apply_tempo(150.0);
        assert_eq!(state.tempo_bpm, 150.0);
        assert_eq!(state.playback_rate_percent, 125.0);
        assert!(
            (state.tempo_bpm / state.original_tempo_bpm
                - state.playback_rate_percent / 100.0)
                .abs()
                < 1e-12
        );
    }

    #[test]
    fn test_rate_clamp_is_authoritative() {
        // 120 original: 300 BPM passes the tempo clamp but exceeds 200%,
        // so the committed tempo drops back to 240.
        let mut state = PlaybackState::new(120.0);
        state.apply_tempo(300.0);
        assert_eq!(state.playback_rate_percent, 200.0);
        assert_eq!(state.tempo_bpm, 240.0);
    }

    #[test]
    fn test_apply_rate_percent() {
        let mut state = PlaybackState::new(120.0);
        state.apply_rate_percent(50.0);
        assert_eq!(state.tempo_bpm, 60.0);
        assert_eq!(state.playback_rate_percent, 50.0);
        assert_eq!(state.rate_ratio(), 0.5);
    }

    #[test]
    fn test_invalid_tempo_keeps_previous() {
        let mut state = PlaybackState::new(120.0);
        state.apply_tempo(150.0);
        state.apply_tempo(f64::NAN);
        assert_eq!(state.tempo_bpm, 150.0);
    }

    #[test]
    fn test_conversion_helpers_follow_tempo() {
        let mut state = PlaybackState::new(120.0);
        state.apply_tempo(150.0);
        assert!((state.to_transport(8.0) - 6.4).abs() < 1e-12);
        assert!((state.to_visual(6.4) - 8.0).abs() < 1e-12);
    }
}
