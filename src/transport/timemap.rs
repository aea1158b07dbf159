// Time-domain mapping - Visual seconds <-> transport seconds under tempo scaling
// The visual timeline is what the playhead and note positions are expressed in;
// transport time is what the clock actually runs in, scaled by the tempo ratio.

/// Lowest tempo accepted by the engine
pub const MIN_TEMPO_BPM: f64 = 30.0;
/// Highest tempo accepted by the engine
pub const MAX_TEMPO_BPM: f64 = 300.0;
/// Lowest playback rate in percent of the original tempo
pub const MIN_RATE_PERCENT: f64 = 10.0;
/// Highest playback rate in percent of the original tempo
pub const MAX_RATE_PERCENT: f64 = 200.0;

/// Convert a visual-timeline position to transport seconds.
///
/// At the original tempo both domains coincide. At a higher tempo the same
/// visual position is reached in less transport time.
pub fn to_transport(visual: f64, tempo_bpm: f64, original_tempo_bpm: f64) -> f64 {
    debug_assert!(tempo_bpm > 0.0, "tempo must be positive");
    debug_assert!(original_tempo_bpm > 0.0, "original tempo must be positive");
    visual * original_tempo_bpm / tempo_bpm
}

/// Convert a transport position back to visual seconds.
pub fn to_visual(transport: f64, tempo_bpm: f64, original_tempo_bpm: f64) -> f64 {
    debug_assert!(tempo_bpm > 0.0, "tempo must be positive");
    debug_assert!(original_tempo_bpm > 0.0, "original tempo must be positive");
    transport * tempo_bpm / original_tempo_bpm
}

/// Variant of [`to_transport`] taking a candidate tempo.
///
/// Lets a tempo setter compute the transport anchor for the new tempo before
/// the state is committed, so the whole change can be applied atomically.
pub fn to_transport_at(visual: f64, candidate_tempo_bpm: f64, original_tempo_bpm: f64) -> f64 {
    to_transport(visual, candidate_tempo_bpm, original_tempo_bpm)
}

/// Clamp a tempo into the valid BPM range. Non-finite input falls back to the
/// original tempo supplied by the caller.
pub fn clamp_tempo(bpm: f64, fallback: f64) -> f64 {
    if !bpm.is_finite() {
        return fallback;
    }
    bpm.clamp(MIN_TEMPO_BPM, MAX_TEMPO_BPM)
}

/// Clamp a playback rate (percent of original tempo) into the valid range.
pub fn clamp_rate_percent(percent: f64) -> f64 {
    if !percent.is_finite() {
        return 100.0;
    }
    percent.clamp(MIN_RATE_PERCENT, MAX_RATE_PERCENT)
}
