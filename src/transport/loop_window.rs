// Loop window - A-B loop state in visual seconds
// Normalization policy: a lone A marker never activates looping, a lone B
// marker loops [0, B), and A >= B is repaired by swapping the two points.

use super::timemap;

/// Optional `[start, end)` visual-time range playback restricts itself to.
///
/// Both bounds `None` means no custom window (the full piece). After
/// normalization the window is either cleared or holds `start < end`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoopWindow {
    start: Option<f64>,
    end: Option<f64>,
}

impl LoopWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// A custom window is active (both bounds set).
    pub fn is_active(&self) -> bool {
        self.start.is_some() && self.end.is_some()
    }

    /// Visual bounds of the active window, if any.
    pub fn visual_bounds(&self) -> Option<(f64, f64)> {
        match (self.start, self.end) {
            (Some(s), Some(e)) => Some((s, e)),
            _ => None,
        }
    }

    /// Set or clear the loop points, returning whether the stored window
    /// changed. Callers skip the stop/reconfigure/start sequence when it
    /// did not.
    ///
    /// Normalization:
    /// - `(Some(a), None)` clears the window: a single A marker does not loop.
    /// - `(None, Some(b))` becomes `[0, b)`.
    /// - `a >= b` is repaired by swapping.
    /// - Non-finite or out-of-range values are clamped into `[0, duration]`;
    ///   a window that collapses to zero length is cleared.
    pub fn set_points(&mut self, start: Option<f64>, end: Option<f64>, duration: f64) -> bool {
        let previous = *self;

        let start = start.filter(|v| v.is_finite());
        let end = end.filter(|v| v.is_finite());

        *self = match (start, end) {
            (None, None) | (Some(_), None) => Self::default(),
            (None, Some(b)) => Self::normalized(0.0, b, duration),
            (Some(a), Some(b)) if a >= b => Self::normalized(b, a, duration),
            (Some(a), Some(b)) => Self::normalized(a, b, duration),
        };

        *self != previous
    }

    fn normalized(start: f64, end: f64, duration: f64) -> Self {
        let start = start.clamp(0.0, duration);
        let end = end.clamp(0.0, duration);
        if end - start <= f64::EPSILON {
            return Self::default();
        }
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    /// Clear the window.
    pub fn clear(&mut self) -> bool {
        let changed = self.is_active();
        *self = Self::default();
        changed
    }

    /// Transport-space bounds to hand to the clock.
    ///
    /// An active custom window always loops; without one, the full piece
    /// `[0, duration)` loops only when `repeat_enabled` is set.
    pub fn clock_bounds(
        &self,
        repeat_enabled: bool,
        tempo_bpm: f64,
        original_tempo_bpm: f64,
        duration: f64,
    ) -> Option<(f64, f64)> {
        if let Some((s, e)) = self.visual_bounds() {
            return Some((
                timemap::to_transport(s, tempo_bpm, original_tempo_bpm),
                timemap::to_transport(e, tempo_bpm, original_tempo_bpm),
            ));
        }
        if repeat_enabled && duration > 0.0 {
            return Some((
                0.0,
                timemap::to_transport(duration, tempo_bpm, original_tempo_bpm),
            ));
        }
        None
    }

    /// Rescale the visual bounds by `new_tempo / old_tempo`, clamped to
    /// `[0, duration]`, so the window keeps its transport-space anchoring
    /// across a tempo change and the loop still sounds at the same musical
    /// positions.
    pub fn rescale_for_tempo_change(&mut self, old_tempo: f64, new_tempo: f64, duration: f64) {
        debug_assert!(old_tempo > 0.0 && new_tempo > 0.0);
        if let Some((s, e)) = self.visual_bounds() {
            let factor = new_tempo / old_tempo;
            *self = Self::normalized(s * factor, e * factor, duration);
        }
    }

    /// Scheduler-relative offset for a playhead position: positions are
    /// window-relative while a custom window is active.
    pub fn part_offset(&self, current_visual: f64) -> f64 {
        match self.start {
            Some(s) if self.is_active() => current_visual - s,
            _ => current_visual,
        }
    }
}
