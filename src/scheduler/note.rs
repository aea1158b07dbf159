// Note model - Immutable note events and the source collection they live in
// Notes are expressed in visual seconds; the timeline builder maps them into
// transport time on every reconfigure.

use std::sync::Arc;

/// Identifier of a note track (one per rendered part)
pub type TrackId = u32;

/// A single note event in the visual timeline.
///
/// Owned by the caller-supplied [`NoteSource`]; the scheduler never mutates
/// note data, it derives a filtered transport-scaled event list from it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteEvent {
    /// Onset in visual seconds
    pub onset_visual: f64,
    /// Sustain length in visual seconds, > 0
    pub duration_visual: f64,
    /// MIDI note number (0-127, where 60 = C4)
    pub pitch: u8,
    /// Normalized velocity in [0, 1]
    pub velocity: f32,
    pub track_id: TrackId,
}

impl NoteEvent {
    /// End of the sustain interval in visual seconds
    pub fn end_visual(&self) -> f64 {
        self.onset_visual + self.duration_visual
    }

    /// Whether the sustain interval `[onset, onset + duration)` contains `t`
    pub fn contains_visual(&self, t: f64) -> bool {
        t >= self.onset_visual && t < self.end_visual()
    }

    /// Validity check applied when the timeline is built. Malformed notes are
    /// dropped with a warning rather than aborting the batch.
    pub fn is_well_formed(&self) -> bool {
        self.onset_visual.is_finite()
            && self.onset_visual >= 0.0
            && self.duration_visual.is_finite()
            && self.duration_visual > 0.0
            && self.velocity.is_finite()
            && (0.0..=1.0).contains(&self.velocity)
            && self.pitch <= 127
    }
}

/// The read-only note collection supplied once at construction.
#[derive(Debug, Clone)]
pub struct NoteSource {
    notes: Vec<NoteEvent>,
    tracks: Vec<TrackId>,
}

impl NoteSource {
    /// Build a source from caller data. Notes are ordered by onset; track
    /// metadata is derived from the ids present when not supplied explicitly.
    pub fn new(mut notes: Vec<NoteEvent>, mut tracks: Vec<TrackId>) -> Arc<Self> {
        notes.sort_by(|a, b| a.onset_visual.total_cmp(&b.onset_visual));
        if tracks.is_empty() {
            tracks = notes.iter().map(|n| n.track_id).collect();
        }
        tracks.sort_unstable();
        tracks.dedup();
        Arc::new(Self { notes, tracks })
    }

    pub fn notes(&self) -> &[NoteEvent] {
        &self.notes
    }

    pub fn tracks(&self) -> &[TrackId] {
        &self.tracks
    }

    pub fn has_track(&self, track_id: TrackId) -> bool {
        self.tracks.binary_search(&track_id).is_ok()
    }

    /// End of the last well-formed note, in visual seconds
    pub fn content_end_visual(&self) -> f64 {
        self.notes
            .iter()
            .filter(|n| n.is_well_formed())
            .map(NoteEvent::end_visual)
            .fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(onset: f64, duration: f64, track: TrackId) -> NoteEvent {
        NoteEvent {
            onset_visual: onset,
            duration_visual: duration,
            pitch: 60,
            velocity: 0.8,
            track_id: track,
        }
    }

    #[test]
    fn test_contains_visual_half_open() {
        let n = note(2.0, 3.0, 0);
        assert!(!n.contains_visual(1.999));
        assert!(n.contains_visual(2.0));
        assert!(n.contains_visual(4.999));
        assert!(!n.contains_visual(5.0));
    }

    #[test]
    fn test_well_formed_rejects_bad_data() {
        assert!(note(0.0, 1.0, 0).is_well_formed());
        assert!(!note(f64::NAN, 1.0, 0).is_well_formed());
        assert!(!note(0.0, 0.0, 0).is_well_formed());
        assert!(!note(0.0, -1.0, 0).is_well_formed());
        assert!(!note(-0.5, 1.0, 0).is_well_formed());

        let mut n = note(0.0, 1.0, 0);
        n.velocity = 1.5;
        assert!(!n.is_well_formed());
        n.velocity = f32::NAN;
        assert!(!n.is_well_formed());
    }

    #[test]
    fn test_source_orders_notes_and_derives_tracks() {
        let source = NoteSource::new(vec![note(3.0, 1.0, 2), note(0.5, 1.0, 0)], vec![]);
        assert_eq!(source.notes()[0].onset_visual, 0.5);
        assert_eq!(source.tracks(), &[0, 2]);
        assert!(source.has_track(2));
        assert!(!source.has_track(1));
    }

    #[test]
    fn test_content_end_ignores_malformed() {
        let mut bad = note(100.0, 5.0, 0);
        bad.velocity = 9.0;
        let source = NoteSource::new(vec![note(0.0, 4.0, 0), bad], vec![]);
        assert_eq!(source.content_end_visual(), 4.0);
    }
}
