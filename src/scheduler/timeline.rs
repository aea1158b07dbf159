// Event timeline - Transport-relative note events derived on reconfigure
// Builds the filtered, tempo-scaled event list the note player walks through.
// Side-effect free: building a timeline never touches audio.

use crate::transport::{LoopWindow, timemap};

use super::note::{NoteSource, TrackId};

/// One scheduled note, in transport seconds relative to the window start
/// (the loop start maps to offset 0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimelineEvent {
    /// Onset in window-relative transport seconds
    pub onset: f64,
    /// Sounding length in transport seconds
    pub duration: f64,
    pub pitch: u8,
    pub velocity: f32,
    pub track_id: TrackId,
    /// Original onset in visual seconds, kept for diagnostics
    pub onset_visual: f64,
}

/// Outcome counters of one timeline build
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BuildOutcome {
    pub kept: usize,
    pub dropped_invalid: usize,
}

/// Build the transport-relative timeline for the current window and tempo.
///
/// Only notes whose onset falls inside the window are scheduled; notes that
/// merely sustain into it are covered by the held-note retrigger path, since
/// the timeline only ever fires future onsets.
pub fn build_timeline(
    source: &NoteSource,
    window: &LoopWindow,
    tempo_bpm: f64,
    original_tempo_bpm: f64,
) -> (Vec<TimelineEvent>, BuildOutcome) {
    // Without a custom window every onset is eligible; content past the
    // nominal duration is tolerated, the sync loop clamps the playhead.
    let (win_start, win_end) = window.visual_bounds().unwrap_or((0.0, f64::INFINITY));

    let mut events = Vec::new();
    let mut outcome = BuildOutcome::default();

    for note in source.notes() {
        if !note.is_well_formed() {
            outcome.dropped_invalid += 1;
            log::warn!(
                "dropping malformed note: onset {} duration {} velocity {} track {}",
                note.onset_visual,
                note.duration_visual,
                note.velocity,
                note.track_id
            );
            continue;
        }
        if note.onset_visual < win_start || note.onset_visual >= win_end {
            continue;
        }
        events.push(TimelineEvent {
            onset: timemap::to_transport(
                note.onset_visual - win_start,
                tempo_bpm,
                original_tempo_bpm,
            ),
            duration: timemap::to_transport(
                note.duration_visual,
                tempo_bpm,
                original_tempo_bpm,
            ),
            pitch: note.pitch,
            velocity: note.velocity,
            track_id: note.track_id,
            onset_visual: note.onset_visual,
        });
        outcome.kept += 1;
    }

    // Source is onset-ordered already, but the mapping must not rely on it
    events.sort_by(|a, b| a.onset.total_cmp(&b.onset));
    (events, outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::note::NoteEvent;

    fn note(onset: f64, duration: f64) -> NoteEvent {
        NoteEvent {
            onset_visual: onset,
            duration_visual: duration,
            pitch: 64,
            velocity: 0.7,
            track_id: 1,
        }
    }

    #[test]
    fn test_full_piece_identity_mapping() {
        let source = NoteSource::new(vec![note(0.0, 1.0), note(2.5, 0.5)], vec![]);
        let window = LoopWindow::new();
        let (events, outcome) = build_timeline(&source, &window, 120.0, 120.0);
        assert_eq!(outcome.kept, 2);
        assert_eq!(events[0].onset, 0.0);
        assert_eq!(events[1].onset, 2.5);
        assert_eq!(events[1].duration, 0.5);
    }

    #[test]
    fn test_window_filters_and_offsets() {
        let source = NoteSource::new(
            vec![note(1.0, 1.0), note(5.0, 1.0), note(13.0, 1.0)],
            vec![],
        );
        let mut window = LoopWindow::new();
        window.set_points(Some(4.0), Some(12.0), 16.0);
        let (events, outcome) = build_timeline(&source, &window, 120.0, 120.0);
        // Only the onset inside [4, 12) survives, offset so loop start is 0
        assert_eq!(outcome.kept, 1);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].onset, 1.0);
        assert_eq!(events[0].onset_visual, 5.0);
    }

    #[test]
    fn test_tempo_scales_onsets_and_durations() {
        let source = NoteSource::new(vec![note(8.0, 2.0)], vec![]);
        let window = LoopWindow::new();
        let (events, _) = build_timeline(&source, &window, 150.0, 120.0);
        assert!((events[0].onset - 6.4).abs() < 1e-12);
        assert!((events[0].duration - 1.6).abs() < 1e-12);
    }

    #[test]
    fn test_malformed_notes_dropped_not_fatal() {
        let mut bad = note(1.0, 1.0);
        bad.duration_visual = f64::NAN;
        let source = NoteSource::new(vec![note(0.0, 1.0), bad], vec![]);
        let window = LoopWindow::new();
        let (events, outcome) = build_timeline(&source, &window, 120.0, 120.0);
        assert_eq!(events.len(), 1);
        assert_eq!(outcome.dropped_invalid, 1);
    }

    #[test]
    fn test_build_is_pure() {
        let source = NoteSource::new(vec![note(0.0, 1.0), note(2.0, 1.0)], vec![]);
        let window = LoopWindow::new();
        let a = build_timeline(&source, &window, 120.0, 120.0);
        let b = build_timeline(&source, &window, 120.0, 120.0);
        assert_eq!(a.0, b.0);
        assert_eq!(a.1, b.1);
    }
}
