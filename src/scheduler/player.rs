// Note player - Walks the event timeline and drives note triggers
// Stop-then-start discipline: at most one timeline is ever active, and a
// reconfigure touches no audio until start() is called.

use std::collections::HashMap;
use std::sync::Arc;

use crate::transport::{LoopWindow, timemap};

use super::note::{NoteSource, TrackId};
use super::timeline::{self, TimelineEvent};

/// Rewind smaller than this is treated as float noise, not a loop wrap
const REWIND_EPSILON: f64 = 1e-6;

/// Velocity used by the fallback trigger after an engine rejection
const FALLBACK_VELOCITY: f32 = 0.1;
/// Pitch used by the fallback trigger (middle C)
const FALLBACK_PITCH: u8 = 60;

/// One concrete note-on handed to the host's note engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteTrigger {
    pub track_id: TrackId,
    pub pitch: u8,
    pub velocity: f32,
    /// Sounding length in real (transport) seconds
    pub duration: f64,
    /// Pre-mixed gain: master volume times channel volume
    pub mix: f32,
    /// Stereo pan in [-1, 1]
    pub pan: f32,
}

/// Engine-side rejection of a note trigger.
#[derive(Debug, thiserror::Error)]
#[error("note trigger rejected: {0}")]
pub struct TriggerError(pub String);

/// Receiver of note events; implemented by the host's note engine.
pub trait NoteSink {
    /// Fire a note. The sink owns release timing via `trigger.duration`.
    fn trigger(&mut self, trigger: &NoteTrigger) -> Result<(), TriggerError>;

    /// Release every currently sounding note.
    fn release_all(&mut self);

    /// Hard output gate used to kill residual tails between playback epochs.
    fn set_gate_muted(&mut self, muted: bool);
}

/// Per-track playback controls.
///
/// Mute is checked at trigger time, so unmuting mid-playback needs no
/// reschedule for future events; only held notes want a retrigger.
#[derive(Debug, Clone, Copy)]
struct TrackControl {
    muted: bool,
    /// Channel volume as set by the caller
    channel: f32,
    /// Effective gain: master * channel
    mix: f32,
    pan: f32,
}

impl Default for TrackControl {
    fn default() -> Self {
        Self {
            muted: false,
            channel: 1.0,
            mix: 1.0,
            pan: 0.0,
        }
    }
}

/// Diagnostic counters. Exposed read-only, never used to gate behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SchedulerStats {
    /// Events that came due (including muted-track skips)
    pub scheduled: u64,
    /// Events the sink accepted
    pub triggered: u64,
    /// Malformed notes dropped at timeline build
    pub dropped_invalid: u64,
    /// Sink rejections (fallback attempts not counted)
    pub trigger_failures: u64,
}

impl SchedulerStats {
    /// Fraction of due events the sink accepted
    pub fn success_rate(&self) -> f64 {
        if self.scheduled == 0 {
            return 1.0;
        }
        self.triggered as f64 / self.scheduled as f64
    }
}

/// The discrete note scheduler.
pub struct NotePlayer {
    source: Arc<NoteSource>,
    events: Vec<TimelineEvent>,
    cursor: usize,
    active: bool,
    last_pos: f64,
    tracks: HashMap<TrackId, TrackControl>,
    master_volume: f32,
    stats: SchedulerStats,
}

impl NotePlayer {
    pub fn new(source: Arc<NoteSource>) -> Self {
        let tracks = source
            .tracks()
            .iter()
            .map(|&id| (id, TrackControl::default()))
            .collect();
        Self {
            source,
            events: Vec::new(),
            cursor: 0,
            active: false,
            last_pos: 0.0,
            tracks,
            master_volume: 1.0,
            stats: SchedulerStats::default(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Rebuild the timeline for the given window and tempo. Idempotent and
    /// silent; nothing sounds until [`start`](Self::start).
    pub fn reconfigure(&mut self, window: &LoopWindow, tempo_bpm: f64, original_tempo_bpm: f64) {
        debug_assert!(!self.active, "reconfigure while a timeline is active");
        let (events, outcome) =
            timeline::build_timeline(&self.source, window, tempo_bpm, original_tempo_bpm);
        self.events = events;
        self.cursor = 0;
        self.stats.dropped_invalid = outcome.dropped_invalid as u64;
    }

    /// Begin emitting events, seeking into the timeline at `offset` transport
    /// seconds (window-relative). Stops any previous timeline first so two
    /// can never be active at once.
    pub fn start(&mut self, offset: f64, sink: &mut dyn NoteSink) {
        self.stop(sink);
        self.cursor = self.events.partition_point(|e| e.onset < offset);
        self.last_pos = offset;
        self.active = true;
    }

    /// Cancel pending events and release sounding notes. Redundant calls are
    /// no-ops.
    pub fn stop(&mut self, sink: &mut dyn NoteSink) {
        if self.active {
            self.active = false;
            sink.release_all();
        }
    }

    /// Fire every event due at window-relative transport position `pos`.
    ///
    /// Backward motion fires nothing: a drift nudge moves the position back
    /// by a few milliseconds and must stay inaudible, and a loop wrap is
    /// followed by an explicit [`rewind`](Self::rewind) from the caller.
    pub fn advance(&mut self, pos: f64, sink: &mut dyn NoteSink) {
        if !self.active {
            return;
        }
        if pos + REWIND_EPSILON < self.last_pos {
            self.last_pos = pos;
            return;
        }
        while self.cursor < self.events.len() && self.events[self.cursor].onset <= pos {
            let event = self.events[self.cursor];
            self.cursor += 1;
            self.fire(&event, event.duration, sink);
        }
        self.last_pos = pos;
    }

    /// Loop wrap: release sounding notes and reset the cursor to `pos`, so
    /// the next [`advance`](Self::advance) fires the window again.
    pub fn rewind(&mut self, pos: f64, sink: &mut dyn NoteSink) {
        if !self.active {
            return;
        }
        sink.release_all();
        self.cursor = self.events.partition_point(|e| e.onset < pos);
        self.last_pos = pos;
    }

    fn fire(&mut self, event: &TimelineEvent, duration: f64, sink: &mut dyn NoteSink) {
        self.stats.scheduled += 1;
        let control = self
            .tracks
            .get(&event.track_id)
            .copied()
            .unwrap_or_default();
        if control.muted {
            return;
        }
        let trigger = NoteTrigger {
            track_id: event.track_id,
            pitch: event.pitch,
            velocity: event.velocity,
            duration,
            mix: control.mix,
            pan: control.pan,
        };
        match sink.trigger(&trigger) {
            Ok(()) => self.stats.triggered += 1,
            Err(err) => {
                self.stats.trigger_failures += 1;
                log::warn!(
                    "note trigger failed on track {} pitch {}: {err}; attempting fallback",
                    event.track_id,
                    event.pitch
                );
                let fallback = NoteTrigger {
                    pitch: FALLBACK_PITCH,
                    velocity: FALLBACK_VELOCITY,
                    ..trigger
                };
                if sink.trigger(&fallback).is_ok() {
                    self.stats.triggered += 1;
                }
            }
        }
    }

    /// Re-fire notes on one track whose sustain interval contains
    /// `at_visual`, with only the remaining duration. Needed after an unmute
    /// or seek: the timeline schedules future onsets only, never notes
    /// already in flight at the target position.
    ///
    /// A note whose onset equals `at_visual` is a future onset, not an
    /// in-flight sustain; the timeline fires it, so it is excluded here.
    pub fn retrigger_held(
        &mut self,
        track_id: TrackId,
        at_visual: f64,
        tempo_bpm: f64,
        original_tempo_bpm: f64,
        sink: &mut dyn NoteSink,
    ) {
        let held: Vec<_> = self
            .source
            .notes()
            .iter()
            .filter(|n| {
                n.track_id == track_id
                    && n.is_well_formed()
                    && n.onset_visual < at_visual
                    && at_visual < n.end_visual()
            })
            .copied()
            .collect();
        for note in held {
            let remaining_visual = note.end_visual() - at_visual;
            let duration =
                timemap::to_transport(remaining_visual, tempo_bpm, original_tempo_bpm);
            let event = TimelineEvent {
                onset: 0.0,
                duration,
                pitch: note.pitch,
                velocity: note.velocity,
                track_id: note.track_id,
                onset_visual: note.onset_visual,
            };
            self.fire(&event, duration, sink);
        }
    }

    /// [`retrigger_held`](Self::retrigger_held) across every track.
    pub fn retrigger_all_held(
        &mut self,
        at_visual: f64,
        tempo_bpm: f64,
        original_tempo_bpm: f64,
        sink: &mut dyn NoteSink,
    ) {
        let tracks: Vec<TrackId> = self.source.tracks().to_vec();
        for track_id in tracks {
            self.retrigger_held(track_id, at_visual, tempo_bpm, original_tempo_bpm, sink);
        }
    }

    pub fn set_mute(&mut self, track_id: TrackId, muted: bool) {
        self.tracks.entry(track_id).or_default().muted = muted;
    }

    pub fn is_muted(&self, track_id: TrackId) -> bool {
        self.tracks.get(&track_id).map(|t| t.muted).unwrap_or(false)
    }

    /// Store the channel volume and the pre-mixed `master * channel` gain.
    pub fn set_volume(&mut self, track_id: TrackId, linear: f32, master: f32) {
        let control = self.tracks.entry(track_id).or_default();
        control.channel = linear.clamp(0.0, 1.0);
        control.mix = control.channel * master.clamp(0.0, 1.0);
        self.master_volume = master.clamp(0.0, 1.0);
    }

    pub fn set_pan(&mut self, track_id: TrackId, pan: f32) {
        self.tracks.entry(track_id).or_default().pan = pan.clamp(-1.0, 1.0);
    }

    /// Recompute every track mix after a master volume change.
    pub fn set_master_volume(&mut self, master: f32) {
        self.master_volume = master.clamp(0.0, 1.0);
        for control in self.tracks.values_mut() {
            control.mix = control.channel * self.master_volume;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::note::NoteEvent;

    #[derive(Default)]
    struct RecordingSink {
        triggers: Vec<NoteTrigger>,
        releases: u32,
        gate_muted: bool,
        reject_next: bool,
    }

    impl NoteSink for RecordingSink {
        fn trigger(&mut self, trigger: &NoteTrigger) -> Result<(), TriggerError> {
            if self.reject_next {
                self.reject_next = false;
                return Err(TriggerError("engine full".into()));
            }
            self.triggers.push(*trigger);
            Ok(())
        }

        fn release_all(&mut self) {
            self.releases += 1;
        }

        fn set_gate_muted(&mut self, muted: bool) {
            self.gate_muted = muted;
        }
    }

    fn note(onset: f64, duration: f64, track: TrackId) -> NoteEvent {
        NoteEvent {
            onset_visual: onset,
            duration_visual: duration,
            pitch: 60,
            velocity: 0.8,
            track_id: track,
        }
    }

    fn player(notes: Vec<NoteEvent>) -> NotePlayer {
        let mut p = NotePlayer::new(NoteSource::new(notes, vec![]));
        p.reconfigure(&LoopWindow::new(), 120.0, 120.0);
        p
    }

    #[test]
    fn test_advance_fires_due_events_once() {
        let mut p = player(vec![note(0.0, 1.0, 0), note(2.0, 1.0, 0)]);
        let mut sink = RecordingSink::default();
        p.start(0.0, &mut sink);
        p.advance(0.5, &mut sink);
        assert_eq!(sink.triggers.len(), 1);
        p.advance(0.9, &mut sink);
        assert_eq!(sink.triggers.len(), 1);
        p.advance(2.1, &mut sink);
        assert_eq!(sink.triggers.len(), 2);
    }

    #[test]
    fn test_start_seeks_past_earlier_onsets() {
        let mut p = player(vec![note(0.0, 1.0, 0), note(2.0, 1.0, 0)]);
        let mut sink = RecordingSink::default();
        p.start(1.5, &mut sink);
        p.advance(2.5, &mut sink);
        assert_eq!(sink.triggers.len(), 1);
        assert_eq!(sink.triggers[0].duration, 1.0);
    }

    #[test]
    fn test_stop_is_redundant_safe() {
        let mut p = player(vec![note(0.0, 1.0, 0)]);
        let mut sink = RecordingSink::default();
        p.start(0.0, &mut sink);
        p.stop(&mut sink);
        p.stop(&mut sink);
        assert_eq!(sink.releases, 1);
        assert!(!p.is_active());
    }

    #[test]
    fn test_loop_rewind_releases_and_refires() {
        let mut p = player(vec![note(0.5, 0.2, 0)]);
        let mut sink = RecordingSink::default();
        p.start(0.0, &mut sink);
        p.advance(1.0, &mut sink);
        assert_eq!(sink.triggers.len(), 1);
        // wrap back to just after the loop start
        p.rewind(0.1, &mut sink);
        assert_eq!(sink.releases, 1);
        p.advance(0.6, &mut sink);
        assert_eq!(sink.triggers.len(), 2);
    }

    #[test]
    fn test_backward_nudge_neither_releases_nor_refires() {
        let mut p = player(vec![note(0.5, 2.0, 0)]);
        let mut sink = RecordingSink::default();
        p.start(0.0, &mut sink);
        p.advance(1.0, &mut sink);
        assert_eq!(sink.triggers.len(), 1);
        // small correction step backward, then forward motion resumes
        p.advance(0.95, &mut sink);
        p.advance(1.05, &mut sink);
        assert_eq!(sink.releases, 0);
        assert_eq!(sink.triggers.len(), 1);
    }

    #[test]
    fn test_muted_track_skipped_at_trigger_time() {
        let mut p = player(vec![note(0.0, 1.0, 3)]);
        let mut sink = RecordingSink::default();
        p.set_mute(3, true);
        p.start(0.0, &mut sink);
        p.advance(0.5, &mut sink);
        assert!(sink.triggers.is_empty());
        assert_eq!(p.stats().scheduled, 1);
    }

    #[test]
    fn test_retrigger_held_remaining_duration() {
        // Note sustaining [0, 5); seeking to 4 re-fires it with ~1s left
        let mut p = player(vec![note(0.0, 5.0, 0), note(6.0, 1.0, 0)]);
        let mut sink = RecordingSink::default();
        p.retrigger_all_held(4.0, 120.0, 120.0, &mut sink);
        assert_eq!(sink.triggers.len(), 1);
        assert!((sink.triggers[0].duration - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_retrigger_excludes_exact_onset() {
        // An onset equal to the target belongs to the timeline; firing it
        // from the held set as well would sound the note twice.
        let mut p = player(vec![note(2.0, 3.0, 0)]);
        let mut sink = RecordingSink::default();
        p.start(2.0, &mut sink);
        p.retrigger_all_held(2.0, 120.0, 120.0, &mut sink);
        assert!(sink.triggers.is_empty());
        p.advance(2.0, &mut sink);
        assert_eq!(sink.triggers.len(), 1);
    }

    #[test]
    fn test_retrigger_held_skips_muted_and_other_tracks() {
        let mut p = player(vec![note(0.0, 5.0, 0), note(0.0, 5.0, 1)]);
        let mut sink = RecordingSink::default();
        p.set_mute(1, true);
        p.retrigger_all_held(2.0, 120.0, 120.0, &mut sink);
        assert_eq!(sink.triggers.len(), 1);
        assert_eq!(sink.triggers[0].track_id, 0);
    }

    #[test]
    fn test_trigger_failure_falls_back_and_counts() {
        let mut p = player(vec![note(0.0, 1.0, 0)]);
        let mut sink = RecordingSink {
            reject_next: true,
            ..Default::default()
        };
        p.start(0.0, &mut sink);
        p.advance(0.1, &mut sink);
        // fallback trigger landed with the neutral pitch and low velocity
        assert_eq!(sink.triggers.len(), 1);
        assert_eq!(sink.triggers[0].pitch, FALLBACK_PITCH);
        assert_eq!(sink.triggers[0].velocity, FALLBACK_VELOCITY);
        assert_eq!(p.stats().trigger_failures, 1);
        assert_eq!(p.stats().triggered, 1);
    }

    #[test]
    fn test_volume_mix_is_master_times_channel() {
        let mut p = player(vec![note(0.0, 1.0, 0)]);
        let mut sink = RecordingSink::default();
        p.set_volume(0, 0.5, 0.8);
        p.start(0.0, &mut sink);
        p.advance(0.1, &mut sink);
        assert!((sink.triggers[0].mix - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_master_volume_reapplies_to_all_tracks() {
        let mut p = player(vec![note(0.0, 1.0, 0)]);
        let mut sink = RecordingSink::default();
        p.set_volume(0, 0.5, 1.0);
        p.set_master_volume(0.5);
        p.start(0.0, &mut sink);
        p.advance(0.1, &mut sink);
        assert!((sink.triggers[0].mix - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_reconfigure_is_idempotent() {
        let mut p = player(vec![note(0.0, 1.0, 0), note(2.0, 1.0, 0)]);
        let before = p.event_count();
        p.reconfigure(&LoopWindow::new(), 120.0, 120.0);
        assert_eq!(p.event_count(), before);
        assert!(!p.is_active());
    }
}
