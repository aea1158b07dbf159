// Playback controller - Single entry point for every playback intent
// Every state-changing operation runs the same atomic sequence: bump the
// generation token, stop, reconfigure, start with a token re-check before
// each irreversible action. At most one generation of scheduled audio is
// ever live, even under rapid repeated input.

use std::sync::Arc;

use ringbuf::traits::Producer;

use crate::audio::{AudioFileManager, AudioRegistryProvider, MuteTransition, PlayerFactory};
use crate::messaging::{
    Notification, NotificationConsumer, NotificationProducer, create_notification_channel,
};
use crate::scheduler::{NotePlayer, NoteSink, NoteSource, SchedulerStats, TrackId};
use crate::transport::{
    LoopWindow, OperationGuards, PlaybackState, TimeSource, TransportClock, timemap,
};

use super::auto_pause::{AutoPauseAction, AutoPauseController};
use super::config::EngineConfig;
use super::sync::{PlayheadSink, SyncLoop, SyncOutcome};

const NOTIFICATION_CAPACITY: usize = 256;

/// The playback controller.
///
/// Owns the shared [`PlaybackState`] exclusively; collaborators read it and
/// mutate only their documented fields. Drive it by calling
/// [`tick`](Self::tick) at frame or timer cadence.
pub struct PlaybackController {
    state: PlaybackState,
    guards: OperationGuards,
    window: LoopWindow,
    clock: TransportClock,
    notes: NotePlayer,
    audio: AudioFileManager,
    sync: SyncLoop,
    auto_pause: AutoPauseController,
    note_sink: Box<dyn NoteSink>,
    playhead: Box<dyn PlayheadSink>,
    registry: Box<dyn AudioRegistryProvider>,
    notifications: NotificationProducer,
    on_complete: Option<Box<dyn FnMut()>>,
    config: EngineConfig,
    /// End of the note content in visual seconds, fixed at construction
    note_end_visual: f64,
}

impl PlaybackController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Arc<NoteSource>,
        original_tempo_bpm: f64,
        note_sink: Box<dyn NoteSink>,
        playhead: Box<dyn PlayheadSink>,
        registry: Box<dyn AudioRegistryProvider>,
        factory: Box<dyn PlayerFactory>,
        time: Box<dyn TimeSource>,
        mut config: EngineConfig,
    ) -> (Self, NotificationConsumer) {
        config.sanitize();
        let (notifications, consumer) = create_notification_channel(NOTIFICATION_CAPACITY);
        let state = PlaybackState::new(original_tempo_bpm);
        let note_end_visual = source.content_end_visual();
        let mut controller = Self {
            sync: SyncLoop::new(&config),
            auto_pause: AutoPauseController::new(config.auto_resume_cooldown_secs),
            state,
            guards: OperationGuards::default(),
            window: LoopWindow::new(),
            clock: TransportClock::new(time),
            notes: NotePlayer::new(source),
            audio: AudioFileManager::new(factory),
            note_sink,
            playhead,
            registry,
            notifications,
            on_complete: None,
            config,
            note_end_visual,
        };
        controller.sync_registry();
        controller
            .notes
            .reconfigure(&controller.window, controller.state.tempo_bpm, controller.state.original_tempo_bpm);
        (controller, consumer)
    }

    /// Register the callback fired when non-repeating playback reaches the
    /// end.
    pub fn set_completion_callback(&mut self, callback: Box<dyn FnMut()>) {
        self.on_complete = Some(callback);
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn loop_window(&self) -> &LoopWindow {
        &self.window
    }

    pub fn guards(&self) -> OperationGuards {
        self.guards
    }

    pub fn scheduler_stats(&self) -> SchedulerStats {
        self.notes.stats()
    }

    pub fn audio_files(&self) -> &AudioFileManager {
        &self.audio
    }

    // ----- periodic drive -------------------------------------------------

    /// One cooperative tick: resolve deferred audio starts, advance the note
    /// scheduler, and step the sync loop.
    pub fn tick(&mut self) {
        let now = self.clock.host_now();
        self.audio.poll_deferred(now);
        if !self.state.is_playing {
            return;
        }

        let visual = self.state.to_visual(self.clock.position(now));
        let rel = self.state.to_transport(self.window.part_offset(visual));
        self.notes.advance(rel, &mut *self.note_sink);

        match self.sync.step(
            self.state.generation,
            now,
            &mut self.state,
            &mut self.clock,
            &self.audio,
            &mut *self.playhead,
        ) {
            SyncOutcome::Completed => self.finish_playback(),
            SyncOutcome::Wrapped(visual) => self.handle_wrap(visual, now),
            SyncOutcome::Running(_) | SyncOutcome::Idle => {}
        }
    }

    // ----- playback intents ----------------------------------------------

    /// Start playback from the current position. A second call while a
    /// restart is mid-protocol is ignored rather than double-scheduled.
    pub fn play(&mut self) {
        if self.state.is_playing || self.guards.is_restarting {
            return;
        }
        self.guards.is_restarting = true;
        let now = self.clock.host_now();
        let generation = self.begin_op(now);
        self.auto_pause.note_user_play();
        self.sync_registry();
        // stop everything first even when nominally idle, so no residual
        // tail from a previous generation can overlap the new one
        self.stop_phase();
        let mut target = self.state.current_time_visual;
        if target >= self.state.duration_visual {
            target = self.loop_start_or_zero();
        }
        let target = self.reconfigure_for(target);
        self.start_phase(generation, now, self.state.to_transport(target));
        self.guards.is_restarting = false;
    }

    pub fn pause(&mut self) {
        self.pause_internal(true);
    }

    pub fn toggle_play(&mut self) {
        if self.state.is_playing {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Jump to `target_visual` seconds, preserving the play/pause state.
    ///
    /// A target before an active loop window is honored and plays into the
    /// window; a target at or past the window end snaps to the window start,
    /// since the clock would wrap it there immediately anyway.
    pub fn seek(&mut self, target_visual: f64) {
        if !target_visual.is_finite() {
            return;
        }
        let target_visual = match self.window.visual_bounds() {
            Some((s, e)) if target_visual >= e => s,
            _ => target_visual,
        };
        let now = self.clock.host_now();
        let generation = self.begin_op(now);
        self.guards.is_seeking = true;
        let was_playing = self.state.is_playing;
        if was_playing {
            self.stop_phase();
            self.state.is_playing = false;
        }
        let target = self.reconfigure_for(target_visual);
        if was_playing {
            self.start_phase(generation, now, self.state.to_transport(target));
        } else {
            self.playhead.set_time(target);
            self.notify(Notification::PositionChanged(target));
        }
        self.guards.is_seeking = false;
    }

    /// Rewind to the loop start (or 0 without a window), preserving the
    /// play/pause state. The degenerate seek.
    pub fn restart(&mut self) {
        let target = self.loop_start_or_zero();
        self.seek(target);
    }

    /// Change the tempo, rescaling the loop window so it keeps sounding at
    /// the same musical positions, and restarting playback atomically at the
    /// recomputed transport anchor.
    pub fn set_tempo(&mut self, bpm: f64) {
        let mut preview = self.state.clone();
        preview.apply_tempo(bpm);
        if (preview.tempo_bpm - self.state.tempo_bpm).abs() < 1e-9 {
            return;
        }
        let now = self.clock.host_now();
        let generation = self.begin_op(now);
        let old_tempo = self.state.tempo_bpm;
        let position = self.live_visual(now);
        let was_playing = self.state.is_playing;
        if was_playing {
            self.stop_phase();
            self.state.is_playing = false;
        }
        // transport anchor for the candidate tempo, before the state commit
        let anchor_transport = timemap::to_transport_at(
            position,
            preview.tempo_bpm,
            self.state.original_tempo_bpm,
        );
        self.window
            .rescale_for_tempo_change(old_tempo, preview.tempo_bpm, self.state.duration_visual);
        self.state.apply_tempo(bpm);
        self.audio.set_rate_percent(self.state.playback_rate_percent);
        let target = self.reconfigure_for(position);
        self.notify(Notification::TempoChanged {
            bpm: self.state.tempo_bpm,
            rate_percent: self.state.playback_rate_percent,
        });
        if was_playing {
            self.start_phase(generation, now, anchor_transport);
        } else {
            self.playhead.set_time(target);
        }
    }

    /// Change the playback rate in percent of the original tempo. Kept in
    /// lockstep with the tempo.
    pub fn set_playback_rate(&mut self, percent: f64) {
        let percent = timemap::clamp_rate_percent(percent);
        self.set_tempo(self.state.original_tempo_bpm * percent / 100.0);
    }

    /// Set or clear the A-B loop. Returns whether anything changed; an
    /// unchanged window skips the stop/reconfigure/start sequence entirely.
    pub fn set_loop_points(&mut self, start: Option<f64>, end: Option<f64>) -> bool {
        if !self
            .window
            .set_points(start, end, self.state.duration_visual)
        {
            return false;
        }
        let now = self.clock.host_now();
        let generation = self.begin_op(now);
        let position = self.live_visual(now);
        let was_playing = self.state.is_playing;
        if was_playing {
            self.stop_phase();
            self.state.is_playing = false;
        }
        // snap into the window when the playhead is outside it
        let target = match self.window.visual_bounds() {
            Some((s, e)) if position < s || position >= e => s,
            _ => position,
        };
        let target = self.reconfigure_for(target);
        if was_playing {
            self.start_phase(generation, now, self.state.to_transport(target));
        } else {
            self.playhead.set_time(target);
            self.notify(Notification::PositionChanged(target));
        }
        true
    }

    /// Enable or disable whole-piece repetition. Only reconfigures the
    /// clock's loop bounds; enabling repeat past the end rewinds the
    /// position but leaves starting to the next explicit `play()`.
    pub fn toggle_repeat(&mut self, enabled: bool) {
        self.state.is_repeating = enabled;
        self.clock.configure_loop(self.window.clock_bounds(
            enabled,
            self.state.tempo_bpm,
            self.state.original_tempo_bpm,
            self.state.duration_visual,
        ));
        if enabled
            && !self.state.is_playing
            && self.state.current_time_visual >= self.state.duration_visual
        {
            self.state.current_time_visual = 0.0;
            self.playhead.set_time(0.0);
            self.notify(Notification::PositionChanged(0.0));
        }
    }

    // ----- mixer-style controls ------------------------------------------

    pub fn set_master_volume(&mut self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        self.state.master_volume = volume;
        self.notes.set_master_volume(volume);
        self.audio.set_master_volume(volume);
        self.evaluate_silence();
    }

    /// Mute or unmute one note track. Unmuting mid-playback re-fires notes
    /// currently in flight so the track rejoins immediately.
    pub fn set_track_mute(&mut self, track_id: TrackId, muted: bool) {
        let was_muted = self.notes.is_muted(track_id);
        self.notes.set_mute(track_id, muted);
        if was_muted && !muted && self.state.is_playing {
            let now = self.clock.host_now();
            let visual = self.live_visual(now);
            self.notes.retrigger_held(
                track_id,
                visual,
                self.state.tempo_bpm,
                self.state.original_tempo_bpm,
                &mut *self.note_sink,
            );
        }
    }

    pub fn set_track_volume(&mut self, track_id: TrackId, linear: f32) {
        self.notes
            .set_volume(track_id, linear, self.state.master_volume);
    }

    pub fn set_track_pan(&mut self, track_id: TrackId, pan: f32) {
        self.notes.set_pan(track_id, pan);
    }

    /// Mute or unmute one external audio file. Unmuting while playing
    /// restarts that player at the live clock-derived offset so it rejoins
    /// in phase instead of fading in from zero.
    pub fn set_file_mute(&mut self, id: &str, muted: bool) {
        if self.audio.set_file_mute(id, muted) == MuteTransition::Unmuted && self.state.is_playing
        {
            let now = self.clock.host_now();
            let offset = self.state.to_visual(self.clock.position(now));
            self.audio
                .start_file_at(id, offset, now, now, self.config.deferred_start_deadline_secs);
        }
        self.refresh_duration();
        self.evaluate_silence();
    }

    pub fn set_file_volume(&mut self, id: &str, volume: f32) {
        self.audio.set_file_volume(id, volume);
        self.evaluate_silence();
    }

    pub fn set_file_pan(&mut self, id: &str, pan: f32) {
        self.audio.set_file_pan(id, pan);
    }

    /// Reconcile the audio players against the injected registry. Files that
    /// turned audible while playing rejoin at the live offset.
    pub fn sync_registry(&mut self) {
        let descs = self.registry.files();
        let newly_audible = self.audio.sync_from_registry(&descs);
        if self.state.is_playing && !newly_audible.is_empty() {
            let now = self.clock.host_now();
            let offset = self.state.to_visual(self.clock.position(now));
            for id in newly_audible {
                self.audio.start_file_at(
                    &id,
                    offset,
                    now,
                    now,
                    self.config.deferred_start_deadline_secs,
                );
            }
        }
        self.refresh_duration();
        self.evaluate_silence();
    }

    // ----- atomic protocol phases -----------------------------------------

    fn begin_op(&mut self, now: f64) -> u64 {
        self.state.generation += 1;
        self.guards.last_operation = Some(now);
        self.state.generation
    }

    fn superseded(&self, generation: u64) -> bool {
        self.state.generation != generation
    }

    /// Tear down the current playback epoch: sync loop, scheduler, audio
    /// players, clock, and finally the hard note gate against residual
    /// tails.
    fn stop_phase(&mut self) {
        self.sync.disarm();
        self.notes.stop(&mut *self.note_sink);
        self.audio.stop_all();
        self.clock.stop();
        self.note_sink.set_gate_muted(true);
    }

    /// Recompute derived state for a new target position: duration, clamped
    /// playhead, scheduler timeline, clock loop bounds. Silent on audio.
    fn reconfigure_for(&mut self, target_visual: f64) -> f64 {
        self.refresh_duration();
        let target = target_visual.clamp(0.0, self.state.duration_visual);
        self.state.current_time_visual = target;
        self.notes.reconfigure(
            &self.window,
            self.state.tempo_bpm,
            self.state.original_tempo_bpm,
        );
        self.clock.configure_loop(self.window.clock_bounds(
            self.state.is_repeating,
            self.state.tempo_bpm,
            self.state.original_tempo_bpm,
            self.state.duration_visual,
        ));
        target
    }

    /// Bring the new epoch up, re-checking the captured generation before
    /// each irreversible action and aborting silently once superseded.
    fn start_phase(&mut self, generation: u64, now: f64, anchor_transport: f64) -> bool {
        if self.superseded(generation) {
            return false;
        }
        self.note_sink.set_gate_muted(false);

        if self.superseded(generation) {
            return false;
        }
        let anchor = now + self.config.lookahead_secs;
        let target = self.state.current_time_visual;
        self.clock.start(anchor, anchor_transport);

        if self.superseded(generation) {
            return false;
        }
        let offset = self.state.to_transport(self.window.part_offset(target));
        self.notes.start(offset, &mut *self.note_sink);

        if self.superseded(generation) {
            return false;
        }
        self.audio.start_all_active_at(
            target,
            anchor,
            now,
            self.config.deferred_start_deadline_secs,
        );

        self.state.is_playing = true;
        self.sync.arm(generation);
        self.notes.retrigger_all_held(
            target,
            self.state.tempo_bpm,
            self.state.original_tempo_bpm,
            &mut *self.note_sink,
        );
        self.playhead.set_time(target);
        self.notify(Notification::PlayStateChanged(true));
        true
    }

    // ----- internals ------------------------------------------------------

    fn pause_internal(&mut self, user_initiated: bool) {
        if !self.state.is_playing {
            return;
        }
        let now = self.clock.host_now();
        self.begin_op(now);
        let position = self.live_visual(now);
        self.stop_phase();
        self.state.is_playing = false;
        self.state.current_time_visual = position;
        if user_initiated {
            self.auto_pause.note_user_pause();
        }
        self.playhead.set_time(position);
        self.notify(Notification::PlayStateChanged(false));
        self.notify(Notification::PositionChanged(position));
    }

    fn finish_playback(&mut self) {
        self.notes.stop(&mut *self.note_sink);
        self.audio.stop_all();
        self.clock.stop();
        self.state.is_playing = false;
        self.notify(Notification::PlayStateChanged(false));
        self.notify(Notification::Completed);
        if let Some(callback) = self.on_complete.as_mut() {
            callback();
        }
    }

    /// The clock wrapped its loop window: the scheduler rewound itself this
    /// tick, external audio rejoins at the wrap offset, and notes already in
    /// flight at the loop start are re-fired.
    fn handle_wrap(&mut self, visual: f64, now: f64) {
        self.audio.stop_all();
        self.audio.start_all_active_at(
            visual,
            now,
            now,
            self.config.deferred_start_deadline_secs,
        );
        let rel = self.state.to_transport(self.window.part_offset(visual));
        self.notes.rewind(rel, &mut *self.note_sink);
        self.notes.retrigger_all_held(
            visual,
            self.state.tempo_bpm,
            self.state.original_tempo_bpm,
            &mut *self.note_sink,
        );
        self.notify(Notification::PositionChanged(visual));
    }

    /// Live position: clock-derived while playing, last stored otherwise.
    fn live_visual(&self, now: f64) -> f64 {
        if self.state.is_playing {
            self.state
                .to_visual(self.clock.position(now))
                .clamp(0.0, self.state.duration_visual)
        } else {
            self.state.current_time_visual
        }
    }

    fn loop_start_or_zero(&self) -> f64 {
        self.window.visual_bounds().map(|(s, _)| s).unwrap_or(0.0)
    }

    fn refresh_duration(&mut self) {
        let duration = self.note_end_visual.max(self.audio.duration_visual());
        if (duration - self.state.duration_visual).abs() > f64::EPSILON {
            self.state.duration_visual = duration;
            self.notify(Notification::DurationChanged(duration));
        }
    }

    fn evaluate_silence(&mut self) {
        let now = self.clock.host_now();
        let silent = self.state.master_volume <= f32::EPSILON || self.audio.files_silent();
        match self
            .auto_pause
            .on_settings_change(silent, self.state.is_playing, now)
        {
            AutoPauseAction::Pause => self.pause_internal(false),
            AutoPauseAction::Resume => self.play(),
            AutoPauseAction::None => {}
        }
    }

    fn notify(&mut self, notification: Notification) {
        // fire-and-forget: a full ring drops the event
        let _ = self.notifications.try_push(notification);
    }
}
