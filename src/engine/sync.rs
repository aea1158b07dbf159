// Sync loop - Periodic playhead push, end-of-content detection, drift correction
// Re-arms only while its owning generation is live; a mismatch means a newer
// operation superseded this loop and it silently terminates.

use crate::audio::AudioFileManager;
use crate::transport::{PlaybackState, TransportClock};

use super::config::EngineConfig;

/// Position decrease larger than this on a looping clock is a wrap, not jitter
const WRAP_EPSILON: f64 = 1e-6;

/// Receiver of visual playhead positions (the rendered cursor).
pub trait PlayheadSink {
    fn set_time(&mut self, visual_secs: f64);
}

/// What one sync step observed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncOutcome {
    /// Not armed for the live generation, or not playing
    Idle,
    /// Playhead advanced normally
    Running(f64),
    /// The clock's loop window wrapped back to its start
    Wrapped(f64),
    /// Non-repeating playback reached the end; the loop has disarmed
    Completed,
}

/// The transport/drift sync loop.
///
/// Owns `PlaybackState.current_time_visual` while playing; stepped from the
/// controller's tick.
pub struct SyncLoop {
    armed: Option<u64>,
    ticks: u64,
    drift_threshold: f64,
    drift_correction: f64,
    drift_interval: u64,
}

impl SyncLoop {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            armed: None,
            ticks: 0,
            drift_threshold: config.drift_threshold_secs,
            drift_correction: config.drift_correction_max.clamp(0.0, 0.5),
            drift_interval: config.drift_check_interval_ticks.max(1) as u64,
        }
    }

    /// Bind the loop to the generation that started it.
    pub fn arm(&mut self, generation: u64) {
        self.armed = Some(generation);
        self.ticks = 0;
    }

    pub fn disarm(&mut self) {
        self.armed = None;
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// One tick of the loop.
    pub fn step(
        &mut self,
        live_generation: u64,
        now: f64,
        state: &mut PlaybackState,
        clock: &mut TransportClock,
        audio: &AudioFileManager,
        playhead: &mut dyn PlayheadSink,
    ) -> SyncOutcome {
        match self.armed {
            Some(generation) if generation == live_generation => {}
            Some(_) => {
                // superseded by a newer operation
                self.disarm();
                return SyncOutcome::Idle;
            }
            None => return SyncOutcome::Idle,
        }
        if !state.is_playing {
            self.disarm();
            return SyncOutcome::Idle;
        }

        self.ticks += 1;
        let visual = state.to_visual(clock.position(now));
        let duration = state.duration_visual;

        // End of content: exactly one final playhead push, then done.
        if !state.is_repeating && visual >= duration {
            state.current_time_visual = duration;
            playhead.set_time(duration);
            self.disarm();
            return SyncOutcome::Completed;
        }

        // Clamp even while repeating so the display never overshoots.
        // Only a clock with loop bounds can wrap; without them a position
        // decrease is correction noise, never a lap.
        let clamped = visual.min(duration);
        let wrapped = clock.loop_bounds().is_some()
            && clamped < state.current_time_visual - WRAP_EPSILON;
        state.current_time_visual = clamped;
        playhead.set_time(clamped);

        if wrapped {
            return SyncOutcome::Wrapped(clamped);
        }

        if self.ticks % self.drift_interval == 0 {
            if let Some(drift) = audio.average_drift(clamped) {
                if drift.abs() > self.drift_threshold {
                    // Positive drift: players are ahead, move the clock
                    // toward them by a bounded fraction of the error.
                    let step_visual = drift * self.drift_correction;
                    clock.nudge(state.to_transport(step_visual));
                    // Fold the nudge into the stored position so the next
                    // tick compares against the corrected clock; a backward
                    // step must not read as a loop wrap.
                    state.current_time_visual =
                        (state.current_time_visual + step_visual).clamp(0.0, duration);
                    log::debug!(
                        "drift {:.4}s corrected by {:.4}s",
                        drift,
                        step_visual
                    );
                }
            }
        }
        SyncOutcome::Running(clamped)
    }
}
