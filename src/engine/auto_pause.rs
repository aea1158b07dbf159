// Auto-pause controller - Pause on silence, single-shot guarded resume
// Only ever resumes what it paused itself; a user pause is never overridden.

/// What the caller should do after a settings change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoPauseAction {
    None,
    /// Output went silent while playing: pause, remembering it was us
    Pause,
    /// Output is audible again after an auto-pause: resume
    Resume,
}

/// Watches aggregate-silence transitions across settings changes.
pub struct AutoPauseController {
    cooldown_secs: f64,
    auto_paused: bool,
    last_auto_resume: Option<f64>,
}

impl AutoPauseController {
    pub fn new(cooldown_secs: f64) -> Self {
        Self {
            cooldown_secs,
            auto_paused: false,
            last_auto_resume: None,
        }
    }

    pub fn did_auto_pause(&self) -> bool {
        self.auto_paused
    }

    /// A user-initiated pause takes ownership of the paused state; any
    /// pending auto-resume is forgotten.
    pub fn note_user_pause(&mut self) {
        self.auto_paused = false;
    }

    /// A user-initiated play clears the auto-pause bookkeeping as well.
    pub fn note_user_play(&mut self) {
        self.auto_paused = false;
    }

    /// Evaluate the silence state after a settings change.
    ///
    /// The cooldown guards the audible edge: rapid mute toggles within the
    /// window do not bounce playback between pause and resume.
    pub fn on_settings_change(
        &mut self,
        silent: bool,
        is_playing: bool,
        now: f64,
    ) -> AutoPauseAction {
        if silent {
            if is_playing {
                self.auto_paused = true;
                return AutoPauseAction::Pause;
            }
            return AutoPauseAction::None;
        }
        if self.auto_paused && !is_playing {
            let in_cooldown = self
                .last_auto_resume
                .is_some_and(|t| now - t < self.cooldown_secs);
            if in_cooldown {
                return AutoPauseAction::None;
            }
            self.auto_paused = false;
            self.last_auto_resume = Some(now);
            return AutoPauseAction::Resume;
        }
        AutoPauseAction::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pauses_on_silence_while_playing() {
        let mut ap = AutoPauseController::new(0.5);
        assert_eq!(ap.on_settings_change(true, true, 0.0), AutoPauseAction::Pause);
        assert!(ap.did_auto_pause());
    }

    #[test]
    fn test_silence_while_stopped_does_nothing() {
        let mut ap = AutoPauseController::new(0.5);
        assert_eq!(ap.on_settings_change(true, false, 0.0), AutoPauseAction::None);
    }

    #[test]
    fn test_resumes_only_after_own_pause() {
        let mut ap = AutoPauseController::new(0.5);
        // user paused, then audio became audible: stay paused
        assert_eq!(ap.on_settings_change(false, false, 1.0), AutoPauseAction::None);

        ap.on_settings_change(true, true, 2.0);
        assert_eq!(
            ap.on_settings_change(false, false, 3.0),
            AutoPauseAction::Resume
        );
    }

    #[test]
    fn test_user_pause_cancels_auto_resume() {
        let mut ap = AutoPauseController::new(0.5);
        ap.on_settings_change(true, true, 0.0);
        ap.note_user_pause();
        assert_eq!(ap.on_settings_change(false, false, 1.0), AutoPauseAction::None);
    }

    #[test]
    fn test_cooldown_blocks_rapid_resume() {
        let mut ap = AutoPauseController::new(0.5);
        ap.on_settings_change(true, true, 0.0);
        assert_eq!(ap.on_settings_change(false, false, 0.1), AutoPauseAction::Resume);
        // silence and audible again inside the cooldown window
        ap.on_settings_change(true, true, 0.2);
        assert_eq!(ap.on_settings_change(false, false, 0.3), AutoPauseAction::None);
        // after the window the resume goes through
        assert_eq!(ap.on_settings_change(false, false, 0.7), AutoPauseAction::Resume);
    }
}
