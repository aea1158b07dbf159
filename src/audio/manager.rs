// Audio file manager - Per-file buffered playback under the shared anchor
// Reconciles players against the external registry, starts every audible
// file at one anchor time, and defers starts whose buffers are still
// decoding without ever letting a stale poll start superseded audio.

use super::player::AudioPlayer;
use super::registry::{AudioFileDesc, FileId, PlayerFactory};

/// One registered external audio source and its playback bookkeeping.
pub struct AudioFileEntry {
    pub id: FileId,
    player: Box<dyn AudioPlayer>,
    pub visible: bool,
    pub muted: bool,
    /// Channel volume as registered, before master scaling
    pub volume: f32,
    pub pan: f32,
    /// Whether this entry's player is currently running
    pub started: bool,
    /// Bumped on every start/stop; a pending deferred start whose captured
    /// token no longer matches is dead
    pub start_token: u64,
    /// Buffer never became ready before the deadline; inaudible until the
    /// next start sequence
    pub timed_out: bool,
}

impl AudioFileEntry {
    fn audible(&self) -> bool {
        self.visible && !self.muted
    }
}

/// How a mute change left an entry, so the caller can rejoin an unmuted
/// player in phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuteTransition {
    Unmuted,
    Muted,
    Unchanged,
}

/// A start waiting for its buffer to decode.
struct DeferredStart {
    id: FileId,
    token: u64,
    offset_visual: f64,
    anchor_host: f64,
    deadline_host: f64,
}

/// Manager of all external audio players.
pub struct AudioFileManager {
    factory: Box<dyn PlayerFactory>,
    entries: Vec<AudioFileEntry>,
    pending: Vec<DeferredStart>,
    rate_percent: f64,
    master_volume: f32,
    deferred_timeouts: u64,
}

impl AudioFileManager {
    pub fn new(factory: Box<dyn PlayerFactory>) -> Self {
        Self {
            factory,
            entries: Vec::new(),
            pending: Vec::new(),
            rate_percent: 100.0,
            master_volume: 1.0,
            deferred_timeouts: 0,
        }
    }

    fn rate_ratio(&self) -> f64 {
        self.rate_percent / 100.0
    }

    pub fn entry(&self, id: &str) -> Option<&AudioFileEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    fn entry_index(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }

    pub fn deferred_timeouts(&self) -> u64 {
        self.deferred_timeouts
    }

    pub fn pending_starts(&self) -> usize {
        self.pending.len()
    }

    /// Reconcile entries against the externally-owned registry list:
    /// create players for new files, dispose removed ones, fold in
    /// volume/pan/mute/visibility updates. Already-started players keep
    /// running unless their mute or visibility state demands a stop.
    ///
    /// Returns the ids that transitioned to audible, so a playing caller can
    /// restart them at the live position.
    pub fn sync_from_registry(&mut self, descs: &[AudioFileDesc]) -> Vec<FileId> {
        // Dispose removed entries (and their pending starts)
        self.entries.retain_mut(|entry| {
            let keep = descs.iter().any(|d| d.id == entry.id);
            if !keep {
                entry.start_token += 1;
                if entry.started {
                    entry.player.stop();
                }
            }
            keep
        });
        let live: Vec<FileId> = self.entries.iter().map(|e| e.id.clone()).collect();
        self.pending.retain(|p| live.iter().any(|id| *id == p.id));

        let mut newly_audible = Vec::new();
        for desc in descs {
            match self.entry_index(&desc.id) {
                Some(idx) => {
                    let master = self.master_volume;
                    let entry = &mut self.entries[idx];
                    let was_audible = entry.audible();
                    entry.visible = desc.visible;
                    entry.muted = desc.muted;
                    if (entry.volume - desc.volume).abs() > f32::EPSILON {
                        entry.volume = desc.volume;
                        entry.player.set_volume(desc.volume * master);
                    }
                    if (entry.pan - desc.pan).abs() > f32::EPSILON {
                        entry.pan = desc.pan;
                        entry.player.set_pan(desc.pan);
                    }
                    if was_audible && !entry.audible() {
                        entry.start_token += 1;
                        if entry.started {
                            entry.player.stop();
                            entry.started = false;
                        }
                    } else if !was_audible && entry.audible() {
                        newly_audible.push(entry.id.clone());
                    }
                }
                None => {
                    let mut player = self.factory.player_for(desc);
                    player.set_stretch_rate(self.rate_ratio());
                    player.set_volume(desc.volume * self.master_volume);
                    player.set_pan(desc.pan);
                    self.entries.push(AudioFileEntry {
                        id: desc.id.clone(),
                        player,
                        visible: desc.visible,
                        muted: desc.muted,
                        volume: desc.volume,
                        pan: desc.pan,
                        started: false,
                        start_token: 0,
                        timed_out: false,
                    });
                }
            }
        }
        newly_audible
    }

    /// Start every visible, unmuted entry at the shared absolute anchor with
    /// buffer offset `offset_visual`. Entries whose buffers are not decoded
    /// yet get a cancellable deferred start that expires at
    /// `now + deadline_secs`.
    pub fn start_all_active_at(
        &mut self,
        offset_visual: f64,
        anchor_host: f64,
        now: f64,
        deadline_secs: f64,
    ) {
        let ids: Vec<FileId> = self
            .entries
            .iter()
            .filter(|e| e.audible())
            .map(|e| e.id.clone())
            .collect();
        for id in ids {
            self.start_file_at(&id, offset_visual, anchor_host, now, deadline_secs);
        }
    }

    /// Start (or defer) a single entry at the given anchor and offset.
    pub fn start_file_at(
        &mut self,
        id: &str,
        offset_visual: f64,
        anchor_host: f64,
        now: f64,
        deadline_secs: f64,
    ) {
        let Some(idx) = self.entry_index(id) else {
            return;
        };
        let entry = &mut self.entries[idx];
        if !entry.audible() {
            return;
        }
        entry.start_token += 1;
        entry.timed_out = false;
        self.pending.retain(|p| p.id != entry.id);

        if entry.player.is_ready() {
            match entry.player.start_at(offset_visual, anchor_host) {
                Ok(()) => entry.started = true,
                Err(err) => {
                    entry.started = false;
                    log::warn!("audio file '{}' failed to start: {err}", entry.id);
                }
            }
        } else {
            self.pending.push(DeferredStart {
                id: entry.id.clone(),
                token: entry.start_token,
                offset_visual,
                anchor_host,
                deadline_host: now + deadline_secs,
            });
        }
    }

    /// Resolve deferred starts. A buffer that became ready starts with the
    /// elapsed time since the original anchor folded into the offset, so the
    /// player lands at the musically correct position instead of restarting
    /// the recording from its scheduled offset.
    pub fn poll_deferred(&mut self, now: f64) {
        if self.pending.is_empty() {
            return;
        }
        let ratio = self.rate_ratio();
        let mut resolved = Vec::new();
        for (i, pending) in self.pending.iter().enumerate() {
            let Some(idx) = self.entry_index(&pending.id) else {
                resolved.push(i);
                continue;
            };
            if self.entries[idx].start_token != pending.token {
                // a newer start or stop superseded this poll
                resolved.push(i);
                continue;
            }
            if self.entries[idx].player.is_ready() {
                let elapsed = (now - pending.anchor_host).max(0.0);
                let offset = pending.offset_visual + elapsed * ratio;
                let entry = &mut self.entries[idx];
                match entry.player.start_at(offset, now) {
                    Ok(()) => entry.started = true,
                    Err(err) => {
                        log::warn!("deferred start of '{}' failed: {err}", entry.id)
                    }
                }
                resolved.push(i);
            } else if now >= pending.deadline_host {
                let entry = &mut self.entries[idx];
                entry.timed_out = true;
                self.deferred_timeouts += 1;
                log::warn!(
                    "audio file '{}' buffer not ready after deadline; silencing it for this start",
                    entry.id
                );
                resolved.push(i);
            }
        }
        for i in resolved.into_iter().rev() {
            self.pending.remove(i);
        }
    }

    /// Invalidate every pending deferred start and stop every playing entry.
    /// Safe to call when nothing is playing.
    pub fn stop_all(&mut self) {
        self.pending.clear();
        for entry in &mut self.entries {
            entry.start_token += 1;
            entry.timed_out = false;
            if entry.started {
                entry.player.stop();
                entry.started = false;
            }
        }
    }

    /// Apply a pitch-preserving rate change to every player.
    pub fn set_rate_percent(&mut self, percent: f64) {
        if (percent - self.rate_percent).abs() < f64::EPSILON {
            return;
        }
        self.rate_percent = percent;
        let ratio = self.rate_ratio();
        for entry in &mut self.entries {
            entry.player.set_stretch_rate(ratio);
        }
    }

    /// Flip one file's mute state. Muting stops the player and invalidates
    /// its pending start; the caller reacts to `Unmuted` by restarting the
    /// file at the live clock-derived offset.
    pub fn set_file_mute(&mut self, id: &str, muted: bool) -> MuteTransition {
        let Some(idx) = self.entry_index(id) else {
            return MuteTransition::Unchanged;
        };
        let entry = &mut self.entries[idx];
        if entry.muted == muted {
            return MuteTransition::Unchanged;
        }
        entry.muted = muted;
        if muted {
            entry.start_token += 1;
            self.pending.retain(|p| p.id != id);
            if entry.started {
                entry.player.stop();
                entry.started = false;
            }
            MuteTransition::Muted
        } else {
            MuteTransition::Unmuted
        }
    }

    pub fn set_file_volume(&mut self, id: &str, volume: f32) {
        let master = self.master_volume;
        if let Some(idx) = self.entry_index(id) {
            let entry = &mut self.entries[idx];
            entry.volume = volume.clamp(0.0, 1.0);
            entry.player.set_volume(entry.volume * master);
        }
    }

    pub fn set_file_pan(&mut self, id: &str, pan: f32) {
        if let Some(idx) = self.entry_index(id) {
            let entry = &mut self.entries[idx];
            entry.pan = pan.clamp(-1.0, 1.0);
            entry.player.set_pan(entry.pan);
        }
    }

    /// Rescale every player's effective volume after a master change.
    pub fn set_master_volume(&mut self, master: f32) {
        self.master_volume = master.clamp(0.0, 1.0);
        for entry in &mut self.entries {
            entry.player.set_volume(entry.volume * self.master_volume);
        }
    }

    /// Mean positional error of the running audible players against the
    /// expected visual position. `None` when no player reports a position.
    pub fn average_drift(&self, expected_visual: f64) -> Option<f64> {
        let mut sum = 0.0;
        let mut count = 0u32;
        for entry in &self.entries {
            if !entry.started || !entry.audible() {
                continue;
            }
            if let Some(pos) = entry.player.position() {
                sum += pos - expected_visual;
                count += 1;
            }
        }
        (count > 0).then(|| sum / count as f64)
    }

    /// Longest audible buffer in visual seconds; feeds the overall duration.
    pub fn duration_visual(&self) -> f64 {
        self.entries
            .iter()
            .filter(|e| e.audible())
            .filter_map(|e| e.player.buffer_duration())
            .fold(0.0, f64::max)
    }

    /// Every registered file is muted or at zero volume. False when no files
    /// are registered (note tracks may still sound).
    pub fn files_silent(&self) -> bool {
        !self.entries.is_empty()
            && self
                .entries
                .iter()
                .all(|e| e.muted || e.volume <= f32::EPSILON)
    }
}
