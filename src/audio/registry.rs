// Audio registry - Injected read-only view of the externally-owned file list
// The registry is polled and reconciled rather than observed; the provider is
// passed at construction so there is no ambient global lookup.

use super::player::AudioPlayer;

/// Identifier of an external audio file
pub type FileId = String;

/// Registry record describing one external audio source.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFileDesc {
    pub id: FileId,
    pub visible: bool,
    pub muted: bool,
    /// Channel volume in [0, 1]
    pub volume: f32,
    /// Stereo pan in [-1, 1]
    pub pan: f32,
}

impl AudioFileDesc {
    pub fn new(id: impl Into<FileId>) -> Self {
        Self {
            id: id.into(),
            visible: true,
            muted: false,
            volume: 1.0,
            pan: 0.0,
        }
    }
}

/// Read-only provider of the current registry contents.
pub trait AudioRegistryProvider {
    fn files(&self) -> Vec<AudioFileDesc>;
}

/// Creates player backends for newly registered files.
pub trait PlayerFactory {
    fn player_for(&mut self, desc: &AudioFileDesc) -> Box<dyn AudioPlayer>;
}
