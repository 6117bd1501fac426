//! Audio output port.

use thiserror::Error;

use crate::ports::synthesis::AudioLocator;

/// Errors starting playback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    /// The locator no longer resolves (e.g. a revoked object URL).
    #[error("audio locator {0} is no longer valid")]
    Revoked(AudioLocator),

    #[error("audio device error: {0}")]
    Device(String),
}

/// The single audio output of the host.
pub trait AudioPlayer: Send + Sync {
    /// Start playing `locator`. Returns once playback has started.
    fn start(&self, locator: &AudioLocator) -> Result<(), PlaybackError>;

    /// Stop whatever is playing. No-op when idle.
    fn stop(&self);
}

/// Player that accepts everything and plays nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPlayer;

impl AudioPlayer for NullPlayer {
    fn start(&self, _locator: &AudioLocator) -> Result<(), PlaybackError> {
        Ok(())
    }

    fn stop(&self) {}
}
