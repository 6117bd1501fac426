//! Playback authority: the only component that starts audio.
//!
//! Holds the single global "now playing" slot. Starting a key first stops
//! whatever is playing.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};
use voicetag_core::{
    AudioLocator, AudioPlayer, EngineEvent, EngineEventEmitter, PlaybackError, TaskKey,
};

/// A failed `play`. The previous key was already stopped when the player
/// refused the new locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayFailure {
    pub stopped: Option<TaskKey>,
    pub error: PlaybackError,
}

pub struct PlaybackAuthority {
    player: Arc<dyn AudioPlayer>,
    emitter: Arc<dyn EngineEventEmitter>,
    now_playing: Mutex<Option<TaskKey>>,
}

impl PlaybackAuthority {
    pub fn new(player: Arc<dyn AudioPlayer>, emitter: Arc<dyn EngineEventEmitter>) -> Self {
        Self {
            player,
            emitter,
            now_playing: Mutex::new(None),
        }
    }

    pub fn now_playing(&self) -> Option<TaskKey> {
        self.slot().clone()
    }

    /// Play `locator` as `key`. Returns the key that was stopped, if any.
    ///
    /// On error nothing is playing afterwards.
    pub fn play(
        &self,
        key: &TaskKey,
        locator: &AudioLocator,
    ) -> Result<Option<TaskKey>, PlayFailure> {
        let mut slot = self.slot();
        let stopped = slot.take();
        if let Some(prev) = &stopped {
            self.player.stop();
            debug!(target: "voicetag.playback", key = %prev.short(), "Stopped for new playback");
            self.emitter
                .emit(EngineEvent::PlaybackStopped { key: prev.clone() });
        }

        if let Err(error) = self.player.start(locator) {
            return Err(PlayFailure { stopped, error });
        }
        *slot = Some(key.clone());
        drop(slot);

        info!(target: "voicetag.playback", key = %key.short(), "Playback started");
        self.emitter
            .emit(EngineEvent::PlaybackStarted { key: key.clone() });
        Ok(stopped)
    }

    /// Stop the current playback, returning its key.
    pub fn stop(&self) -> Option<TaskKey> {
        let stopped = self.slot().take()?;
        self.player.stop();
        self.emitter
            .emit(EngineEvent::PlaybackStopped { key: stopped.clone() });
        Some(stopped)
    }

    /// The player reached the end of `key`. Returns `false` if `key` was not
    /// the one playing.
    pub fn finished(&self, key: &TaskKey) -> bool {
        let mut slot = self.slot();
        if slot.as_ref() != Some(key) {
            return false;
        }
        *slot = None;
        drop(slot);
        self.emitter
            .emit(EngineEvent::PlaybackStopped { key: key.clone() });
        true
    }

    fn slot(&self) -> MutexGuard<'_, Option<TaskKey>> {
        self.now_playing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::{Sequence, mock};
    use voicetag_core::{ChannelEmitter, NoopEmitter, task_key};

    mock! {
        Player {}
        impl AudioPlayer for Player {
            fn start(&self, locator: &AudioLocator) -> Result<(), PlaybackError>;
            fn stop(&self);
        }
    }

    #[test]
    fn test_new_key_stops_previous_first() {
        let mut player = MockPlayer::new();
        let mut seq = Sequence::new();
        player
            .expect_start()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        player
            .expect_stop()
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        player
            .expect_start()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let (emitter, mut rx) = ChannelEmitter::new();
        let authority = PlaybackAuthority::new(Arc::new(player), Arc::new(emitter));
        let a = task_key("Alice", "one");
        let b = task_key("Alice", "two");

        assert_eq!(authority.play(&a, &AudioLocator::new("blob://a")), Ok(None));
        assert_eq!(
            authority.play(&b, &AudioLocator::new("blob://b")),
            Ok(Some(a.clone()))
        );
        assert_eq!(authority.now_playing(), Some(b.clone()));

        let events: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(
            events,
            vec![
                EngineEvent::PlaybackStarted { key: a.clone() },
                EngineEvent::PlaybackStopped { key: a },
                EngineEvent::PlaybackStarted { key: b },
            ]
        );
    }

    #[test]
    fn test_failed_start_leaves_nothing_playing() {
        let mut player = MockPlayer::new();
        player
            .expect_start()
            .returning(|loc| Err(PlaybackError::Revoked(loc.clone())));

        let authority = PlaybackAuthority::new(Arc::new(player), Arc::new(NoopEmitter::new()));
        let key = task_key("Alice", "one");
        assert!(authority.play(&key, &AudioLocator::new("blob://gone")).is_err());
        assert_eq!(authority.now_playing(), None);
    }

    #[test]
    fn test_failed_start_reports_stopped_key() {
        let mut player = MockPlayer::new();
        let mut seq = Sequence::new();
        player
            .expect_start()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        player
            .expect_stop()
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        player
            .expect_start()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(PlaybackError::Device("unplugged".to_string())));

        let authority = PlaybackAuthority::new(Arc::new(player), Arc::new(NoopEmitter::new()));
        let a = task_key("Alice", "one");
        let b = task_key("Alice", "two");
        authority.play(&a, &AudioLocator::new("blob://a")).unwrap();

        assert_eq!(
            authority.play(&b, &AudioLocator::new("blob://b")),
            Err(PlayFailure {
                stopped: Some(a),
                error: PlaybackError::Device("unplugged".to_string()),
            })
        );
        assert_eq!(authority.now_playing(), None);
    }

    #[test]
    fn test_finished_only_clears_matching_key() {
        let mut player = MockPlayer::new();
        player.expect_start().returning(|_| Ok(()));

        let authority = PlaybackAuthority::new(Arc::new(player), Arc::new(NoopEmitter::new()));
        let key = task_key("Alice", "one");
        authority.play(&key, &AudioLocator::new("blob://a")).unwrap();

        assert!(!authority.finished(&task_key("Alice", "other")));
        assert!(authority.finished(&key));
        assert_eq!(authority.now_playing(), None);
    }

    #[test]
    fn test_stop_when_idle() {
        let player = MockPlayer::new();
        let authority = PlaybackAuthority::new(Arc::new(player), Arc::new(NoopEmitter::new()));
        assert_eq!(authority.stop(), None);
    }
}
