//! Session state shared by the scanner, scheduler and state-sync pass.
//!
//! One [`SessionState`] per engine instance; nothing here is global.
//!
//! Lock order: render cache → pending set (owned by the scheduler) → audio
//! memory. Locks are `std::sync` and never held across `.await`.

mod audio;
mod render;

use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use voicetag_core::Settings;

pub use audio::AudioMemory;
pub use render::{RenderCache, RenderedBubble};

/// Explicit, injected session state.
#[derive(Debug, Default)]
pub struct SessionState {
    audio: RwLock<AudioMemory>,
    render: Mutex<RenderCache>,
    settings: RwLock<Settings>,
}

impl SessionState {
    pub fn new(settings: Settings) -> Self {
        Self {
            audio: RwLock::new(AudioMemory::new()),
            render: Mutex::new(RenderCache::new()),
            settings: RwLock::new(settings),
        }
    }

    /// Read access to Audio Memory.
    pub fn audio(&self) -> RwLockReadGuard<'_, AudioMemory> {
        self.audio.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write access, reserved for the scheduler.
    pub(crate) fn audio_mut(&self) -> RwLockWriteGuard<'_, AudioMemory> {
        self.audio.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// The render cache, mutated by the scanner and the state-sync pass.
    pub(crate) fn render(&self) -> MutexGuard<'_, RenderCache> {
        self.render.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of render cache entries.
    pub fn render_cache_len(&self) -> usize {
        self.render().len()
    }

    /// Snapshot of the render cache entry for `key`.
    pub fn rendered(&self, key: &voicetag_core::TaskKey) -> Option<RenderedBubble> {
        self.render().get(key).cloned()
    }

    /// Current settings snapshot.
    pub fn settings(&self) -> Settings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_settings(&self, settings: Settings) {
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = settings;
    }
}
