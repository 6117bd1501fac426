//! Core domain types and port definitions for voicetag.
//!
//! This crate holds everything the bubble engine and its adapters agree on
//! without owning any state: the fingerprint keyer, the inline tag grammar,
//! the bubble status state machine, settings, outward events, the
//! cross-document message contract, and the port traits for the synthesis
//! backend, voice bindings, audio output and event emission.
//!
//! Nothing here performs I/O.

#![deny(unused_crate_dependencies)]

pub mod contracts;
pub mod events;
pub mod key;
pub mod ports;
pub mod settings;
pub mod status;
pub mod tag;

// Re-export commonly used types for convenience
pub use contracts::RelayMessage;
pub use events::{EngineEvent, NotificationLevel};
pub use key::{TaskKey, normalize_speaker, normalize_utterance, task_key};
pub use ports::{
    AudioLocator, AudioPlayer, ChannelEmitter, EngineEventEmitter, NoopEmitter, NullPlayer,
    PlaybackError, ReferenceAudio, StaticBindings, SynthesisBackend, SynthesisError,
    SynthesisRequest, VoiceBinding, VoiceBindings,
};
pub use settings::{
    DEFAULT_BUBBLE_STYLE, Settings, SettingsError, SettingsUpdate, validate_settings,
};
pub use status::{BubbleStatus, TransitionError};
pub use tag::{BubbleTag, DEFAULT_MARKER, TagError, TagMatch, TagPattern};

#[cfg(test)]
use serde_json as _;
