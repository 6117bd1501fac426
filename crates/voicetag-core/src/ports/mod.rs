//! Port definitions (trait abstractions) for external systems.
//!
//! Ports define the interfaces the bubble engine expects from its host.
//! They contain no implementation details and use only domain types.
//!
//! # Design Rules
//!
//! - No HTTP client types in any signature
//! - Synthesis is async; binding lookup, playback and event emission are not
//! - Every port has a null implementation for tests and headless hosts

pub mod bindings;
pub mod event_emitter;
pub mod player;
pub mod synthesis;

pub use bindings::{ReferenceAudio, StaticBindings, VoiceBinding, VoiceBindings};
pub use event_emitter::{ChannelEmitter, EngineEventEmitter, NoopEmitter};
pub use player::{AudioPlayer, NullPlayer, PlaybackError};
pub use synthesis::{AudioLocator, SynthesisBackend, SynthesisError, SynthesisRequest};
