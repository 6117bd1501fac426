//! Cross-document message contracts.
//!
//! Messages posted from an embedded frame to the main document. Keep these
//! plain serde types; the transport lives in the engine.

mod relay;

pub use relay::{PLAY_TTS, RelayMessage};
