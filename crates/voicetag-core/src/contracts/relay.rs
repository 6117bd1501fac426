use serde::{Deserialize, Serialize};

use crate::key::TaskKey;
use crate::tag::BubbleTag;

/// Wire discriminator of a relayed bubble click.
pub const PLAY_TTS: &str = "play_tts";

/// Message a frame posts to the main document when one of its bubbles is
/// activated.
///
/// ```json
/// { "type": "play_tts", "key": "9f86d08...", "text": "Hello", "charName": "Alice", "emotion": "happy" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayMessage {
    PlayTts {
        key: TaskKey,
        text: String,
        #[serde(rename = "charName")]
        char_name: String,
        emotion: String,
    },
}

impl RelayMessage {
    /// Key of the bubble the message refers to.
    pub const fn key(&self) -> &TaskKey {
        match self {
            Self::PlayTts { key, .. } => key,
        }
    }

    /// The tag carried in the payload.
    pub fn tag(&self) -> BubbleTag {
        match self {
            Self::PlayTts {
                text,
                char_name,
                emotion,
                ..
            } => BubbleTag::new(char_name, emotion, text),
        }
    }
}
