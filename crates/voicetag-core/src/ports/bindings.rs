//! Voice binding lookup.
//!
//! A binding maps a speaker name to the reference audio the backend clones
//! the voice from, one reference per emotion.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::key::normalize_speaker;

/// Emotion name used when a tag's emotion has no dedicated reference.
const FALLBACK_EMOTION: &str = "default";

/// Reference clip for one emotion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceAudio {
    pub emotion: String,
    /// Path of the reference clip on the synthesis server.
    pub path: String,
    /// Transcript of the reference clip.
    #[serde(default)]
    pub prompt_text: String,
    #[serde(default = "default_lang")]
    pub prompt_lang: String,
}

/// Voice configuration for one speaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceBinding {
    /// Language of the utterances to synthesize.
    #[serde(default = "default_lang")]
    pub text_lang: String,
    pub references: Vec<ReferenceAudio>,
}

fn default_lang() -> String {
    "zh".to_string()
}

impl VoiceBinding {
    /// Reference for `emotion`, falling back to `default`, then to the first
    /// reference.
    pub fn reference_for(&self, emotion: &str) -> Option<&ReferenceAudio> {
        let wanted = emotion.trim();
        self.references
            .iter()
            .find(|r| r.emotion.eq_ignore_ascii_case(wanted))
            .or_else(|| {
                self.references
                    .iter()
                    .find(|r| r.emotion.eq_ignore_ascii_case(FALLBACK_EMOTION))
            })
            .or_else(|| self.references.first())
    }
}

/// Speaker-to-voice lookup.
pub trait VoiceBindings: Send + Sync {
    /// Binding for `speaker`, if one is configured.
    fn binding(&self, speaker: &str) -> Option<VoiceBinding>;

    fn has_binding(&self, speaker: &str) -> bool {
        self.binding(speaker).is_some()
    }
}

/// In-memory bindings, typically loaded from a JSON file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticBindings {
    speakers: HashMap<String, VoiceBinding>,
}

impl StaticBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the binding for `speaker`.
    #[must_use]
    pub fn with(mut self, speaker: &str, binding: VoiceBinding) -> Self {
        self.insert(speaker, binding);
        self
    }

    pub fn insert(&mut self, speaker: &str, binding: VoiceBinding) {
        self.speakers.insert(normalize_speaker(speaker), binding);
    }

    pub fn len(&self) -> usize {
        self.speakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.speakers.is_empty()
    }
}

impl VoiceBindings for StaticBindings {
    fn binding(&self, speaker: &str) -> Option<VoiceBinding> {
        self.speakers.get(&normalize_speaker(speaker)).cloned()
    }
}
