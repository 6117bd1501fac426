//! Inline voice-tag grammar.
//!
//! A tag looks like `[TTSVoice: speaker : emotion] utterance`. The marker
//! keyword is matched case-insensitively and is configurable; the utterance
//! runs until the end of the line, the next `[`, or the next `<`.

use std::ops::Range;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::key::{TaskKey, normalize_speaker, normalize_utterance, task_key};

/// Marker keyword used by the chat prompt templates.
pub const DEFAULT_MARKER: &str = "TTSVoice";

/// Emotion used when a tag carries a blank emotion field.
const DEFAULT_EMOTION: &str = "default";

/// A voice tag extracted from transcript text. Never stored; re-derived on
/// every scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BubbleTag {
    pub speaker: String,
    pub emotion: String,
    pub text: String,
}

impl BubbleTag {
    /// Build a tag from raw fields, normalizing each one.
    pub fn new(speaker: &str, emotion: &str, text: &str) -> Self {
        let emotion = normalize_speaker(emotion);
        Self {
            speaker: normalize_speaker(speaker),
            emotion: if emotion.is_empty() {
                DEFAULT_EMOTION.to_string()
            } else {
                emotion
            },
            text: normalize_utterance(text),
        }
    }

    /// Fingerprint of this tag.
    pub fn key(&self) -> TaskKey {
        task_key(&self.speaker, &self.text)
    }
}

/// A tag region that cannot be turned into a bubble.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TagError {
    #[error("voice tag at {start}..{end} has no speaker")]
    MissingSpeaker { start: usize, end: usize },
}

/// One syntactic occurrence of a tag inside a text run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagMatch<'t> {
    /// Byte range of the whole region (tag header plus utterance).
    pub range: Range<usize>,
    pub speaker: &'t str,
    pub emotion: &'t str,
    pub utterance: &'t str,
}

impl TagMatch<'_> {
    /// Resolve the match into a tag.
    ///
    /// `Ok(None)` means the utterance is still empty, which is how a tag
    /// looks while the renderer is streaming it in; such regions stay as
    /// text.
    pub fn to_tag(&self) -> Result<Option<BubbleTag>, TagError> {
        let tag = BubbleTag::new(self.speaker, self.emotion, self.utterance);
        if tag.speaker.is_empty() {
            return Err(TagError::MissingSpeaker {
                start: self.range.start,
                end: self.range.end,
            });
        }
        if tag.text.is_empty() {
            return Ok(None);
        }
        Ok(Some(tag))
    }
}

/// Compiled tag grammar for one marker keyword.
#[derive(Debug, Clone)]
pub struct TagPattern {
    regex: Regex,
    /// Lowercased `[marker` used for the cheap pre-check.
    needle: String,
}

impl TagPattern {
    /// Compile the grammar for `marker`.
    pub fn new(marker: &str) -> Result<Self, regex::Error> {
        let escaped = regex::escape(marker.trim());
        let regex = Regex::new(&format!(
            r"(?i)\[\s*{escaped}\s*:([^:\]\n]+):([^\]\n]*)\]([^\[\n<]*)"
        ))?;
        Ok(Self {
            regex,
            needle: format!("[{}", marker.trim().to_ascii_lowercase()),
        })
    }

    /// Whether `text` holds at least one tag header.
    ///
    /// Text nodes without a `[` are rejected without touching the regex.
    pub fn might_contain(&self, text: &str) -> bool {
        if !text.contains('[') {
            return false;
        }
        let canonical = text
            .as_bytes()
            .windows(self.needle.len())
            .any(|w| w.eq_ignore_ascii_case(self.needle.as_bytes()));
        canonical || self.regex.is_match(text)
    }

    /// All tag regions in `text`, in order.
    pub fn matches<'t>(&self, text: &'t str) -> impl Iterator<Item = TagMatch<'t>> {
        self.regex.captures_iter(text).filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(TagMatch {
                range: whole.range(),
                speaker: caps.get(1).map_or("", |m| m.as_str()),
                emotion: caps.get(2).map_or("", |m| m.as_str()),
                utterance: caps.get(3).map_or("", |m| m.as_str()),
            })
        })
    }
}

impl Default for TagPattern {
    fn default() -> Self {
        Self::new(DEFAULT_MARKER).expect("default marker compiles")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_tag() {
        let pattern = TagPattern::new("Tag").unwrap();
        let text = "[Tag: Alice:happy] Hello there";
        let found: Vec<_> = pattern.matches(text).collect();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].range, 0..text.len());
        let tag = found[0].to_tag().unwrap().unwrap();
        assert_eq!(tag.speaker, "Alice");
        assert_eq!(tag.emotion, "happy");
        assert_eq!(tag.text, "Hello there");
        assert_eq!(tag.key(), task_key("Alice", "Hello there"));
    }

    #[test]
    fn test_marker_is_case_insensitive() {
        let pattern = TagPattern::default();
        assert!(pattern.might_contain("x [ttsvoice:Bob:sad] hi"));
        assert_eq!(pattern.matches("[ttsvoice:Bob:sad] hi").count(), 1);
    }

    #[test]
    fn test_utterance_stops_at_newline_and_bracket() {
        let pattern = TagPattern::default();
        let text = "[TTSVoice:A:calm] one\n[TTSVoice:B:calm] two [note]";
        let tags: Vec<_> = pattern
            .matches(text)
            .map(|m| m.to_tag().unwrap().unwrap().text)
            .collect();
        assert_eq!(tags, vec!["one", "two"]);
    }

    #[test]
    fn test_empty_utterance_is_incomplete() {
        let pattern = TagPattern::default();
        let m = pattern.matches("[TTSVoice:Alice:happy]   ").next().unwrap();
        assert_eq!(m.to_tag(), Ok(None));
    }

    #[test]
    fn test_blank_speaker_is_malformed() {
        let pattern = TagPattern::default();
        let m = pattern.matches("[TTSVoice: :happy] hi").next().unwrap();
        assert!(matches!(m.to_tag(), Err(TagError::MissingSpeaker { .. })));
    }

    #[test]
    fn test_blank_emotion_defaults() {
        let tag = BubbleTag::new("Alice", "  ", "hi");
        assert_eq!(tag.emotion, "default");
    }

    #[test]
    fn test_prefilter_rejects_plain_text() {
        let pattern = TagPattern::default();
        assert!(!pattern.might_contain("just a message"));
        assert!(!pattern.might_contain(""));
    }

    #[test]
    fn test_marker_is_escaped() {
        let pattern = TagPattern::new("a.b").unwrap();
        assert_eq!(pattern.matches("[axb:S:e] t").count(), 0);
        assert_eq!(pattern.matches("[a.b:S:e] t").count(), 1);
    }
}
