//! Fingerprint keyer.
//!
//! A [`TaskKey`] is the join surface between the scanner, the scheduler,
//! Audio Memory and the render cache. It is derived from the speaker and the
//! normalized utterance only: presentation whitespace and markup remnants
//! left behind by the chat renderer never change the key.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Inline markup and escaped-markup remnants (`<b>`, `&lt;i&gt;`).
static MARKUP_REMNANT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<[^>]+>|&lt;[^&]+&gt;").expect("markup remnant pattern is valid")
});

/// Separates speaker from text in the hashed payload so that
/// `("ab", "c")` and `("a", "bc")` never collide.
const FIELD_SEPARATOR: char = '\u{1f}';

/// Stable deduplication key for one utterance of one speaker.
///
/// Hex-encoded SHA-256 of the normalized `(speaker, text)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskKey(String);

impl TaskKey {
    /// Wrap an already-computed key (e.g. read back from a `data-key` attribute).
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The hex representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix for log lines.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute the fingerprint key for `(speaker, text)`.
///
/// Pure and deterministic; both inputs are normalized first.
pub fn task_key(speaker: &str, text: &str) -> TaskKey {
    let speaker = normalize_speaker(speaker);
    let text = normalize_utterance(text);

    let mut hasher = Sha256::new();
    hasher.update(speaker.as_bytes());
    let mut sep = [0u8; 4];
    hasher.update(FIELD_SEPARATOR.encode_utf8(&mut sep).as_bytes());
    hasher.update(text.as_bytes());
    TaskKey(format!("{:x}", hasher.finalize()))
}

/// Normalize a speaker name: trim and collapse inner whitespace runs.
pub fn normalize_speaker(speaker: &str) -> String {
    collapse_whitespace(speaker)
}

/// Normalize an utterance: strip markup remnants, trim, and collapse inner
/// whitespace runs to a single space.
pub fn normalize_utterance(text: &str) -> String {
    let stripped = MARKUP_REMNANT.replace_all(text, "");
    collapse_whitespace(&stripped)
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
