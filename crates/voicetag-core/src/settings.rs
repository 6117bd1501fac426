//! Engine settings and validation.
//!
//! Pure domain types; persistence belongs to whichever host embeds the
//! engine.

use serde::{Deserialize, Serialize};

/// Visual theme applied when no other style is configured.
pub const DEFAULT_BUBBLE_STYLE: &str = "default";

/// User-facing settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Master switch. When off, scans leave documents untouched.
    pub enabled: bool,

    /// Enqueue generation as soon as a bubble is discovered.
    pub auto_generate: bool,

    /// Also scan embedded frame documents.
    pub iframe_mode: bool,

    /// Theme name written to `data-bubble-style` on every scanned body.
    pub bubble_style: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_generate: true,
            iframe_mode: false,
            bubble_style: DEFAULT_BUBBLE_STYLE.to_string(),
        }
    }
}

impl Settings {
    /// Merge a partial update, only touching fields that are `Some`.
    pub fn merge(&mut self, other: &SettingsUpdate) {
        if let Some(enabled) = other.enabled {
            self.enabled = enabled;
        }
        if let Some(auto) = other.auto_generate {
            self.auto_generate = auto;
        }
        if let Some(iframe) = other.iframe_mode {
            self.iframe_mode = iframe;
        }
        if let Some(ref style) = other.bubble_style {
            self.bubble_style.clone_from(style);
        }
    }
}

/// Partial settings update. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SettingsUpdate {
    pub enabled: Option<bool>,
    pub auto_generate: Option<bool>,
    pub iframe_mode: Option<bool>,
    pub bubble_style: Option<String>,
}

impl SettingsUpdate {
    /// Whether applying this update should trigger a waiting-bubble sweep.
    pub const fn enables_generation(&self) -> bool {
        matches!(self.auto_generate, Some(true)) || matches!(self.enabled, Some(true))
    }
}

/// Settings validation error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("Bubble style cannot be empty")]
    EmptyBubbleStyle,

    #[error("Bubble style must be a bare token, got {0:?}")]
    InvalidBubbleStyle(String),
}

/// Validate settings values.
pub fn validate_settings(settings: &Settings) -> Result<(), SettingsError> {
    let style = settings.bubble_style.as_str();
    if style.trim().is_empty() {
        return Err(SettingsError::EmptyBubbleStyle);
    }
    // Written verbatim into an attribute and a CSS selector
    if style
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '<' | '>' | '&'))
    {
        return Err(SettingsError::InvalidBubbleStyle(style.to_string()));
    }
    Ok(())
}
