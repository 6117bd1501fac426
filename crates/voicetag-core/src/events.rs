//! Canonical event union emitted by the bubble engine.
//!
//! Hosts subscribe through an [`EngineEventEmitter`](crate::ports::EngineEventEmitter)
//! to drive notifications, context menus and voice-binding dialogs.
//!
//! # Wire Format
//!
//! Events are serialized with a `type` tag:
//!
//! ```json
//! { "type": "generation_failed", "key": "9f86d08...", "error": "backend unreachable" }
//! ```

use serde::{Deserialize, Serialize};

use crate::key::TaskKey;

/// Severity of a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// Events for all adapters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    // ========== Generation ==========
    /// A new generation task entered the pending set.
    TaskEnqueued {
        key: TaskKey,
        speaker: String,
    },

    /// Audio for the key landed in Audio Memory.
    GenerationCompleted {
        key: TaskKey,
    },

    /// The generation task for the key failed terminally.
    GenerationFailed {
        key: TaskKey,
        error: String,
    },

    /// A bubble was activated for a speaker without a voice binding.
    BindingRequired {
        speaker: String,
    },

    // ========== Playback ==========
    PlaybackStarted {
        key: TaskKey,
    },

    PlaybackStopped {
        key: TaskKey,
    },

    // ========== Interaction ==========
    /// Secondary-click on a bubble. Coordinates are in main-document space.
    MenuRequested {
        key: TaskKey,
        x: f64,
        y: f64,
    },

    /// A relayed frame click found no matching widget after its retry.
    RelayDropped {
        key: TaskKey,
    },

    /// Free-form notification for the host UI.
    Notification {
        level: NotificationLevel,
        message: String,
    },
}

impl EngineEvent {
    /// Key the event refers to, if any.
    pub const fn key(&self) -> Option<&TaskKey> {
        match self {
            Self::TaskEnqueued { key, .. }
            | Self::GenerationCompleted { key }
            | Self::GenerationFailed { key, .. }
            | Self::PlaybackStarted { key }
            | Self::PlaybackStopped { key }
            | Self::MenuRequested { key, .. }
            | Self::RelayDropped { key } => Some(key),
            Self::BindingRequired { .. } | Self::Notification { .. } => None,
        }
    }

    /// Shorthand for an info notification.
    pub fn info(message: impl Into<String>) -> Self {
        Self::Notification {
            level: NotificationLevel::Info,
            message: message.into(),
        }
    }

    /// Shorthand for a warning notification.
    pub fn warning(message: impl Into<String>) -> Self {
        Self::Notification {
            level: NotificationLevel::Warning,
            message: message.into(),
        }
    }
}
