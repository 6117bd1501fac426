//! Bubble widget lifecycle.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Visible state of one bubble widget.
///
/// Stored on the widget as `data-status` and in the render cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BubbleStatus {
    /// No task exists and none was started (auto-generation off, or no binding).
    Waiting,
    /// A generation task is pending for the widget's key.
    Queued,
    /// Audio Memory holds a locator for the key.
    Ready,
    /// The last generation attempt for the key failed.
    Error,
    /// The key is the one currently playing.
    Playing,
}

impl BubbleStatus {
    /// Attribute value for `data-status`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Queued => "queued",
            Self::Ready => "ready",
            Self::Error => "error",
            Self::Playing => "playing",
        }
    }

    /// Whether the widget should show its loading affordance.
    pub const fn is_loading(self) -> bool {
        matches!(self, Self::Queued)
    }

    /// Whether `self -> next` is a legal edge.
    ///
    /// Re-asserting the current state is always allowed; scans repaint
    /// widgets in place. `queued -> playing` covers a click landing between
    /// a completion and the state-sync pass that would have shown `ready`.
    pub const fn can_transition_to(self, next: Self) -> bool {
        use BubbleStatus::{Error, Playing, Queued, Ready, Waiting};
        if self as u8 == next as u8 {
            return true;
        }
        matches!(
            (self, next),
            (Waiting, Queued | Ready | Error)
                | (Queued, Ready | Error | Waiting | Playing)
                | (Ready, Playing | Queued | Waiting)
                | (Playing, Ready | Queued | Error)
                | (Error, Queued | Waiting | Ready)
        )
    }

    /// Checked transition.
    pub const fn transition(self, next: Self) -> Result<Self, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for BubbleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BubbleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(Self::Waiting),
            "queued" => Ok(Self::Queued),
            "ready" => Ok(Self::Ready),
            "error" => Ok(Self::Error),
            "playing" => Ok(Self::Playing),
            other => Err(format!("unknown bubble status: {other}")),
        }
    }
}

/// Illegal lifecycle edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal bubble transition {from} -> {to}")]
pub struct TransitionError {
    pub from: BubbleStatus,
    pub to: BubbleStatus,
}
