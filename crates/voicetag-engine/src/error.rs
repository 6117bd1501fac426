//! Engine error types.

use thiserror::Error;
use voicetag_core::{PlaybackError, SettingsError, TagError, TaskKey, TransitionError};

use crate::dom::{DocumentTarget, FrameId};

/// A per-region or per-frame scan failure. Logged and collected; never
/// aborts the rest of the scan.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("malformed voice tag in {target}: {source}")]
    MalformedTag {
        target: DocumentTarget,
        #[source]
        source: TagError,
    },

    #[error("{0} is not reachable")]
    FrameUnavailable(FrameId),

    #[error("widget for {key} in {target} rejected repaint: {source}")]
    IllegalTransition {
        target: DocumentTarget,
        key: TaskKey,
        #[source]
        source: TransitionError,
    },
}

/// Cross-boundary relay failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    #[error("{0} is not reachable")]
    FrameUnavailable(FrameId),

    #[error("no bubble for {key} in {target}")]
    WidgetNotFound { target: DocumentTarget, key: TaskKey },

    #[error("relay channel closed")]
    ChannelClosed,
}

/// Errors surfaced by [`BubbleEngine`](crate::BubbleEngine) operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid marker keyword: {0}")]
    InvalidMarker(#[from] regex::Error),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),

    #[error("{0} is not reachable")]
    DocumentUnavailable(DocumentTarget),

    #[error("no bubble for {0}")]
    WidgetNotFound(TaskKey),
}
