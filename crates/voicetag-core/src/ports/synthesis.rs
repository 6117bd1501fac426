//! Synthesis backend port.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ports::bindings::VoiceBinding;

/// Handle to a generated audio clip (a URL or an object reference).
///
/// Opaque to the engine; only the backend and the player interpret it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AudioLocator(String);

impl AudioLocator {
    pub fn new(locator: impl Into<String>) -> Self {
        Self(locator.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AudioLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One synthesis job as seen by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisRequest {
    pub speaker: String,
    pub emotion: String,
    pub text: String,
    /// Voice binding resolved for `speaker` at dispatch time.
    pub binding: VoiceBinding,
}

/// Errors a synthesis backend can report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SynthesisError {
    /// Backend could not be reached.
    #[error("synthesis backend unreachable: {0}")]
    Transport(String),

    /// The request did not finish within the configured timeout.
    #[error("synthesis timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Backend answered with something that is not audio.
    #[error("invalid synthesis response: {0}")]
    InvalidResponse(String),

    /// Backend refused the request.
    #[error("synthesis rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// No voice binding exists for the speaker.
    #[error("no voice binding for speaker {0:?}")]
    MissingBinding(String),

    /// The backend configuration cannot produce a request.
    #[error("synthesis backend misconfigured: {0}")]
    Misconfigured(String),
}

impl SynthesisError {
    /// Transient failures are retried by the scheduler; the rest are final.
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout { .. } => true,
            Self::Rejected { status, .. } => *status >= 500,
            Self::InvalidResponse(_) | Self::MissingBinding(_) | Self::Misconfigured(_) => false,
        }
    }
}

/// A speech synthesis engine.
///
/// Implementations must be safe to call concurrently; the scheduler bounds
/// how many calls are in flight.
#[async_trait]
pub trait SynthesisBackend: Send + Sync {
    /// Produce audio for one utterance.
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioLocator, SynthesisError>;

    /// Release a locator the engine no longer references.
    fn release(&self, _locator: &AudioLocator) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(SynthesisError::Transport("refused".into()).is_transient());
        assert!(SynthesisError::Timeout { secs: 120 }.is_transient());
        assert!(
            SynthesisError::Rejected {
                status: 503,
                message: "busy".into()
            }
            .is_transient()
        );
        assert!(
            !SynthesisError::Rejected {
                status: 400,
                message: "bad".into()
            }
            .is_transient()
        );
        assert!(!SynthesisError::MissingBinding("Alice".into()).is_transient());
        assert!(!SynthesisError::Misconfigured("bad url".into()).is_transient());
    }

    #[test]
    fn test_locator_serializes_as_string() {
        let loc = AudioLocator::new("blob:abc");
        assert_eq!(serde_json::to_string(&loc).unwrap(), "\"blob:abc\"");
    }
}
