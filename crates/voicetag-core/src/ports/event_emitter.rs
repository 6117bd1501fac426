//! Event emitter trait for engine event broadcasting.
//!
//! Implementations handle transport details (channels, IPC, SSE, etc.).

use tokio::sync::mpsc;

use crate::events::EngineEvent;

/// Trait for emitting engine events.
///
/// # Implementations
///
/// - `NoopEmitter` - For tests and contexts without a listener
/// - `ChannelEmitter` - Forwards into an unbounded tokio channel
pub trait EngineEventEmitter: Send + Sync {
    /// Emit an engine event. Must not block.
    fn emit(&self, event: EngineEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Default)]
pub struct NoopEmitter;

impl NoopEmitter {
    pub const fn new() -> Self {
        Self
    }
}

impl EngineEventEmitter for NoopEmitter {
    fn emit(&self, _event: EngineEvent) {}
}

/// Forwards events into an unbounded channel.
///
/// Events emitted after the receiver is dropped are discarded.
#[derive(Debug, Clone)]
pub struct ChannelEmitter {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl ChannelEmitter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EngineEventEmitter for ChannelEmitter {
    fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_noop_emitter() {
        let emitter: Arc<dyn EngineEventEmitter> = Arc::new(NoopEmitter::new());
        emitter.emit(EngineEvent::info("ignored"));
    }

    #[test]
    fn test_channel_emitter_forwards() {
        let (emitter, mut rx) = ChannelEmitter::new();
        let shared: Arc<dyn EngineEventEmitter> = Arc::new(emitter.clone());
        shared.emit(EngineEvent::info("hello"));
        assert_eq!(rx.try_recv().unwrap(), EngineEvent::info("hello"));
    }

    #[test]
    fn test_channel_emitter_survives_dropped_receiver() {
        let (emitter, rx) = ChannelEmitter::new();
        drop(rx);
        emitter.emit(EngineEvent::info("nobody listening"));
    }
}
