//! Voice-bubble engine.
//!
//! Scans a continuously re-rendered text tree for inline voice tags,
//! replaces them with bubble widgets, deduplicates synthesis work by
//! content fingerprint, and keeps every widget in step with generation
//! results, across the main document and its embedded frames.
//!
//! - `dom` - text-tree model with a mutation journal
//! - `state` - Audio Memory and Render Cache
//! - `scheduler` - Pending Task Set and the generation runner
//! - `scanner` - tag scanning and bubble markup
//! - `sync` - state-sync pass and widget queries
//! - `watcher` - mutation-driven scan triggering
//! - `playback` - the single playback authority
//! - `relay` - frame-to-main messaging
//! - `backend` - HTTP synthesis backend
//! - `engine` - composition root

#![deny(unused_crate_dependencies)]

pub mod backend;
pub mod config;
pub mod dom;
mod engine;
pub mod error;
pub mod playback;
pub mod relay;
pub mod scanner;
pub mod scheduler;
pub mod state;
pub mod sync;
pub mod watcher;

// Re-export core types for convenience
pub use voicetag_core::{
    AudioLocator, BubbleStatus, BubbleTag, EngineEvent, Settings, SettingsUpdate, TaskKey,
    task_key,
};

pub use backend::{TtsProxyBackend, build_request_url};
pub use config::{EngineConfig, RetryPolicy, ScannerConfig, SchedulerConfig};
pub use dom::{Document, DocumentTarget, Element, FrameId, MutationKind, Node, Page, Point, Rect};
pub use engine::{Activation, BubbleEngine, EngineDeps, build_engine};
pub use error::{EngineError, RelayError, ScanError};
pub use scanner::{ScanReport, TagScanner};
pub use scheduler::{EnqueueOutcome, KeyState, Scheduler};
pub use sync::SyncReport;
pub use watcher::WatchOutcome;

#[cfg(test)]
use serde_json as _;
#[cfg(test)]
use tokio_test as _;
