//! Command-line front end for the voice-bubble engine.
//!
//! - `parser` - argument definitions
//! - `config` - bindings and settings files
//! - `transcript` - transcript to page conversion
//! - `handlers` - one module per command

#![deny(unused_crate_dependencies)]

// Used by main.rs only
use dotenvy as _;
use tokio as _;
use tracing_subscriber as _;

pub mod config;
pub mod handlers;
pub mod parser;
pub mod transcript;

pub use parser::{Cli, Commands, RenderArgs};
