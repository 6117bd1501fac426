//! Command handlers.

pub mod key;
pub mod render;
