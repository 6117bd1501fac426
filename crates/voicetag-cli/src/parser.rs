//! Main CLI parser.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Default `tts_proxy` server.
pub const DEFAULT_SERVER: &str = "http://127.0.0.1:9880";

#[derive(Parser)]
#[command(name = "voicetag")]
#[command(about = "Render voice tags in chat transcripts as voice bubbles")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the fingerprint key for a speaker and utterance
    Key {
        speaker: String,
        text: String,
    },
    /// Render a transcript file, generating audio for every tag
    Render(RenderArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RenderArgs {
    /// Transcript file, one chat message per line
    pub transcript: PathBuf,

    /// JSON object mapping speaker names to voice bindings
    #[arg(long)]
    pub bindings: Option<PathBuf>,

    /// JSON settings file
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Base URL of the `tts_proxy` server
    #[arg(long, env = "VOICETAG_SERVER", default_value = DEFAULT_SERVER)]
    pub server: String,

    /// Tag marker keyword
    #[arg(long, default_value = voicetag_core::DEFAULT_MARKER)]
    pub marker: String,

    /// Place the transcript inside one embedded frame
    #[arg(long)]
    pub frame: bool,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 120)]
    pub timeout_secs: u64,

    /// Generations allowed in flight at once
    #[arg(long, default_value_t = 1)]
    pub parallel: usize,
}
