//! Synthesis backend adapters.

mod tts_proxy;

pub use tts_proxy::{TTS_PROXY_PATH, TtsProxyBackend, build_request_url};
