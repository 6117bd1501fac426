//! Common test utilities.
//!
//! Backends with scripted behaviour, voice bindings and page builders shared
//! by the engine integration tests. Nothing here touches the network.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use voicetag_core::{
    AudioLocator, AudioPlayer, EngineEventEmitter, PlaybackError, ReferenceAudio, Settings,
    StaticBindings, SynthesisBackend, SynthesisError, SynthesisRequest, VoiceBinding,
    VoiceBindings,
};
use voicetag_engine::{
    BubbleEngine, Document, EngineConfig, EngineDeps, Element, Node, Page, ScannerConfig,
    build_engine,
};

// ── Backends ───────────────────────────────────────────────────────

/// Resolves every request immediately to `blob://{text}`.
#[derive(Default)]
pub struct EchoBackend {
    calls: AtomicUsize,
}

impl EchoBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SynthesisBackend for EchoBackend {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioLocator, SynthesisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(AudioLocator::new(format!("blob://{}", request.text)))
    }
}

/// Fails every request with the same error.
pub struct FailingBackend {
    error: SynthesisError,
    calls: AtomicUsize,
}

impl FailingBackend {
    pub fn new(error: SynthesisError) -> Self {
        Self {
            error,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SynthesisBackend for FailingBackend {
    async fn synthesize(&self, _request: &SynthesisRequest) -> Result<AudioLocator, SynthesisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

/// Holds call `n` (1-based) until [`GatedBackend::open`] is called for it,
/// then resolves to `blob://gen{n}`.
#[derive(Default)]
pub struct GatedBackend {
    calls: AtomicUsize,
    gates: Mutex<HashMap<usize, Arc<Notify>>>,
    released: Mutex<Vec<AudioLocator>>,
}

impl GatedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Let call `n` finish. May be called before the call starts.
    pub fn open(&self, n: usize) {
        self.gate(n).notify_one();
    }

    /// Locators handed back through `release`.
    pub fn released(&self) -> Vec<AudioLocator> {
        self.released.lock().unwrap().clone()
    }

    pub async fn wait_for_calls(&self, n: usize) {
        wait_until(|| self.calls() >= n).await;
    }

    fn gate(&self, n: usize) -> Arc<Notify> {
        Arc::clone(self.gates.lock().unwrap().entry(n).or_default())
    }
}

#[async_trait]
impl SynthesisBackend for GatedBackend {
    async fn synthesize(&self, _request: &SynthesisRequest) -> Result<AudioLocator, SynthesisError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.gate(n).notified().await;
        Ok(AudioLocator::new(format!("blob://gen{n}")))
    }

    fn release(&self, locator: &AudioLocator) {
        self.released.lock().unwrap().push(locator.clone());
    }
}

// ── Player ─────────────────────────────────────────────────────────

/// Records `start <locator>` and `stop` calls; revoked and unplugged
/// locators fail.
#[derive(Default)]
pub struct RecordingPlayer {
    log: Mutex<Vec<String>>,
    revoked: Mutex<HashSet<String>>,
    unplugged: Mutex<HashSet<String>>,
}

impl RecordingPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn revoke(&self, locator: &str) {
        self.revoked.lock().unwrap().insert(locator.to_string());
    }

    /// Fail `start` for `locator` with a device error.
    pub fn unplug(&self, locator: &str) {
        self.unplugged.lock().unwrap().insert(locator.to_string());
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

impl AudioPlayer for RecordingPlayer {
    fn start(&self, locator: &AudioLocator) -> Result<(), PlaybackError> {
        if self.revoked.lock().unwrap().contains(locator.as_str()) {
            return Err(PlaybackError::Revoked(locator.clone()));
        }
        if self.unplugged.lock().unwrap().contains(locator.as_str()) {
            return Err(PlaybackError::Device("output unplugged".to_string()));
        }
        self.log.lock().unwrap().push(format!("start {locator}"));
        Ok(())
    }

    fn stop(&self) {
        self.log.lock().unwrap().push("stop".to_string());
    }
}

// ── Bindings ───────────────────────────────────────────────────────

pub fn binding() -> VoiceBinding {
    VoiceBinding {
        text_lang: "en".to_string(),
        references: vec![ReferenceAudio {
            emotion: "default".to_string(),
            path: "/refs/default.wav".to_string(),
            prompt_text: "hello".to_string(),
            prompt_lang: "en".to_string(),
        }],
    }
}

/// Bindings for Alice and Bob.
pub fn bindings() -> Arc<StaticBindings> {
    Arc::new(
        StaticBindings::new()
            .with("Alice", binding())
            .with("Bob", binding()),
    )
}

// ── Pages ──────────────────────────────────────────────────────────

/// A chat message container holding one text run.
pub fn message(text: &str) -> Element {
    Element::new("div").with_class("mes_text").with_text(text)
}

pub fn chat(messages: &[&str]) -> Document {
    Document::with_body(messages.iter().map(|m| message(m)))
}

/// Every bubble element in document order.
pub fn bubbles(doc: &Document) -> Vec<Element> {
    let mut out = Vec::new();
    doc.body.walk(&mut |element| {
        if element.has_class("voice-bubble") {
            out.push(element.clone());
        }
    });
    out
}

/// Text runs directly under message containers and paragraphs.
pub fn raw_text(doc: &Document) -> String {
    let mut out = String::new();
    doc.body.walk(&mut |element| {
        if !element.has_class("mes_text") && element.tag != "p" {
            return;
        }
        for child in &element.children {
            if let Node::Text(t) = child {
                out.push_str(t);
            }
        }
    });
    out
}

// ── Engines ────────────────────────────────────────────────────────

/// Engine configuration using the short `Tag` marker.
pub fn tag_config() -> EngineConfig {
    EngineConfig::default()
        .with_scanner(ScannerConfig::default().with_marker("Tag"))
        .with_relay_retry_delay(Duration::from_millis(200))
}

pub fn iframe_settings() -> Settings {
    Settings {
        iframe_mode: true,
        ..Settings::default()
    }
}

/// Build an engine over `page` with the `Tag` marker.
pub fn engine(
    page: Page,
    backend: Arc<dyn SynthesisBackend>,
    bindings: Arc<dyn VoiceBindings>,
    player: Arc<dyn AudioPlayer>,
    emitter: Arc<dyn EngineEventEmitter>,
    settings: Settings,
) -> Arc<BubbleEngine> {
    let deps = EngineDeps::new(backend, bindings)
        .with_player(player)
        .with_emitter(emitter)
        .with_settings(settings)
        .with_config(tag_config());
    build_engine(deps, page).unwrap()
}

// ── Polling ────────────────────────────────────────────────────────

/// Poll `condition` every few milliseconds for up to two seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met within timeout");
}
