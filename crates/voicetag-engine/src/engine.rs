//! Bubble engine: the composition root.
//!
//! Owns the page and wires scanner, scheduler, watcher, state-sync,
//! playback and relay together.
//!
//! # Concurrency Model
//!
//! - Tree work (scan, sync, repaint) runs synchronously under the page lock
//! - Suspension points are the scheduler's backend calls and the relay's
//!   single deferred retry
//! - Lock order: page → render cache → pending set → audio memory; the
//!   playback slot is never held while taking the page lock

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use voicetag_core::{
    AudioPlayer, BubbleStatus, EngineEvent, EngineEventEmitter, NoopEmitter, NullPlayer,
    PlaybackError, RelayMessage, Settings, SettingsUpdate, SynthesisBackend, TaskKey,
    VoiceBindings, validate_settings,
};

use crate::config::EngineConfig;
use crate::dom::{Document, DocumentTarget, MutationKind, Page, Point};
use crate::error::EngineError;
use crate::playback::{PlayFailure, PlaybackAuthority};
use crate::relay::{Relay, RelayEnvelope, translate_point};
use crate::scanner::markup::BubbleView;
use crate::scanner::{ScanContext, ScanReport, TagScanner};
use crate::scheduler::{EnqueueOutcome, KeyState, Scheduler};
use crate::state::SessionState;
use crate::sync::{self, SyncReport, find_widget, find_widget_in, widgets_in_state};
use crate::watcher::{ChangeWatcher, WatchOutcome};

/// Everything the engine needs from its host.
pub struct EngineDeps {
    pub backend: Arc<dyn SynthesisBackend>,
    pub bindings: Arc<dyn VoiceBindings>,
    pub player: Arc<dyn AudioPlayer>,
    pub emitter: Arc<dyn EngineEventEmitter>,
    pub settings: Settings,
    pub config: EngineConfig,
}

impl EngineDeps {
    /// Dependencies with a silent player, no event listener and defaults.
    pub fn new(backend: Arc<dyn SynthesisBackend>, bindings: Arc<dyn VoiceBindings>) -> Self {
        Self {
            backend,
            bindings,
            player: Arc::new(NullPlayer),
            emitter: Arc::new(NoopEmitter::new()),
            settings: Settings::default(),
            config: EngineConfig::default(),
        }
    }

    #[must_use]
    pub fn with_player(mut self, player: Arc<dyn AudioPlayer>) -> Self {
        self.player = player;
        self
    }

    #[must_use]
    pub fn with_emitter(mut self, emitter: Arc<dyn EngineEventEmitter>) -> Self {
        self.emitter = emitter;
        self
    }

    #[must_use]
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }
}

/// Build an engine around `page`.
pub fn build_engine(deps: EngineDeps, page: Page) -> Result<Arc<BubbleEngine>, EngineError> {
    validate_settings(&deps.settings)?;
    let scanner = TagScanner::new(deps.config.scanner.clone())?;
    let state = Arc::new(SessionState::new(deps.settings));
    let scheduler = Arc::new(Scheduler::new(
        Arc::clone(&state),
        deps.backend,
        deps.bindings,
        Arc::clone(&deps.emitter),
        deps.config.scheduler,
    ));

    Ok(Arc::new(BubbleEngine {
        state,
        scheduler,
        scanner,
        watcher: ChangeWatcher::new(deps.config.max_scan_passes),
        playback: PlaybackAuthority::new(deps.player, Arc::clone(&deps.emitter)),
        relay: Relay::new(),
        page: Mutex::new(page),
        emitter: deps.emitter,
        relay_retry_delay: deps.config.relay_retry_delay,
        started: AtomicBool::new(false),
        cancel: CancellationToken::new(),
    }))
}

/// What activating a bubble did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// Playback started for the key.
    Played,
    /// The key was playing and has been stopped.
    Stopped,
    /// Generation is still pending.
    StillGenerating,
    /// Generation was (re)requested.
    Enqueued,
    /// The speaker has no voice binding.
    BindingRequired,
    /// The stored audio was revoked; generation restarted.
    Regenerating,
    /// The click was posted to the main side.
    Relayed,
}

pub struct BubbleEngine {
    state: Arc<SessionState>,
    scheduler: Arc<Scheduler>,
    scanner: TagScanner,
    watcher: ChangeWatcher,
    playback: PlaybackAuthority,
    relay: Relay,
    /// Lock order: acquire before any session state lock.
    page: Mutex<Page>,
    emitter: Arc<dyn EngineEventEmitter>,
    relay_retry_delay: Duration,
    started: AtomicBool,
    cancel: CancellationToken,
}

impl BubbleEngine {
    // ── Lifecycle ───────────────────────────────────────────────────────────

    /// Start the scheduler runner, the completion listener and the relay
    /// consumer. Idempotent.
    pub fn start(self: &Arc<Self>) {
        if self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        self.scheduler.run();

        let engine = Arc::clone(self);
        let completions = self.scheduler.subscribe_completions();
        tokio::spawn(async move { engine.completion_loop(completions).await });

        if let Some(rx) = self.relay.take_receiver() {
            let engine = Arc::clone(self);
            tokio::spawn(async move { engine.relay_loop(rx).await });
        }
        info!(target: "voicetag.engine", "Bubble engine started");
    }

    /// Stop every background task.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.scheduler.shutdown();
        info!(target: "voicetag.engine", "Bubble engine stopped");
    }

    // ── Tree entry points ───────────────────────────────────────────────────

    /// Renderer entry point: edit one document, then let the watcher rescan.
    pub fn mutate<R>(
        &self,
        target: DocumentTarget,
        kind: MutationKind,
        edit: impl FnOnce(&mut Document) -> R,
    ) -> Result<R, EngineError> {
        let mut page = self.page_lock();
        let result = page
            .edit(target, kind, edit)
            .ok_or(EngineError::DocumentUnavailable(target))?;
        self.pump(&mut page);
        Ok(result)
    }

    /// Forced full scan. Returns the report of the first pass.
    pub fn scan(&self) -> ScanReport {
        let mut page = self.page_lock();
        let playing = self.playback.now_playing();
        let report = self.scanner.scan(&mut page, &self.context(playing.as_ref()));
        self.pump(&mut page);
        report
    }

    /// Repaint every `queued` widget whose task has resolved.
    pub fn sync_states(&self) -> SyncReport {
        let mut page = self.page_lock();
        let playing = self.playback.now_playing();
        let report = sync::sync_states(&mut page, &self.context(playing.as_ref()));
        self.pump(&mut page);
        report
    }

    /// Wait for the Pending Task Set to drain, then sync widget states.
    pub async fn settle(&self) -> SyncReport {
        self.scheduler.run();
        self.scheduler.wait_idle().await;
        self.sync_states()
    }

    /// Enqueue every `waiting` widget already in the tree.
    pub fn schedule_waiting(&self) -> usize {
        if !self.state.settings().enabled {
            return 0;
        }
        let waiting = widgets_in_state(&self.page_lock(), BubbleStatus::Waiting);
        let mut seen = HashSet::new();
        let mut enqueued = 0;
        for (_, view) in waiting {
            if !seen.insert(view.key.clone()) {
                continue;
            }
            let outcome = self.scheduler.enqueue_tag(&view.tag());
            if outcome == EnqueueOutcome::Enqueued {
                enqueued += 1;
            }
            if outcome.status() != BubbleStatus::Waiting {
                self.repaint(&view.key, outcome.status());
            }
        }
        if enqueued > 0 {
            info!(target: "voicetag.engine", enqueued, "Scheduled waiting bubbles");
        }
        enqueued
    }

    // ── Interaction ─────────────────────────────────────────────────────────

    /// A click on the widget for `key` inside `target`.
    ///
    /// Main-document clicks act directly; frame clicks travel through the
    /// relay.
    pub fn click(&self, target: DocumentTarget, key: &TaskKey) -> Result<Activation, EngineError> {
        match target {
            DocumentTarget::Main => {
                let view = find_widget_in(&self.page_lock(), target, key)
                    .ok_or_else(|| EngineError::WidgetNotFound(key.clone()))?;
                self.activate(&view)
            }
            DocumentTarget::Frame(frame) => {
                self.relay.frame_click(&self.page_lock(), frame, key)?;
                Ok(Activation::Relayed)
            }
        }
    }

    /// A secondary click at `client` (viewport of `target`).
    ///
    /// Returns the point in main-document space and emits `MenuRequested`.
    pub fn context_menu(
        &self,
        target: DocumentTarget,
        key: &TaskKey,
        client: Point,
    ) -> Result<Point, EngineError> {
        let point = {
            let page = self.page_lock();
            if page.document(target).is_none() {
                return Err(EngineError::DocumentUnavailable(target));
            }
            if find_widget_in(&page, target, key).is_none() {
                return Err(EngineError::WidgetNotFound(key.clone()));
            }
            match target {
                DocumentTarget::Main => client,
                DocumentTarget::Frame(id) => {
                    let frame = page
                        .frame(id)
                        .ok_or(EngineError::DocumentUnavailable(target))?;
                    translate_point(frame.rect, client)
                }
            }
        };
        self.emitter.emit(EngineEvent::MenuRequested {
            key: key.clone(),
            x: point.x,
            y: point.y,
        });
        Ok(point)
    }

    /// Throw away the audio for `key` and generate it again.
    pub fn regenerate(&self, key: &TaskKey) -> Result<EnqueueOutcome, EngineError> {
        let (_, view) = find_widget(&self.page_lock(), key)
            .ok_or_else(|| EngineError::WidgetNotFound(key.clone()))?;
        if self.playback.now_playing().as_ref() == Some(key) {
            self.playback.stop();
        }

        let mut page = self.page_lock();
        self.state.render().remove(key);
        let outcome = self.scheduler.regenerate(&view.tag());
        if outcome == EnqueueOutcome::MissingBinding {
            self.emitter.emit(EngineEvent::BindingRequired {
                speaker: view.speaker.clone(),
            });
        }
        sync::repaint_key(&mut page, &self.state, key, outcome.status(), None);
        self.pump(&mut page);
        Ok(outcome)
    }

    /// The player reached the end of `key`.
    pub fn playback_finished(&self, key: &TaskKey) -> bool {
        if !self.playback.finished(key) {
            return false;
        }
        self.repaint(key, BubbleStatus::Ready);
        true
    }

    /// Merge and validate a settings update, then rescan as needed.
    pub fn apply_settings(&self, update: &SettingsUpdate) -> Result<Settings, EngineError> {
        let previous = self.state.settings();
        let mut next = previous.clone();
        next.merge(update);
        validate_settings(&next)?;
        self.state.set_settings(next.clone());
        info!(
            target: "voicetag.engine",
            enabled = next.enabled,
            auto_generate = next.auto_generate,
            iframe_mode = next.iframe_mode,
            bubble_style = %next.bubble_style,
            "Settings applied"
        );

        let rescan = (next.enabled && !previous.enabled)
            || (next.iframe_mode && !previous.iframe_mode)
            || next.bubble_style != previous.bubble_style;
        if rescan {
            self.scan();
        }
        if next.auto_generate && update.enables_generation() {
            self.schedule_waiting();
        }
        Ok(next)
    }

    // ── Accessors ───────────────────────────────────────────────────────────

    /// Snapshot of the page.
    pub fn page(&self) -> Page {
        self.page_lock().clone()
    }

    /// Read the page without cloning it.
    pub fn with_page<R>(&self, f: impl FnOnce(&Page) -> R) -> R {
        f(&self.page_lock())
    }

    pub fn settings(&self) -> Settings {
        self.state.settings()
    }

    pub fn now_playing(&self) -> Option<TaskKey> {
        self.playback.now_playing()
    }

    pub const fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub const fn state(&self) -> &Arc<SessionState> {
        &self.state
    }

    pub const fn relay(&self) -> &Relay {
        &self.relay
    }

    // ── Internals ───────────────────────────────────────────────────────────

    fn page_lock(&self) -> MutexGuard<'_, Page> {
        self.page.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn context<'a>(&'a self, playing: Option<&'a TaskKey>) -> ScanContext<'a> {
        ScanContext {
            state: &self.state,
            scheduler: &self.scheduler,
            playing,
        }
    }

    /// Route journaled mutations through the watcher.
    fn pump(&self, page: &mut Page) -> WatchOutcome {
        let mutations = page.take_mutations();
        let playing = self.playback.now_playing();
        let ctx = self.context(playing.as_ref());
        self.watcher.observe(&mutations, || {
            self.scanner.scan(page, &ctx);
            page.take_mutations()
        })
    }

    /// Repaint every widget for `key` as `status`, with its stored locator.
    fn repaint(&self, key: &TaskKey, status: BubbleStatus) -> SyncReport {
        let locator = match status {
            BubbleStatus::Ready | BubbleStatus::Playing => {
                self.scheduler.lookup(key).locator().cloned()
            }
            _ => None,
        };
        let mut page = self.page_lock();
        let report = sync::repaint_key(&mut page, &self.state, key, status, locator.as_ref());
        self.pump(&mut page);
        report
    }

    /// Act on a widget according to what the scheduler knows about its key.
    fn activate(&self, view: &BubbleView) -> Result<Activation, EngineError> {
        let key = &view.key;
        match self.scheduler.lookup(key) {
            KeyState::Resolved(locator) => {
                if self.playback.now_playing().as_ref() == Some(key) {
                    self.playback.stop();
                    self.repaint(key, BubbleStatus::Ready);
                    return Ok(Activation::Stopped);
                }
                match self.playback.play(key, &locator) {
                    Ok(previous) => {
                        if let Some(previous) = previous {
                            self.repaint(&previous, BubbleStatus::Ready);
                        }
                        self.repaint(key, BubbleStatus::Playing);
                        Ok(Activation::Played)
                    }
                    Err(PlayFailure { stopped, error }) => {
                        if let Some(stopped) = stopped {
                            self.repaint(&stopped, BubbleStatus::Ready);
                        }
                        if let PlaybackError::Revoked(stale) = &error {
                            warn!(
                                target: "voicetag.playback",
                                key = %key.short(),
                                locator = %stale,
                                "Audio revoked, regenerating"
                            );
                            self.regenerate(key)?;
                            return Ok(Activation::Regenerating);
                        }
                        self.emitter
                            .emit(EngineEvent::warning(format!("Playback failed: {error}")));
                        Err(error.into())
                    }
                }
            }
            KeyState::Pending => {
                self.emitter
                    .emit(EngineEvent::info("Voice is still being generated"));
                Ok(Activation::StillGenerating)
            }
            KeyState::Failed | KeyState::Unknown => match self.scheduler.retry(&view.tag()) {
                EnqueueOutcome::MissingBinding => {
                    self.emitter.emit(EngineEvent::BindingRequired {
                        speaker: view.speaker.clone(),
                    });
                    Ok(Activation::BindingRequired)
                }
                outcome => {
                    self.repaint(key, outcome.status());
                    Ok(Activation::Enqueued)
                }
            },
        }
    }

    async fn completion_loop(
        self: Arc<Self>,
        mut completions: tokio::sync::broadcast::Receiver<crate::scheduler::Completion>,
    ) {
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                received = completions.recv() => match received {
                    Ok(_) | Err(RecvError::Lagged(_)) => {
                        self.sync_states();
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
    }

    async fn relay_loop(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<RelayEnvelope>) {
        loop {
            let envelope = tokio::select! {
                () = self.cancel.cancelled() => break,
                received = rx.recv() => match received {
                    Some(envelope) => envelope,
                    None => break,
                },
            };
            let engine = Arc::clone(&self);
            tokio::spawn(async move { engine.handle_relayed(envelope).await });
        }
    }

    /// Main-side handling of a relayed click: retry exactly once when no
    /// live widget backs the key yet, then fall back to the payload.
    async fn handle_relayed(&self, envelope: RelayEnvelope) {
        let key = envelope.message.key().clone();
        if self.deliver(&key) {
            return;
        }
        debug!(
            target: "voicetag.relay",
            from = %envelope.from,
            key = %key.short(),
            "No live widget, retrying once"
        );
        tokio::select! {
            () = self.cancel.cancelled() => return,
            () = tokio::time::sleep(self.relay_retry_delay) => {}
        }
        if self.deliver(&key) || self.play_payload(&envelope.message) {
            return;
        }
        warn!(
            target: "voicetag.relay",
            from = %envelope.from,
            key = %key.short(),
            "Dropping relayed click, no widget after retry"
        );
        self.emitter.emit(EngineEvent::RelayDropped { key });
    }

    /// Play stored audio for a relayed message that no widget backs.
    ///
    /// Only a payload whose fingerprint matches its key and whose audio is
    /// already in Audio Memory is played; nothing is generated for it.
    fn play_payload(&self, message: &RelayMessage) -> bool {
        let key = message.key();
        if &message.tag().key() != key {
            warn!(target: "voicetag.relay", key = %key.short(), "Relayed payload does not match its key");
            return false;
        }
        let KeyState::Resolved(locator) = self.scheduler.lookup(key) else {
            return false;
        };
        match self.playback.play(key, &locator) {
            Ok(previous) => {
                if let Some(previous) = previous {
                    self.repaint(&previous, BubbleStatus::Ready);
                }
            }
            Err(PlayFailure { stopped, error }) => {
                if let Some(stopped) = stopped {
                    self.repaint(&stopped, BubbleStatus::Ready);
                }
                warn!(target: "voicetag.relay", key = %key.short(), %error, "Relayed playback failed");
            }
        }
        true
    }

    fn deliver(&self, key: &TaskKey) -> bool {
        let Some((_, view)) = find_widget(&self.page_lock(), key) else {
            return false;
        };
        if let Err(e) = self.activate(&view) {
            warn!(target: "voicetag.relay", key = %key.short(), error = %e, "Relayed click failed");
        }
        true
    }
}
