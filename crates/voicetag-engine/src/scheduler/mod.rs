//! Generation scheduler.
//!
//! Owns the Pending Task Set and is the sole writer of Audio Memory.
//!
//! # Concurrency Model
//!
//! - `enqueue` is synchronous so a scan can register a task in the same pass
//!   that discovers the tag
//! - Single long-lived runner (never resets `runner_started`), woken by
//!   `Notify`; a `Semaphore` bounds generations in flight
//! - Lease tokens prevent stale completions from committing
//! - Lock order: pending set → audio memory (consistent everywhere)

mod queue;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Notify, Semaphore, broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use voicetag_core::{
    AudioLocator, BubbleStatus, BubbleTag, EngineEvent, EngineEventEmitter, SynthesisBackend,
    SynthesisError, SynthesisRequest, TaskKey, VoiceBindings, task_key,
};

use crate::config::SchedulerConfig;
use crate::state::SessionState;

pub use queue::{FailedTask, LeaseId, PendingTask, PendingTaskSet, TaskPhase};

/// Buffered completions per subscriber before it starts lagging.
const COMPLETION_CHANNEL_CAPACITY: usize = 256;

/// Result of asking the scheduler to generate audio for a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// A new pending task was created.
    Enqueued,
    AlreadyPending,
    /// Audio Memory already holds the key.
    AlreadyResolved,
    /// The key failed before; only an explicit retry re-enqueues it.
    PreviouslyFailed,
    /// The speaker has no voice binding; nothing was enqueued.
    MissingBinding,
    /// The utterance normalized to nothing.
    EmptyText,
}

impl EnqueueOutcome {
    /// Widget state implied by the outcome.
    pub const fn status(self) -> BubbleStatus {
        match self {
            Self::Enqueued | Self::AlreadyPending => BubbleStatus::Queued,
            Self::AlreadyResolved => BubbleStatus::Ready,
            Self::PreviouslyFailed => BubbleStatus::Error,
            Self::MissingBinding | Self::EmptyText => BubbleStatus::Waiting,
        }
    }
}

/// What the scheduler knows about a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyState {
    Resolved(AudioLocator),
    Pending,
    Failed,
    Unknown,
}

impl KeyState {
    /// Widget state for a key that is not currently playing.
    pub const fn status(&self) -> BubbleStatus {
        match self {
            Self::Resolved(_) => BubbleStatus::Ready,
            Self::Pending => BubbleStatus::Queued,
            Self::Failed => BubbleStatus::Error,
            Self::Unknown => BubbleStatus::Waiting,
        }
    }

    pub const fn locator(&self) -> Option<&AudioLocator> {
        match self {
            Self::Resolved(locator) => Some(locator),
            _ => None,
        }
    }
}

/// How a committed generation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    Ready(AudioLocator),
    Failed(SynthesisError),
}

/// Broadcast after a non-stale completion has been committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub key: TaskKey,
    pub outcome: CompletionOutcome,
}

/// Generation scheduler.
pub struct Scheduler {
    state: Arc<SessionState>,
    backend: Arc<dyn SynthesisBackend>,
    bindings: Arc<dyn VoiceBindings>,
    emitter: Arc<dyn EngineEventEmitter>,
    config: SchedulerConfig,
    /// Lock order: always acquire before the audio memory lock.
    pending: Mutex<PendingTaskSet>,
    /// Bounds concurrent backend calls.
    permits: Arc<Semaphore>,
    /// Wakes the runner when work is queued.
    queue_notify: Notify,
    /// Whether the runner has been started (never reset).
    runner_started: AtomicBool,
    /// Number of pending tasks, for `wait_idle`.
    pending_count: watch::Sender<usize>,
    completions: broadcast::Sender<Completion>,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(
        state: Arc<SessionState>,
        backend: Arc<dyn SynthesisBackend>,
        bindings: Arc<dyn VoiceBindings>,
        emitter: Arc<dyn EngineEventEmitter>,
        config: SchedulerConfig,
    ) -> Self {
        let (pending_count, _) = watch::channel(0);
        let (completions, _) = broadcast::channel(COMPLETION_CHANNEL_CAPACITY);
        Self {
            state,
            backend,
            bindings,
            emitter,
            permits: Arc::new(Semaphore::new(config.max_parallel.max(1))),
            config,
            pending: Mutex::new(PendingTaskSet::new()),
            queue_notify: Notify::new(),
            runner_started: AtomicBool::new(false),
            pending_count,
            completions,
            cancel: CancellationToken::new(),
        }
    }

    /// Fingerprint of `(speaker, text)`.
    pub fn get_task_key(&self, speaker: &str, text: &str) -> TaskKey {
        task_key(speaker, text)
    }

    /// Request generation for `(speaker, emotion, text)`.
    pub fn enqueue(&self, speaker: &str, emotion: &str, text: &str) -> EnqueueOutcome {
        self.enqueue_tag(&BubbleTag::new(speaker, emotion, text))
    }

    /// Request generation for a parsed tag.
    ///
    /// No-op when the key is pending, resolved, or remembered as failed.
    pub fn enqueue_tag(&self, tag: &BubbleTag) -> EnqueueOutcome {
        let key = tag.key();
        let bound = self.bindings.has_binding(&tag.speaker);
        let outcome = {
            let mut pending = self.pending();
            self.enqueue_locked(&mut pending, tag, &key, bound)
        };
        self.after_enqueue(tag, &key, outcome);
        outcome
    }

    /// Forget a remembered failure for the tag, then enqueue it.
    pub fn retry(&self, tag: &BubbleTag) -> EnqueueOutcome {
        let key = tag.key();
        let bound = self.bindings.has_binding(&tag.speaker);
        let outcome = {
            let mut pending = self.pending();
            if pending.clear_failure(&key) {
                debug!(target: "voicetag.scheduler", key = %key.short(), "Cleared failure for retry");
            }
            self.enqueue_locked(&mut pending, tag, &key, bound)
        };
        self.after_enqueue(tag, &key, outcome);
        outcome
    }

    /// Invalidate the audio for the tag and generate it again.
    ///
    /// Any pending task for the key is superseded: it keeps running, but
    /// its completion no longer carries the current lease and is dropped.
    pub fn regenerate(&self, tag: &BubbleTag) -> EnqueueOutcome {
        let key = tag.key();
        let bound = self.bindings.has_binding(&tag.speaker);
        let (outcome, released) = {
            let mut pending = self.pending();
            if let Some(old) = pending.remove(&key) {
                debug!(
                    target: "voicetag.scheduler",
                    key = %key.short(),
                    lease = ?old.lease,
                    "Superseding pending task"
                );
            }
            pending.clear_failure(&key);
            let released = self.state.audio_mut().invalidate(&key);
            let outcome = self.enqueue_locked(&mut pending, tag, &key, bound);
            self.pending_count.send_replace(pending.len());
            (outcome, released)
        };
        if let Some(locator) = released {
            self.backend.release(&locator);
        }
        info!(target: "voicetag.scheduler", key = %key.short(), ?outcome, "Regenerating");
        self.after_enqueue(tag, &key, outcome);
        outcome
    }

    /// Import an already-synthesized locator for `key`.
    ///
    /// Returns `false` if Audio Memory already held an entry.
    pub fn prime(&self, key: &TaskKey, locator: AudioLocator) -> bool {
        let resolved = {
            let mut pending = self.pending();
            pending.remove(key);
            pending.clear_failure(key);
            let resolved = self.state.audio_mut().resolve(key.clone(), locator.clone());
            self.pending_count.send_replace(pending.len());
            resolved
        };
        if resolved {
            let _ = self.completions.send(Completion {
                key: key.clone(),
                outcome: CompletionOutcome::Ready(locator),
            });
        }
        resolved
    }

    /// Resolve what is known about `key` in one consistent read.
    pub fn lookup(&self, key: &TaskKey) -> KeyState {
        let pending = self.pending();
        if let Some(locator) = self.state.audio().get(key) {
            return KeyState::Resolved(locator.clone());
        }
        if pending.contains(key) {
            KeyState::Pending
        } else if pending.is_failed(key) {
            KeyState::Failed
        } else {
            KeyState::Unknown
        }
    }

    pub fn is_pending(&self, key: &TaskKey) -> bool {
        self.pending().contains(key)
    }

    pub fn pending_len(&self) -> usize {
        self.pending().len()
    }

    /// Snapshot of the pending task for `key`.
    pub fn pending_task(&self, key: &TaskKey) -> Option<PendingTask> {
        self.pending().get(key).cloned()
    }

    /// Last failure message recorded for `key`.
    pub fn failure(&self, key: &TaskKey) -> Option<FailedTask> {
        self.pending().failure(key).cloned()
    }

    /// Start the runner if needed and kick it.
    pub fn run(self: &Arc<Self>) {
        self.ensure_runner();
        self.queue_notify.notify_one();
    }

    /// Stop the runner. In-flight generations are abandoned.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Wait until the Pending Task Set is empty.
    pub async fn wait_idle(&self) {
        let mut rx = self.pending_count.subscribe();
        let _ = rx.wait_for(|count| *count == 0).await;
    }

    pub fn subscribe_completions(&self) -> broadcast::Receiver<Completion> {
        self.completions.subscribe()
    }

    // ── Internals ───────────────────────────────────────────────────────────

    fn pending(&self) -> MutexGuard<'_, PendingTaskSet> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enqueue_locked(
        &self,
        pending: &mut PendingTaskSet,
        tag: &BubbleTag,
        key: &TaskKey,
        bound: bool,
    ) -> EnqueueOutcome {
        if tag.text.is_empty() {
            return EnqueueOutcome::EmptyText;
        }
        if pending.contains(key) {
            return EnqueueOutcome::AlreadyPending;
        }
        if self.state.audio().contains(key) {
            return EnqueueOutcome::AlreadyResolved;
        }
        if pending.is_failed(key) {
            return EnqueueOutcome::PreviouslyFailed;
        }
        if !bound {
            return EnqueueOutcome::MissingBinding;
        }
        if pending.insert(tag).is_none() {
            return EnqueueOutcome::AlreadyPending;
        }
        self.pending_count.send_replace(pending.len());
        EnqueueOutcome::Enqueued
    }

    fn after_enqueue(&self, tag: &BubbleTag, key: &TaskKey, outcome: EnqueueOutcome) {
        match outcome {
            EnqueueOutcome::Enqueued => {
                info!(
                    target: "voicetag.scheduler",
                    key = %key.short(),
                    speaker = %tag.speaker,
                    "Task enqueued"
                );
                self.emitter.emit(EngineEvent::TaskEnqueued {
                    key: key.clone(),
                    speaker: tag.speaker.clone(),
                });
                self.queue_notify.notify_one();
            }
            EnqueueOutcome::MissingBinding => {
                debug!(
                    target: "voicetag.scheduler",
                    speaker = %tag.speaker,
                    "No voice binding, not enqueuing"
                );
            }
            _ => {}
        }
    }

    fn ensure_runner(self: &Arc<Self>) {
        if self
            .runner_started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let scheduler = Arc::clone(self);
            tokio::spawn(scheduler.run_loop());
        }
    }

    async fn run_loop(self: Arc<Self>) {
        info!(
            target: "voicetag.scheduler",
            max_parallel = self.config.max_parallel,
            "Scheduler runner started"
        );
        loop {
            let permit = tokio::select! {
                () = self.cancel.cancelled() => break,
                permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let task = loop {
                if let Some(task) = self.pending().start_next() {
                    break Some(task);
                }
                tokio::select! {
                    () = self.cancel.cancelled() => break None,
                    () = self.queue_notify.notified() => {}
                }
            };
            let Some(task) = task else { break };

            let scheduler = Arc::clone(&self);
            tokio::spawn(async move {
                let result = tokio::select! {
                    () = scheduler.cancel.cancelled() => return,
                    result = scheduler.generate(&task) => result,
                };
                scheduler.finalize(&task, result);
                drop(permit);
            });
        }
        debug!(target: "voicetag.scheduler", "Scheduler runner stopped");
    }

    async fn generate(&self, task: &PendingTask) -> Result<AudioLocator, SynthesisError> {
        let binding = self
            .bindings
            .binding(&task.speaker)
            .ok_or_else(|| SynthesisError::MissingBinding(task.speaker.clone()))?;
        let request = SynthesisRequest {
            speaker: task.speaker.clone(),
            emotion: task.emotion.clone(),
            text: task.text.clone(),
            binding,
        };

        let policy = self.config.retry;
        let mut retries = 0;
        loop {
            let result = tokio::time::timeout(
                self.config.request_timeout,
                self.backend.synthesize(&request),
            )
            .await
            .unwrap_or(Err(SynthesisError::Timeout {
                secs: self.config.request_timeout.as_secs(),
            }));

            match result {
                Ok(locator) => return Ok(locator),
                Err(e) if e.is_transient() && retries < policy.max_retries => {
                    retries += 1;
                    let delay = policy.delay_for(retries);
                    warn!(
                        target: "voicetag.scheduler",
                        key = %task.key.short(),
                        retry = retries,
                        ?delay,
                        error = %e,
                        "Transient synthesis failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Commit a generation result if its lease is still current.
    fn finalize(&self, task: &PendingTask, result: Result<AudioLocator, SynthesisError>) {
        let mut pending = self.pending();
        if !pending.complete(&task.key, task.lease) {
            drop(pending);
            debug!(
                target: "voicetag.scheduler",
                key = %task.key.short(),
                "Ignoring stale completion (lease mismatch)"
            );
            if let Ok(locator) = result {
                if self.state.audio().get(&task.key) != Some(&locator) {
                    self.backend.release(&locator);
                }
            }
            return;
        }

        let outcome = match result {
            Ok(locator) => {
                self.state
                    .audio_mut()
                    .resolve(task.key.clone(), locator.clone());
                CompletionOutcome::Ready(locator)
            }
            Err(e) => {
                pending.record_failure(task.key.clone(), e.to_string());
                CompletionOutcome::Failed(e)
            }
        };
        self.pending_count.send_replace(pending.len());
        drop(pending);

        match &outcome {
            CompletionOutcome::Ready(_) => {
                info!(target: "voicetag.scheduler", key = %task.key.short(), "Generation completed");
                self.emitter.emit(EngineEvent::GenerationCompleted {
                    key: task.key.clone(),
                });
            }
            CompletionOutcome::Failed(e) => {
                warn!(
                    target: "voicetag.scheduler",
                    key = %task.key.short(),
                    error = %e,
                    "Generation failed"
                );
                self.emitter.emit(EngineEvent::GenerationFailed {
                    key: task.key.clone(),
                    error: e.to_string(),
                });
            }
        }
        let _ = self.completions.send(Completion {
            key: task.key.clone(),
            outcome,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use voicetag_core::{NoopEmitter, ReferenceAudio, StaticBindings, VoiceBinding};

    struct EchoBackend;

    #[async_trait]
    impl SynthesisBackend for EchoBackend {
        async fn synthesize(
            &self,
            request: &SynthesisRequest,
        ) -> Result<AudioLocator, SynthesisError> {
            Ok(AudioLocator::new(format!("blob://{}", request.text)))
        }
    }

    fn bindings() -> StaticBindings {
        StaticBindings::new().with(
            "Alice",
            VoiceBinding {
                text_lang: "en".to_string(),
                references: vec![ReferenceAudio {
                    emotion: "default".to_string(),
                    path: "/refs/alice.wav".to_string(),
                    prompt_text: String::new(),
                    prompt_lang: "en".to_string(),
                }],
            },
        )
    }

    fn scheduler() -> Scheduler {
        Scheduler::new(
            Arc::new(SessionState::default()),
            Arc::new(EchoBackend),
            Arc::new(bindings()),
            Arc::new(NoopEmitter::new()),
            SchedulerConfig::default(),
        )
    }

    #[test]
    fn test_enqueue_dedups() {
        let scheduler = scheduler();
        assert_eq!(
            scheduler.enqueue("Alice", "happy", "Hello"),
            EnqueueOutcome::Enqueued
        );
        assert_eq!(
            scheduler.enqueue("Alice", "sad", " Hello "),
            EnqueueOutcome::AlreadyPending
        );
        assert_eq!(scheduler.pending_len(), 1);
    }

    #[test]
    fn test_enqueue_without_binding() {
        let scheduler = scheduler();
        assert_eq!(
            scheduler.enqueue("Bob", "happy", "Hello"),
            EnqueueOutcome::MissingBinding
        );
        assert_eq!(scheduler.pending_len(), 0);
    }

    #[test]
    fn test_enqueue_empty_text() {
        let scheduler = scheduler();
        assert_eq!(
            scheduler.enqueue("Alice", "happy", "  <br> "),
            EnqueueOutcome::EmptyText
        );
    }

    #[test]
    fn test_prime_resolves_and_blocks_enqueue() {
        let scheduler = scheduler();
        let key = scheduler.get_task_key("Alice", "Hello");
        assert!(scheduler.prime(&key, AudioLocator::new("blob://abc")));
        assert!(!scheduler.prime(&key, AudioLocator::new("blob://other")));

        assert_eq!(
            scheduler.lookup(&key),
            KeyState::Resolved(AudioLocator::new("blob://abc"))
        );
        assert_eq!(
            scheduler.enqueue("Alice", "happy", "Hello"),
            EnqueueOutcome::AlreadyResolved
        );
    }

    #[test]
    fn test_lookup_unknown() {
        let scheduler = scheduler();
        let key = scheduler.get_task_key("Alice", "Hello");
        assert_eq!(scheduler.lookup(&key), KeyState::Unknown);
        assert_eq!(scheduler.lookup(&key).status(), BubbleStatus::Waiting);
    }

    #[test]
    fn test_stale_finalize_is_noop() {
        let scheduler = scheduler();
        let tag = BubbleTag::new("Alice", "happy", "Hello");
        scheduler.enqueue_tag(&tag);
        let old = scheduler.pending().start_next().unwrap();

        scheduler.regenerate(&tag);
        scheduler.finalize(&old, Ok(AudioLocator::new("blob://old")));

        assert_eq!(scheduler.lookup(&tag.key()), KeyState::Pending);
        assert!(scheduler.state.audio().is_empty());
    }

    #[test]
    fn test_finalize_failure_is_remembered() {
        let scheduler = scheduler();
        let tag = BubbleTag::new("Alice", "happy", "Hello");
        scheduler.enqueue_tag(&tag);
        let task = scheduler.pending().start_next().unwrap();

        scheduler.finalize(&task, Err(SynthesisError::InvalidResponse("html".into())));

        assert_eq!(scheduler.lookup(&tag.key()), KeyState::Failed);
        assert_eq!(
            scheduler.enqueue_tag(&tag),
            EnqueueOutcome::PreviouslyFailed
        );
        assert_eq!(scheduler.retry(&tag), EnqueueOutcome::Enqueued);
    }

    #[tokio::test]
    async fn test_runner_drains_queue() {
        let scheduler = Arc::new(scheduler());
        let mut completions = scheduler.subscribe_completions();
        scheduler.enqueue("Alice", "happy", "Hello");
        scheduler.run();

        let completion = completions.recv().await.unwrap();
        assert_eq!(
            completion.outcome,
            CompletionOutcome::Ready(AudioLocator::new("blob://Hello"))
        );
        scheduler.wait_idle().await;
        assert_eq!(scheduler.pending_len(), 0);
        scheduler.shutdown();
    }
}
