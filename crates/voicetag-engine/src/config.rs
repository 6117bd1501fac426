//! Engine configuration.
//!
//! User-facing toggles live in [`voicetag_core::Settings`]; this module holds
//! the structural knobs a host sets once at construction time.

use std::time::Duration;

use voicetag_core::DEFAULT_MARKER;

/// Chat content containers scanned in the main document.
const DEFAULT_CONTENT_CLASSES: &[&str] = &["mes_text", "message-body", "markdown-content"];

/// Elements whose text is never rewritten.
const DEFAULT_SKIPPED_TAGS: &[&str] = &["script", "style", "textarea", "input", "button"];

/// Stylesheet injected into every scanned document.
const DEFAULT_THEME_CSS: &str = "\
.voice-bubble{display:inline-flex;align-items:center;gap:6px;height:28px;padding:0 10px;\
border-radius:14px;cursor:pointer;vertical-align:middle;user-select:none}\
.voice-bubble.loading{opacity:.6;cursor:progress}\
.voice-bubble.error{outline:1px solid #d9534f}\
.voice-bubble .voice-bar{display:inline-block;width:3px;height:12px;margin:0 1px;border-radius:2px;background:currentColor}\
.voice-bubble.loading .voice-bar,.voice-bubble.playing .voice-bar{animation:voice-wave 1s infinite ease-in-out}\
@keyframes voice-wave{0%,100%{transform:scaleY(.4)}50%{transform:scaleY(1)}}";

/// Tag scanner configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannerConfig {
    /// Marker keyword inside the tag header (`[TTSVoice: ...]`).
    pub marker: String,
    /// Main-document classes whose subtrees hold chat content.
    pub content_classes: Vec<String>,
    /// Lowercase tag names that are never descended into.
    pub skipped_tags: Vec<String>,
    /// Theme stylesheet body.
    pub theme_css: String,
    /// `id` of the injected stylesheet in embedded frames.
    pub frame_style_id: String,
    /// `id` of the injected stylesheet in the main document.
    pub main_style_id: String,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            marker: DEFAULT_MARKER.to_string(),
            content_classes: DEFAULT_CONTENT_CLASSES
                .iter()
                .map(ToString::to_string)
                .collect(),
            skipped_tags: DEFAULT_SKIPPED_TAGS.iter().map(ToString::to_string).collect(),
            theme_css: DEFAULT_THEME_CSS.to_string(),
            frame_style_id: "sovits-iframe-style".to_string(),
            main_style_id: "sovits-iframe-style-main".to_string(),
        }
    }
}

impl ScannerConfig {
    #[must_use]
    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = marker.into();
        self
    }

    #[must_use]
    pub fn with_content_classes<I, S>(mut self, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.content_classes = classes.into_iter().map(Into::into).collect();
        self
    }

    /// Whether `tag` is one of the skipped element names.
    pub fn is_skipped(&self, tag: &str) -> bool {
        self.skipped_tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

/// Retry policy for transient synthesis failures.
///
/// Delay before retry `n` (1-based) is `base_delay * 2^(n-1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; `0` disables retrying.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Backoff before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Generation calls allowed in flight at once.
    pub max_parallel: usize,
    /// Per-attempt timeout for a backend call.
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_parallel: 1,
            request_timeout: Duration::from_secs(120),
            retry: RetryPolicy::default(),
        }
    }
}

impl SchedulerConfig {
    #[must_use]
    pub const fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = if max_parallel == 0 { 1 } else { max_parallel };
        self
    }

    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub scanner: ScannerConfig,
    pub scheduler: SchedulerConfig,
    /// Delay before the single retry of a relayed click with no live widget.
    pub relay_retry_delay: Duration,
    /// Upper bound on converging scan passes per mutation burst.
    pub max_scan_passes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scanner: ScannerConfig::default(),
            scheduler: SchedulerConfig::default(),
            relay_retry_delay: Duration::from_millis(300),
            max_scan_passes: 4,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn with_scanner(mut self, scanner: ScannerConfig) -> Self {
        self.scanner = scanner;
        self
    }

    #[must_use]
    pub const fn with_scheduler(mut self, scheduler: SchedulerConfig) -> Self {
        self.scheduler = scheduler;
        self
    }

    #[must_use]
    pub const fn with_relay_retry_delay(mut self, delay: Duration) -> Self {
        self.relay_retry_delay = delay;
        self
    }

    #[must_use]
    pub const fn with_max_scan_passes(mut self, passes: usize) -> Self {
        self.max_scan_passes = passes;
        self
    }
}
