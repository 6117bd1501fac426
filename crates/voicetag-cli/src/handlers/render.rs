//! `voicetag render`: scan a transcript, generate every voice, print markup.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};
use url::Url;
use voicetag_core::{Settings, StaticBindings, SynthesisBackend, VoiceBindings};
use voicetag_engine::sync::widgets_in_state;
use voicetag_engine::{
    BubbleStatus, EngineConfig, EngineDeps, Page, ScanReport, ScannerConfig, SchedulerConfig,
    TtsProxyBackend, build_engine,
};

use crate::config::{load_bindings, load_settings};
use crate::parser::RenderArgs;
use crate::transcript::{build_page, render_markup};

/// Result of a render run.
#[derive(Debug)]
pub struct RenderOutcome {
    pub markup: String,
    /// Report of the first scan pass.
    pub report: ScanReport,
    pub ready: usize,
    pub failed: usize,
    pub waiting: usize,
}

pub async fn execute(args: &RenderArgs) -> anyhow::Result<RenderOutcome> {
    let transcript = std::fs::read_to_string(&args.transcript)
        .with_context(|| format!("Failed to read transcript {}", args.transcript.display()))?;

    let bindings = match &args.bindings {
        Some(path) => load_bindings(path)?,
        None => StaticBindings::new(),
    };
    if bindings.is_empty() {
        warn!("No voice bindings loaded, every bubble will stay waiting");
    }

    let mut settings = load_settings(args.settings.as_deref())?;
    if args.frame {
        settings.iframe_mode = true;
    }

    let base = Url::parse(&args.server)
        .with_context(|| format!("Invalid server URL '{}'", args.server))?;
    let timeout = Duration::from_secs(args.timeout_secs);
    let backend = TtsProxyBackend::new(base, timeout).context("Failed to build HTTP client")?;

    let config = EngineConfig::default()
        .with_scanner(ScannerConfig::default().with_marker(args.marker.clone()))
        .with_scheduler(
            SchedulerConfig::default()
                .with_max_parallel(args.parallel.max(1))
                .with_request_timeout(timeout),
        );

    render(
        Arc::new(backend),
        Arc::new(bindings),
        settings,
        config,
        build_page(&transcript, args.frame),
    )
    .await
}

/// Scan, schedule every waiting bubble, wait for generation, then sync.
pub async fn render(
    backend: Arc<dyn SynthesisBackend>,
    bindings: Arc<dyn VoiceBindings>,
    settings: Settings,
    config: EngineConfig,
    page: Page,
) -> anyhow::Result<RenderOutcome> {
    let deps = EngineDeps::new(backend, bindings)
        .with_settings(settings)
        .with_config(config);
    let engine = build_engine(deps, page).context("Failed to build engine")?;

    let report = engine.scan();
    for error in &report.errors {
        warn!(error = %error, "Scan error");
    }
    let scheduled = engine.schedule_waiting();
    info!(
        regions = report.regions_rewritten,
        enqueued = report.tasks_enqueued + scheduled,
        "Waiting for generation"
    );

    engine.settle().await;
    engine.shutdown();

    let page = engine.page();
    let outcome = RenderOutcome {
        markup: render_markup(&page),
        ready: widgets_in_state(&page, BubbleStatus::Ready).len(),
        failed: widgets_in_state(&page, BubbleStatus::Error).len(),
        waiting: widgets_in_state(&page, BubbleStatus::Waiting).len(),
        report,
    };
    info!(
        ready = outcome.ready,
        failed = outcome.failed,
        waiting = outcome.waiting,
        "Render complete"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use voicetag_core::{
        AudioLocator, ReferenceAudio, SynthesisError, SynthesisRequest, VoiceBinding,
    };

    /// Fails for utterances containing "fail", echoes everything else.
    struct PickyBackend;

    #[async_trait]
    impl SynthesisBackend for PickyBackend {
        async fn synthesize(
            &self,
            request: &SynthesisRequest,
        ) -> Result<AudioLocator, SynthesisError> {
            if request.text.contains("fail") {
                return Err(SynthesisError::Rejected {
                    status: 422,
                    message: "unsupported".to_string(),
                });
            }
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

    #[tokio::test]
    async fn test_render_counts_outcomes() {
        let transcript = "[TTSVoice: Alice:happy] Hi\n\
                          [TTSVoice: Alice:sad] please fail\n\
                          [TTSVoice: Nobody:calm] Unbound";
        let outcome = render(
            Arc::new(PickyBackend),
            Arc::new(bindings()),
            Settings::default(),
            EngineConfig::default(),
            build_page(transcript, false),
        )
        .await
        .unwrap();

        assert_eq!(outcome.report.regions_rewritten, 3);
        assert_eq!(outcome.ready, 1);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.waiting, 1);
        assert!(outcome.markup.contains("data-audio-url=\"blob://Hi\""));
    }

    #[tokio::test]
    async fn test_render_inside_frame() {
        let settings = Settings {
            iframe_mode: true,
            ..Settings::default()
        };
        let outcome = render(
            Arc::new(PickyBackend),
            Arc::new(bindings()),
            settings,
            EngineConfig::default(),
            build_page("[TTSVoice: Alice:happy] Framed", true),
        )
        .await
        .unwrap();

        assert_eq!(outcome.ready, 1);
        assert!(outcome.markup.contains("sovits-iframe-style"));
    }
}
