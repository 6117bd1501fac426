//! HTTP backend speaking the `tts_proxy` protocol.
//!
//! One `GET` per utterance. The query carries the text and the reference
//! audio chosen from the speaker's voice binding; a 2xx audio body means the
//! request URL itself is a playable locator.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;
use url::Url;
use voicetag_core::{AudioLocator, SynthesisBackend, SynthesisError, SynthesisRequest};

pub const TTS_PROXY_PATH: &str = "tts_proxy";

/// Build the `tts_proxy` URL for `request` under `base`.
pub fn build_request_url(base: &Url, request: &SynthesisRequest) -> Result<Url, SynthesisError> {
    let reference = request
        .binding
        .reference_for(&request.emotion)
        .ok_or_else(|| SynthesisError::MissingBinding(request.speaker.clone()))?;

    // Keep any path prefix on the base ("http://host/api" → "/api/tts_proxy")
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    let mut url = base
        .join(TTS_PROXY_PATH)
        .map_err(|e| SynthesisError::Misconfigured(format!("invalid backend url: {e}")))?;

    url.query_pairs_mut()
        .append_pair("text", &request.text)
        .append_pair("text_lang", &request.binding.text_lang)
        .append_pair("ref_audio_path", &reference.path)
        .append_pair("prompt_text", &reference.prompt_text)
        .append_pair("prompt_lang", &reference.prompt_lang)
        .append_pair("streaming_mode", "false");
    Ok(url)
}

/// `reqwest`-backed [`SynthesisBackend`].
pub struct TtsProxyBackend {
    client: reqwest::Client,
    base: Url,
    timeout: Duration,
}

impl TtsProxyBackend {
    pub fn new(base: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base,
            timeout,
        })
    }

    pub const fn base(&self) -> &Url {
        &self.base
    }

    fn classify(&self, e: &reqwest::Error) -> SynthesisError {
        if e.is_timeout() {
            SynthesisError::Timeout {
                secs: self.timeout.as_secs(),
            }
        } else {
            SynthesisError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl SynthesisBackend for TtsProxyBackend {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioLocator, SynthesisError> {
        let url = build_request_url(&self.base, request)?;
        debug!(target: "voicetag.backend", speaker = %request.speaker, "Requesting synthesis");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| self.classify(&e))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(SynthesisError::Transport(format!(
                "backend returned {status}"
            )));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SynthesisError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if !is_audio(&content_type) {
            return Err(SynthesisError::InvalidResponse(format!(
                "expected audio, got '{content_type}'"
            )));
        }
        Ok(AudioLocator::new(url.as_str()))
    }
}

fn is_audio(content_type: &str) -> bool {
    content_type.starts_with("audio/") || content_type == "application/octet-stream"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use voicetag_core::{ReferenceAudio, VoiceBinding};

    fn request(emotion: &str) -> SynthesisRequest {
        SynthesisRequest {
            speaker: "Alice".to_string(),
            emotion: emotion.to_string(),
            text: "Hello there & welcome".to_string(),
            binding: VoiceBinding {
                text_lang: "en".to_string(),
                references: vec![
                    ReferenceAudio {
                        emotion: "default".to_string(),
                        path: "/refs/alice.wav".to_string(),
                        prompt_text: "hi".to_string(),
                        prompt_lang: "en".to_string(),
                    },
                    ReferenceAudio {
                        emotion: "happy".to_string(),
                        path: "/refs/alice_happy.wav".to_string(),
                        prompt_text: "yay".to_string(),
                        prompt_lang: "en".to_string(),
                    },
                ],
            },
        }
    }

    fn query(url: &Url) -> HashMap<String, String> {
        url.query_pairs().into_owned().collect()
    }

    #[test]
    fn test_unjoinable_base_is_not_retried() {
        let base = Url::parse("mailto:tts@example.com").unwrap();
        let err = build_request_url(&base, &request("happy")).unwrap_err();
        assert!(matches!(err, SynthesisError::Misconfigured(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_url_carries_emotion_reference() {
        let base = Url::parse("http://127.0.0.1:3000").unwrap();
        let url = build_request_url(&base, &request("Happy")).unwrap();

        assert_eq!(url.path(), "/tts_proxy");
        let q = query(&url);
        assert_eq!(q["text"], "Hello there & welcome");
        assert_eq!(q["text_lang"], "en");
        assert_eq!(q["ref_audio_path"], "/refs/alice_happy.wav");
        assert_eq!(q["prompt_text"], "yay");
        assert_eq!(q["streaming_mode"], "false");
    }

    #[test]
    fn test_url_falls_back_to_default_reference() {
        let base = Url::parse("http://127.0.0.1:3000").unwrap();
        let url = build_request_url(&base, &request("angry")).unwrap();
        assert_eq!(query(&url)["ref_audio_path"], "/refs/alice.wav");
    }

    #[test]
    fn test_url_keeps_base_path_prefix() {
        let base = Url::parse("http://host/api").unwrap();
        let url = build_request_url(&base, &request("happy")).unwrap();
        assert_eq!(url.path(), "/api/tts_proxy");
    }

    #[test]
    fn test_empty_binding_is_missing() {
        let mut req = request("happy");
        req.binding.references.clear();
        let base = Url::parse("http://host").unwrap();
        assert_eq!(
            build_request_url(&base, &req),
            Err(SynthesisError::MissingBinding("Alice".to_string()))
        );
    }

    #[test]
    fn test_audio_content_types() {
        assert!(is_audio("audio/wav"));
        assert!(is_audio("application/octet-stream"));
        assert!(!is_audio("application/json"));
        assert!(!is_audio(""));
    }
}
