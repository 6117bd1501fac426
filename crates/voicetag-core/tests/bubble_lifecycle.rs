//! Integration tests for the public core surface: a tag found in text is
//! keyed, walks the status machine, and is reported through events.

use voicetag_core::{
    BubbleStatus, EngineEvent, Settings, SettingsUpdate, TagPattern, TransitionError, task_key,
};

#[test]
fn test_tag_to_ready_lifecycle() {
    let pattern = TagPattern::default();
    let text = "Intro [TTSVoice: Alice :happy]  Hello   there\nnext line";
    let tag = pattern
        .matches(text)
        .next()
        .and_then(|m| m.to_tag().ok().flatten())
        .expect("tag parsed");

    assert_eq!(tag.speaker, "Alice");
    assert_eq!(tag.text, "Hello there");
    assert_eq!(tag.key(), task_key("Alice", "Hello there"));

    let status = BubbleStatus::Waiting
        .transition(BubbleStatus::Queued)
        .and_then(|s| s.transition(BubbleStatus::Ready))
        .and_then(|s| s.transition(BubbleStatus::Playing))
        .and_then(|s| s.transition(BubbleStatus::Ready))
        .unwrap();
    assert_eq!(status, BubbleStatus::Ready);
}

#[test]
fn test_waiting_cannot_jump_to_playing() {
    assert_eq!(
        BubbleStatus::Waiting.transition(BubbleStatus::Playing),
        Err(TransitionError {
            from: BubbleStatus::Waiting,
            to: BubbleStatus::Playing,
        })
    );
}

#[test]
fn test_event_serialization_uses_type_tag() {
    let event = EngineEvent::GenerationFailed {
        key: task_key("Alice", "Hello"),
        error: "backend unreachable".to_string(),
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "generation_failed");
    assert_eq!(json["error"], "backend unreachable");

    let back: EngineEvent = serde_json::from_value(json).unwrap();
    assert_eq!(back, event);
}

#[test]
fn test_settings_update_round_trip_from_host_json() {
    let update: SettingsUpdate =
        serde_json::from_str(r#"{ "iframe_mode": true, "bubble_style": "retro" }"#).unwrap();
    let mut settings = Settings::default();
    settings.merge(&update);

    assert!(settings.iframe_mode);
    assert!(settings.enabled);
    assert_eq!(settings.bubble_style, "retro");
}
