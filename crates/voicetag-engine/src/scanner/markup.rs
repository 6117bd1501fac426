//! Bubble widget markup.

use voicetag_core::{AudioLocator, BubbleStatus, BubbleTag, TaskKey};

use crate::dom::Element;

/// Class marking an element as emitted bubble markup.
pub const BUBBLE_CLASS: &str = "voice-bubble";

const MAX_WIDTH_PX: u32 = 220;
const BASE_WIDTH_PX: u32 = 60;
const WIDTH_PER_SECOND_PX: u32 = 10;

/// Everything a widget displays, read back from or written to markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BubbleView {
    pub key: TaskKey,
    pub status: BubbleStatus,
    pub speaker: String,
    pub emotion: String,
    pub text: String,
    pub locator: Option<AudioLocator>,
}

impl BubbleView {
    pub fn new(tag: &BubbleTag, status: BubbleStatus, locator: Option<AudioLocator>) -> Self {
        Self {
            key: tag.key(),
            status,
            speaker: tag.speaker.clone(),
            emotion: tag.emotion.clone(),
            text: tag.text.clone(),
            locator,
        }
    }

    /// Read a widget. `None` if `element` is not bubble markup.
    pub fn from_element(element: &Element) -> Option<Self> {
        if !is_bubble(element) {
            return None;
        }
        Some(Self {
            key: TaskKey::from_raw(element.attr("data-key")?),
            status: element.attr("data-status")?.parse().ok()?,
            speaker: element.attr("data-voice-name").unwrap_or_default().to_string(),
            emotion: element
                .attr("data-voice-emotion")
                .unwrap_or_default()
                .to_string(),
            text: element.attr("data-text").unwrap_or_default().to_string(),
            locator: element.attr("data-audio-url").map(AudioLocator::new),
        })
    }

    /// The tag this widget was rendered from.
    pub fn tag(&self) -> BubbleTag {
        BubbleTag::new(&self.speaker, &self.emotion, &self.text)
    }

    /// Same widget in another state.
    #[must_use]
    pub fn with_status(mut self, status: BubbleStatus, locator: Option<AudioLocator>) -> Self {
        self.status = status;
        self.locator = locator;
        self
    }
}

pub fn is_bubble(element: &Element) -> bool {
    element.has_class(BUBBLE_CLASS)
}

/// Duration hint in seconds, roughly four characters per second.
pub fn duration_hint(text: &str) -> u32 {
    let chars = u32::try_from(text.chars().count()).unwrap_or(u32::MAX);
    chars.div_ceil(4).max(1)
}

/// Widget width in pixels, growing with the utterance length.
pub fn bubble_width(text: &str) -> u32 {
    BASE_WIDTH_PX
        .saturating_add(duration_hint(text).saturating_mul(WIDTH_PER_SECOND_PX))
        .min(MAX_WIDTH_PX)
}

/// Build the widget markup for `view`.
pub fn render_bubble(view: &BubbleView) -> Element {
    let state_class = if view.status.is_loading() {
        "loading"
    } else {
        view.status.as_str()
    };
    let seconds = duration_hint(&view.text);

    let mut waves = Element::new("span").with_class("voice-waves");
    for _ in 0..3 {
        waves = waves.with_child(Element::new("span").with_class("voice-bar"));
    }

    let mut bubble = Element::new("span")
        .with_class(&format!("{BUBBLE_CLASS} {state_class}"))
        .with_attr("data-key", view.key.as_str())
        .with_attr("data-status", view.status.as_str())
        .with_attr("data-text", view.text.as_str())
        .with_attr("data-voice-name", view.speaker.as_str())
        .with_attr("data-voice-emotion", view.emotion.as_str())
        .with_attr("style", format!("width: {}px", bubble_width(&view.text)))
        .with_child(waves)
        .with_child(
            Element::new("span")
                .with_class("voice-duration")
                .with_text(format!("{seconds}\"")),
        );
    if let Some(locator) = &view.locator {
        bubble = bubble.with_attr("data-audio-url", locator.as_str());
    }
    bubble
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(status: BubbleStatus) -> BubbleView {
        BubbleView::new(
            &BubbleTag::new("Alice", "happy", "Hello there"),
            status,
            None,
        )
    }

    #[test]
    fn test_width_scales_and_caps() {
        assert_eq!(duration_hint(""), 1);
        assert_eq!(duration_hint("abcd"), 1);
        assert_eq!(duration_hint("abcde"), 2);
        assert_eq!(bubble_width("abcd"), 70);
        assert_eq!(bubble_width(&"x".repeat(400)), 220);
    }

    #[test]
    fn test_queued_renders_loading() {
        let el = render_bubble(&view(BubbleStatus::Queued));
        assert!(el.has_class("loading"));
        assert_eq!(el.attr("data-status"), Some("queued"));
        assert!(el.attr("data-audio-url").is_none());
    }

    #[test]
    fn test_ready_carries_locator() {
        let v = view(BubbleStatus::Ready)
            .with_status(BubbleStatus::Ready, Some(AudioLocator::new("blob://abc")));
        let el = render_bubble(&v);
        assert!(el.has_class("ready"));
        assert_eq!(el.attr("data-audio-url"), Some("blob://abc"));
    }

    #[test]
    fn test_view_reads_back() {
        let v = view(BubbleStatus::Error);
        let el = render_bubble(&v);
        assert_eq!(BubbleView::from_element(&el), Some(v.clone()));
        assert_eq!(v.tag().key(), v.key);
    }

    #[test]
    fn test_plain_element_is_not_a_view() {
        assert!(BubbleView::from_element(&Element::new("span")).is_none());
    }
}
