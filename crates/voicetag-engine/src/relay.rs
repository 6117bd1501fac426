//! Cross-boundary relay.
//!
//! Frames cannot reach the main document's playback authority directly.
//! A click inside a frame is posted as a [`RelayMessage`] over a channel the
//! main side consumes; context-menu requests instead translate pointer
//! coordinates into main-document space.

use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;
use tracing::debug;
use voicetag_core::{RelayMessage, TaskKey};

use crate::dom::{DocumentTarget, FrameId, Page, Point, Rect};
use crate::error::RelayError;
use crate::sync::find_widget_in;

/// A relayed message with its origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayEnvelope {
    pub from: FrameId,
    pub message: RelayMessage,
}

/// Translate a frame-viewport point into main-document viewport space.
pub fn translate_point(frame_rect: Rect, client: Point) -> Point {
    Point::new(frame_rect.x + client.x, frame_rect.y + client.y)
}

/// Frame-to-main message transport.
pub struct Relay {
    tx: mpsc::UnboundedSender<RelayEnvelope>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<RelayEnvelope>>>,
}

impl Default for Relay {
    fn default() -> Self {
        Self::new()
    }
}

impl Relay {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }

    /// Handle a click on a widget inside `frame`: read the widget and post a
    /// `play_tts` message to the main side.
    pub fn frame_click(&self, page: &Page, frame: FrameId, key: &TaskKey) -> Result<(), RelayError> {
        let target = DocumentTarget::Frame(frame);
        if page.document(target).is_none() {
            return Err(RelayError::FrameUnavailable(frame));
        }
        let view = find_widget_in(page, target, key).ok_or_else(|| RelayError::WidgetNotFound {
            target,
            key: key.clone(),
        })?;
        self.post(
            frame,
            RelayMessage::PlayTts {
                key: view.key,
                text: view.text,
                char_name: view.speaker,
                emotion: view.emotion,
            },
        )
    }

    /// Post a message as if sent from `frame`.
    pub fn post(&self, from: FrameId, message: RelayMessage) -> Result<(), RelayError> {
        debug!(target: "voicetag.relay", %from, key = %message.key().short(), "Posting relay message");
        self.tx
            .send(RelayEnvelope { from, message })
            .map_err(|_| RelayError::ChannelClosed)
    }

    /// Hand the receiving end to the main-side consumer. Only the first
    /// call gets it.
    pub fn take_receiver(&self) -> Option<mpsc::UnboundedReceiver<RelayEnvelope>> {
        self.rx.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{Document, Element};
    use crate::scanner::markup::{BubbleView, render_bubble};
    use voicetag_core::{BubbleStatus, BubbleTag};

    #[test]
    fn test_translate_point_offsets_by_frame_rect() {
        let rect = Rect::new(100.0, 40.0, 300.0, 200.0);
        assert_eq!(
            translate_point(rect, Point::new(12.5, 7.0)),
            Point::new(112.5, 47.0)
        );
    }

    #[test]
    fn test_frame_click_posts_play_tts() {
        let tag = BubbleTag::new("Alice", "happy", "Hello");
        let widget = render_bubble(&BubbleView::new(&tag, BubbleStatus::Ready, None));
        let mut page = Page::new(Document::new());
        let frame = page.add_frame(
            Rect::default(),
            Some(Document::with_body([Element::new("p").with_child(widget)])),
        );

        let relay = Relay::new();
        let mut rx = relay.take_receiver().unwrap();
        relay.frame_click(&page, frame, &tag.key()).unwrap();

        let envelope = rx.try_recv().unwrap();
        assert_eq!(envelope.from, frame);
        assert_eq!(
            envelope.message,
            RelayMessage::PlayTts {
                key: tag.key(),
                text: "Hello".to_string(),
                char_name: "Alice".to_string(),
                emotion: "happy".to_string(),
            }
        );
        assert!(relay.take_receiver().is_none());
    }

    #[test]
    fn test_frame_click_unknown_widget() {
        let mut page = Page::new(Document::new());
        let frame = page.add_frame(Rect::default(), Some(Document::new()));
        let relay = Relay::new();
        let err = relay
            .frame_click(&page, frame, &TaskKey::from_raw("missing"))
            .unwrap_err();
        assert!(matches!(err, RelayError::WidgetNotFound { .. }));
    }
}
