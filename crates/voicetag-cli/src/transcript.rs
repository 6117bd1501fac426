//! Transcript to page conversion.
//!
//! Every non-blank line becomes one chat message. In frame mode the whole
//! transcript is placed inside a single embedded frame, the way some chat
//! themes render message bodies.

use std::fmt::Write;

use voicetag_engine::{Document, Element, Page, Rect};

/// Message container class the scanner treats as chat content.
const MESSAGE_CLASS: &str = "mes_text";

/// Viewport rectangle of the embedded frame.
const FRAME_RECT: Rect = Rect::new(0.0, 0.0, 800.0, 600.0);

fn lines(transcript: &str) -> impl Iterator<Item = &str> {
    transcript
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
}

pub fn build_page(transcript: &str, in_frame: bool) -> Page {
    if !in_frame {
        return Page::new(Document::with_body(
            lines(transcript).map(|line| Element::new("div").with_class(MESSAGE_CLASS).with_text(line)),
        ));
    }
    let mut page = Page::new(Document::new());
    page.add_frame(
        FRAME_RECT,
        Some(Document::with_body(
            lines(transcript).map(|line| Element::new("p").with_text(line)),
        )),
    );
    page.take_mutations();
    page
}

/// Markup of the main document followed by every reachable frame.
pub fn render_markup(page: &Page) -> String {
    let mut out = page.main.to_html();
    for frame in page.frames() {
        if let Some(doc) = &frame.document {
            let _ = write!(out, "\n<!-- frame {} -->\n{}", frame.id.0, doc.to_html());
        }
    }
    out
}
