//! Tag scanner.
//!
//! Walks the main document and, in iframe mode, every embedded frame;
//! rewrites raw voice tags into bubble widgets and repaints existing widgets
//! whose state drifted from Audio Memory and the Pending Task Set.
//!
//! A pass over an unchanged tree with unchanged state performs no writes:
//! raw tags are gone after the first pass, widgets already show their
//! computed state, and theme injection checks for presence first.

pub mod markup;

use tracing::{debug, trace, warn};
use voicetag_core::{AudioLocator, BubbleStatus, BubbleTag, Settings, TagPattern, TaskKey};

use crate::config::ScannerConfig;
use crate::dom::{Document, DocumentTarget, Element, MutationKind, Node, Page};
use crate::error::ScanError;
use crate::scheduler::{EnqueueOutcome, KeyState, Scheduler};
use crate::state::SessionState;

use markup::{BubbleView, is_bubble, render_bubble};

/// Collaborators a pass reads from.
#[derive(Clone, Copy)]
pub struct ScanContext<'a> {
    pub state: &'a SessionState,
    pub scheduler: &'a Scheduler,
    /// Key currently owned by the playback authority.
    pub playing: Option<&'a TaskKey>,
}

/// Compute the widget state for `key`.
pub fn resolve_status(
    ctx: &ScanContext<'_>,
    key: &TaskKey,
) -> (BubbleStatus, Option<AudioLocator>) {
    let known = ctx.scheduler.lookup(key);
    let status = match &known {
        KeyState::Resolved(_) if ctx.playing == Some(key) => BubbleStatus::Playing,
        other => other.status(),
    };
    (status, known.locator().cloned())
}

/// What a scan pass did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub documents_scanned: usize,
    /// Raw tag regions replaced by widgets.
    pub regions_rewritten: usize,
    /// Existing widgets repainted to a new state.
    pub widgets_repainted: usize,
    pub bubbles_rendered: usize,
    pub cache_hits: usize,
    pub tasks_enqueued: usize,
    /// Individual tree writes, each journaled as one mutation.
    pub tree_writes: usize,
    pub errors: Vec<ScanError>,
}

impl ScanReport {
    pub const fn is_noop(&self) -> bool {
        self.tree_writes == 0
    }
}

/// Rewrites voice tags into bubble widgets.
#[derive(Debug, Clone)]
pub struct TagScanner {
    pattern: TagPattern,
    config: ScannerConfig,
}

impl TagScanner {
    pub fn new(config: ScannerConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: TagPattern::new(&config.marker)?,
            config,
        })
    }

    pub const fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Run one full pass over `page`.
    pub fn scan(&self, page: &mut Page, ctx: &ScanContext<'_>) -> ScanReport {
        let settings = ctx.state.settings();
        let mut report = ScanReport::default();
        if !settings.enabled {
            trace!(target: "voicetag.scanner", "Scanning disabled");
            return report;
        }

        self.scan_document(page, DocumentTarget::Main, &settings, ctx, &mut report);
        if settings.iframe_mode {
            for target in page.targets().into_iter().skip(1) {
                self.scan_document(page, target, &settings, ctx, &mut report);
            }
        }

        if report.is_noop() {
            trace!(target: "voicetag.scanner", "Scan pass wrote nothing");
        } else {
            debug!(
                target: "voicetag.scanner",
                documents = report.documents_scanned,
                regions = report.regions_rewritten,
                repainted = report.widgets_repainted,
                enqueued = report.tasks_enqueued,
                cache_hits = report.cache_hits,
                writes = report.tree_writes,
                "Scan pass complete"
            );
        }
        report
    }

    fn scan_document(
        &self,
        page: &mut Page,
        target: DocumentTarget,
        settings: &Settings,
        ctx: &ScanContext<'_>,
        report: &mut ScanReport,
    ) {
        let Some(doc) = page.document_mut(target) else {
            if let DocumentTarget::Frame(id) = target {
                warn!(target: "voicetag.scanner", frame = %id, "Skipping unreachable frame");
                report.errors.push(ScanError::FrameUnavailable(id));
            }
            return;
        };
        report.documents_scanned += 1;

        let style_id = match target {
            DocumentTarget::Main => &self.config.main_style_id,
            DocumentTarget::Frame(_) => &self.config.frame_style_id,
        };
        let injected = ensure_theme(doc, style_id, &self.config.theme_css);
        let restyled = doc
            .body
            .set_attr("data-bubble-style", &settings.bubble_style);

        let writes = {
            let mut walk = Walk {
                scanner: self,
                ctx,
                settings,
                target,
                report: &mut *report,
            };
            // Frames are chat content end to end
            let in_scope = matches!(target, DocumentTarget::Frame(_));
            walk.element(&mut doc.body, in_scope)
        };

        if injected {
            page.record(target, MutationKind::ChildList);
            report.tree_writes += 1;
        }
        if restyled {
            page.record(target, MutationKind::Attributes);
            report.tree_writes += 1;
        }
        for _ in 0..writes {
            page.record(target, MutationKind::ChildList);
        }
        report.tree_writes += writes;
    }
}

/// Inject the theme stylesheet unless a node with `style_id` exists.
fn ensure_theme(doc: &mut Document, style_id: &str, css: &str) -> bool {
    if doc.head.find_by_id(style_id).is_some() {
        return false;
    }
    doc.head.children.push(Node::Element(
        Element::new("style").with_attr("id", style_id).with_text(css),
    ));
    true
}

/// Children grouped so that adjacent text nodes share one slice.
fn text_runs(children: &[Node]) -> impl Iterator<Item = &[Node]> {
    children.chunk_by(|a, b| matches!((a, b), (Node::Text(_), Node::Text(_))))
}

fn join_text(run: &[Node]) -> String {
    run.iter()
        .filter_map(|node| match node {
            Node::Text(text) => Some(text.as_str()),
            Node::Element(_) => None,
        })
        .collect()
}

/// State of one document walk.
struct Walk<'s, 'c, 'r> {
    scanner: &'s TagScanner,
    ctx: &'c ScanContext<'c>,
    settings: &'s Settings,
    target: DocumentTarget,
    report: &'r mut ScanReport,
}

impl Walk<'_, '_, '_> {
    /// Visit `element`; returns the number of tree writes made beneath it.
    fn element(&mut self, element: &mut Element, in_scope: bool) -> usize {
        if self.scanner.config.is_skipped(&element.tag) {
            return 0;
        }
        let in_scope = in_scope
            || self
                .scanner
                .config
                .content_classes
                .iter()
                .any(|c| element.has_class(c));

        let mut writes = 0;
        if in_scope && self.has_candidate_text(element) {
            let rewritten = self.rewrite_children(&element.children);
            if rewritten != element.children {
                element.children = rewritten;
                writes += 1;
            }
        }

        for child in &mut element.children {
            let Node::Element(child) = child else {
                continue;
            };
            if is_bubble(child) {
                writes += self.reconcile(child);
            } else {
                writes += self.element(child, in_scope);
            }
        }
        writes
    }

    fn has_candidate_text(&self, element: &Element) -> bool {
        text_runs(&element.children)
            .any(|run| self.scanner.pattern.might_contain(&join_text(run)))
    }

    /// Rewrite each run of adjacent text nodes as one string, so a tag split
    /// across nodes by a streaming renderer still matches. Runs without a
    /// complete tag keep their original nodes.
    fn rewrite_children(&mut self, children: &[Node]) -> Vec<Node> {
        let mut out = Vec::with_capacity(children.len());
        for run in text_runs(children) {
            let Some(Node::Text(_)) = run.first() else {
                out.extend_from_slice(run);
                continue;
            };
            let joined = join_text(run);
            let mut pieces = Vec::new();
            if self.scanner.pattern.might_contain(&joined)
                && self.split_text(&joined, &mut pieces) > 0
            {
                out.append(&mut pieces);
            } else {
                out.extend_from_slice(run);
            }
        }
        out
    }

    /// Split one text run into text and widgets, in document order.
    ///
    /// Returns the number of regions turned into widgets.
    fn split_text(&mut self, text: &str, out: &mut Vec<Node>) -> usize {
        let mut last = 0;
        let mut regions = 0;
        for found in self.scanner.pattern.matches(text) {
            let tag = match found.to_tag() {
                Ok(Some(tag)) => tag,
                // Still streaming in
                Ok(None) => continue,
                Err(source) => {
                    warn!(
                        target: "voicetag.scanner",
                        document = %self.target,
                        error = %source,
                        "Leaving malformed voice tag as text"
                    );
                    self.report.errors.push(ScanError::MalformedTag {
                        target: self.target,
                        source,
                    });
                    continue;
                }
            };
            if found.range.start > last {
                out.push(Node::Text(text[last..found.range.start].to_string()));
            }
            out.push(Node::Element(self.materialize(&tag)));
            self.report.regions_rewritten += 1;
            regions += 1;
            last = found.range.end;
        }
        if last < text.len() {
            out.push(Node::Text(text[last..].to_string()));
        }
        regions
    }

    /// Widget markup for a freshly discovered tag.
    ///
    /// A `waiting` tag is handed to the scheduler before this returns when
    /// auto-generation is on.
    fn materialize(&mut self, tag: &BubbleTag) -> Element {
        let key = tag.key();
        let (mut status, mut locator) = resolve_status(self.ctx, &key);
        if status == BubbleStatus::Waiting && self.settings.auto_generate {
            let outcome = self.ctx.scheduler.enqueue_tag(tag);
            if outcome == EnqueueOutcome::Enqueued {
                self.report.tasks_enqueued += 1;
            }
            status = outcome.status();
            if status == BubbleStatus::Ready {
                (status, locator) = resolve_status(self.ctx, &key);
            }
        }
        self.render(&BubbleView::new(tag, status, locator))
    }

    /// Repaint an existing widget if its state drifted.
    fn reconcile(&mut self, widget: &mut Element) -> usize {
        let Some(view) = BubbleView::from_element(widget) else {
            return 0;
        };
        let (status, locator) = resolve_status(self.ctx, &view.key);
        if status == view.status && locator == view.locator {
            return 0;
        }
        if let Err(source) = view.status.transition(status) {
            warn!(
                target: "voicetag.scanner",
                key = %view.key.short(),
                error = %source,
                "Widget state desync"
            );
            self.report.errors.push(ScanError::IllegalTransition {
                target: self.target,
                key: view.key,
                source,
            });
            return 0;
        }
        *widget = self.render(&view.with_status(status, locator));
        self.report.widgets_repainted += 1;
        1
    }

    /// Reuse cached markup iff it was rendered for the same state.
    fn render(&mut self, view: &BubbleView) -> Element {
        let mut cache = self.ctx.state.render();
        if let Some(markup) = cache.lookup(&view.key, view.status) {
            self.report.cache_hits += 1;
            return markup.clone();
        }
        let markup = render_bubble(view);
        cache.insert(view.key.clone(), view.status, markup.clone());
        self.report.bubbles_rendered += 1;
        markup
    }
}
