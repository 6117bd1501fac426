//! Bubble state-sync pass and widget queries.
//!
//! Generation completes out of band from the mutation-driven scan cycle, so
//! nothing else would repaint a widget stuck in `queued`. This pass runs
//! after every completion notification.

use tracing::{debug, warn};
use voicetag_core::{AudioLocator, BubbleStatus, TaskKey};

use crate::dom::{DocumentTarget, Element, MutationKind, Page};
use crate::scanner::markup::{BubbleView, render_bubble};
use crate::scanner::{ScanContext, resolve_status};
use crate::state::SessionState;

/// What a sync or repaint did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub repainted: usize,
    /// Widgets left alone because the edge is not in the transition table.
    pub rejected: usize,
}

/// Repaint every `queued` widget whose task has resolved.
///
/// The render cache entry of every repainted key is dropped so a later scan
/// cannot resurrect the stale loading markup.
pub fn sync_states(page: &mut Page, ctx: &ScanContext<'_>) -> SyncReport {
    let mut report = SyncReport::default();
    for target in page.targets() {
        let Some(doc) = page.document_mut(target) else {
            continue;
        };
        let mut writes = 0;
        doc.body.walk_descendants_mut(&mut |element| {
            let Some(view) = BubbleView::from_element(element) else {
                return;
            };
            if view.status != BubbleStatus::Queued {
                return;
            }
            let (status, locator) = resolve_status(ctx, &view.key);
            if status == BubbleStatus::Queued {
                return;
            }
            if repaint(element, view, status, locator, ctx.state, target) {
                writes += 1;
            } else {
                report.rejected += 1;
            }
        });
        for _ in 0..writes {
            page.record(target, MutationKind::ChildList);
        }
        report.repainted += writes;
    }
    if report.repainted > 0 {
        debug!(
            target: "voicetag.sync",
            repainted = report.repainted,
            "State-sync repainted widgets"
        );
    }
    report
}

/// Force every widget for `key`, in every document, into `status`.
pub fn repaint_key(
    page: &mut Page,
    state: &SessionState,
    key: &TaskKey,
    status: BubbleStatus,
    locator: Option<&AudioLocator>,
) -> SyncReport {
    let mut report = SyncReport::default();
    for target in page.targets() {
        let Some(doc) = page.document_mut(target) else {
            continue;
        };
        let mut writes = 0;
        doc.body.walk_descendants_mut(&mut |element| {
            let Some(view) = BubbleView::from_element(element) else {
                return;
            };
            if &view.key != key || (view.status == status && view.locator.as_ref() == locator) {
                return;
            }
            if repaint(element, view, status, locator.cloned(), state, target) {
                writes += 1;
            } else {
                report.rejected += 1;
            }
        });
        for _ in 0..writes {
            page.record(target, MutationKind::ChildList);
        }
        report.repainted += writes;
    }
    report
}

fn repaint(
    element: &mut Element,
    view: BubbleView,
    status: BubbleStatus,
    locator: Option<AudioLocator>,
    state: &SessionState,
    target: DocumentTarget,
) -> bool {
    if let Err(e) = view.status.transition(status) {
        warn!(
            target: "voicetag.sync",
            document = %target,
            key = %view.key.short(),
            error = %e,
            "Refusing widget repaint"
        );
        return false;
    }
    state.render().remove(&view.key);
    *element = render_bubble(&view.with_status(status, locator));
    true
}

/// First widget for `key`, main document first.
pub fn find_widget(page: &Page, key: &TaskKey) -> Option<(DocumentTarget, BubbleView)> {
    page.targets()
        .into_iter()
        .find_map(|target| find_widget_in(page, target, key).map(|view| (target, view)))
}

/// First widget for `key` inside one document.
pub fn find_widget_in(page: &Page, target: DocumentTarget, key: &TaskKey) -> Option<BubbleView> {
    let doc = page.document(target)?;
    let mut found = None;
    doc.body.walk(&mut |element| {
        if found.is_none() {
            found = BubbleView::from_element(element).filter(|view| &view.key == key);
        }
    });
    found
}

/// Every widget in `status`, across all reachable documents, in document order.
pub fn widgets_in_state(page: &Page, status: BubbleStatus) -> Vec<(DocumentTarget, BubbleView)> {
    let mut out = Vec::new();
    for target in page.targets() {
        let Some(doc) = page.document(target) else {
            continue;
        };
        doc.body.walk(&mut |element| {
            if let Some(view) = BubbleView::from_element(element) {
                if view.status == status {
                    out.push((target, view));
                }
            }
        });
    }
    out
}
