//! Change watcher.
//!
//! Turns mutation records into scan passes. Any child-list or
//! character-data mutation triggers a rescan; attribute changes do not.
//! Requests that arrive while a pass is running are coalesced into a single
//! follow-up pass, and passes repeat only while the previous one produced
//! relevant mutations of its own.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{trace, warn};

use crate::dom::{Mutation, MutationKind};

/// Whether a mutation can have introduced raw tag text.
pub const fn is_relevant(mutation: &Mutation) -> bool {
    matches!(
        mutation.kind,
        MutationKind::ChildList | MutationKind::CharacterData
    )
}

/// Result of feeding a mutation batch to the watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    /// No relevant mutation in the batch.
    Ignored,
    /// A pass loop is already running; it will pick this batch up.
    Coalesced,
    Scanned {
        passes: usize,
        /// `false` when the pass cap was hit with work still dirty.
        converged: bool,
    },
}

/// Coalescing scan trigger.
#[derive(Debug)]
pub struct ChangeWatcher {
    scanning: AtomicBool,
    dirty: AtomicBool,
    max_passes: usize,
}

impl ChangeWatcher {
    pub const fn new(max_passes: usize) -> Self {
        Self {
            scanning: AtomicBool::new(false),
            dirty: AtomicBool::new(false),
            max_passes: if max_passes == 0 { 1 } else { max_passes },
        }
    }

    /// Feed a mutation batch.
    ///
    /// `pass` runs one scan and returns the mutations that scan produced.
    pub fn observe<F>(&self, mutations: &[Mutation], mut pass: F) -> WatchOutcome
    where
        F: FnMut() -> Vec<Mutation>,
    {
        if !mutations.iter().any(is_relevant) {
            return WatchOutcome::Ignored;
        }
        self.dirty.store(true, Ordering::SeqCst);
        if self
            .scanning
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            trace!(target: "voicetag.watcher", "Scan in progress, coalescing");
            return WatchOutcome::Coalesced;
        }

        let mut passes = 0;
        let mut converged = true;
        loop {
            while self.dirty.swap(false, Ordering::SeqCst) {
                if passes == self.max_passes {
                    converged = false;
                    break;
                }
                passes += 1;
                if pass().iter().any(is_relevant) {
                    self.dirty.store(true, Ordering::SeqCst);
                }
            }
            self.scanning.store(false, Ordering::SeqCst);

            // A batch may have landed between the last swap and the release
            if !converged
                || !self.dirty.load(Ordering::SeqCst)
                || self
                    .scanning
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
            {
                break;
            }
        }

        if !converged {
            warn!(
                target: "voicetag.watcher",
                passes,
                "Scan passes did not converge"
            );
        }
        WatchOutcome::Scanned { passes, converged }
    }
}
