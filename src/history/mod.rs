//! Snapshot-based undo/redo over the whole palace.
//!
//! Each entry is a complete copy of all four collections. Entries are held
//! behind `Arc` so moving a snapshot between `past`, `present` and `future`
//! never copies it, and the present snapshot can be handed out cheaply (the
//! periodic backup reads it). The live collections are only copied on commit
//! and on restore.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::model::Collections;
use crate::repository::Repository;

/// Default number of undo steps kept.
pub const DEFAULT_MAX_DEPTH: usize = 20;

/// Undo/redo history for a [`Repository`].
#[derive(Debug, Clone)]
pub struct History {
    /// Oldest first.
    past: VecDeque<Arc<Collections>>,
    present: Arc<Collections>,
    /// Soonest first.
    future: VecDeque<Arc<Collections>>,
    max_depth: usize,
}

impl History {
    /// Start a history whose present is the repository's current state.
    #[must_use]
    pub fn new(repo: &Repository, max_depth: usize) -> Self {
        Self {
            past: VecDeque::new(),
            present: Arc::new(repo.collections().clone()),
            future: VecDeque::new(),
            max_depth,
        }
    }

    /// Forget all undo and redo steps and take the repository's state as present.
    pub fn reset(&mut self, repo: &Repository) {
        self.past.clear();
        self.future.clear();
        self.present = Arc::new(repo.collections().clone());
    }

    /// Record the repository's current state as a new step.
    ///
    /// Clears the redo chain. When more than `max_depth` steps are held, the
    /// oldest are dropped.
    pub fn commit(&mut self, repo: &Repository) {
        let snapshot = Arc::new(repo.collections().clone());
        let previous = std::mem::replace(&mut self.present, snapshot);
        self.past.push_back(previous);
        self.future.clear();

        while self.past.len() > self.max_depth {
            self.past.pop_front();
        }
    }

    /// Step back one commit, restoring the repository. Returns `false` if
    /// there is nothing to undo.
    pub fn undo(&mut self, repo: &mut Repository) -> bool {
        let Some(previous) = self.past.pop_back() else {
            return false;
        };
        let current = std::mem::replace(&mut self.present, previous);
        self.future.push_front(current);
        repo.replace(Collections::clone(&self.present));
        true
    }

    /// Step forward one undone commit, restoring the repository. Returns
    /// `false` if there is nothing to redo.
    pub fn redo(&mut self, repo: &mut Repository) -> bool {
        let Some(next) = self.future.pop_front() else {
            return false;
        };
        let current = std::mem::replace(&mut self.present, next);
        self.past.push_back(current);
        repo.replace(Collections::clone(&self.present));
        true
    }

    /// The most recently committed (or restored) state.
    #[must_use]
    pub fn present(&self) -> &Arc<Collections> {
        &self.present
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    #[must_use]
    pub fn past_len(&self) -> usize {
        self.past.len()
    }

    #[must_use]
    pub fn future_len(&self) -> usize {
        self.future.len()
    }

    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }
}
