// ⚖️ Reconciliation Engine - bring a displayed table in line with fresh data
//
// Following the rule:
//   previous snapshot + new collection -> (removed, added, changed)
//
// Rows are matched by primary key. A row is "changed" when any field differs.
// The three sets are disjoint, and the table applies only what moved, so
// untouched rows and the current selection survive a refresh.

use crate::entities::Record;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

// ============================================================================
// RECONCILIATION RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diff<R> {
    /// Keys present before and missing now.
    pub removed: Vec<i64>,
    /// Rows whose key was not in the previous snapshot, in collection order.
    pub added: Vec<R>,
    /// Rows present in both whose content differs, in collection order.
    pub changed: Vec<R>,
}

impl<R> Diff<R> {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty() && self.changed.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} added, {} changed, {} removed",
            self.added.len(),
            self.changed.len(),
            self.removed.len()
        )
    }
}

/// Compare `next` against `previous` by primary key.
pub fn diff<R: Record>(previous: &[R], next: &[R]) -> Diff<R> {
    let before: HashMap<i64, &R> = previous.iter().map(|r| (r.key(), r)).collect();
    let now: HashSet<i64> = next.iter().map(Record::key).collect();

    let removed = previous
        .iter()
        .map(Record::key)
        .filter(|key| !now.contains(key))
        .collect();

    let mut added = Vec::new();
    let mut changed = Vec::new();
    for row in next {
        match before.get(&row.key()) {
            None => added.push(row.clone()),
            Some(old) if *old != row => changed.push(row.clone()),
            Some(_) => {}
        }
    }

    Diff {
        removed,
        added,
        changed,
    }
}

// ============================================================================
// TABLE MODEL
// ============================================================================

/// Rows as currently displayed, plus the selected row's key.
#[derive(Debug, Clone, PartialEq)]
pub struct TableModel<R> {
    rows: Vec<R>,
    selected: Option<i64>,
}

impl<R: Record> Default for TableModel<R> {
    fn default() -> Self {
        TableModel {
            rows: Vec::new(),
            selected: None,
        }
    }
}

impl<R: Record> TableModel<R> {
    pub fn rows(&self) -> &[R] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn selected(&self) -> Option<i64> {
        self.selected
    }

    pub fn selected_row(&self) -> Option<&R> {
        let key = self.selected?;
        self.rows.iter().find(|r| r.key() == key)
    }

    pub fn selected_index(&self) -> Option<usize> {
        let key = self.selected?;
        self.rows.iter().position(|r| r.key() == key)
    }

    pub fn select(&mut self, key: Option<i64>) {
        self.selected = key;
    }

    /// Move the selection by `delta` rows, clamped to the table.
    pub fn move_selection(&mut self, delta: isize) {
        if self.rows.is_empty() {
            self.selected = None;
            return;
        }

        let last = self.rows.len() as isize - 1;
        let index = match self.selected_index() {
            Some(i) => (i as isize + delta).clamp(0, last),
            None => 0,
        };
        self.selected = Some(self.rows[index as usize].key());
    }

    /// Remove, update in place, then append.
    pub fn apply(&mut self, diff: &Diff<R>) {
        if !diff.removed.is_empty() {
            let gone: HashSet<i64> = diff.removed.iter().copied().collect();
            self.rows.retain(|r| !gone.contains(&r.key()));
            if self.selected.is_some_and(|key| gone.contains(&key)) {
                self.selected = None;
            }
        }

        for row in &diff.changed {
            if let Some(slot) = self.rows.iter_mut().find(|r| r.key() == row.key()) {
                *slot = row.clone();
            }
        }

        self.rows.extend(diff.added.iter().cloned());
    }
}

// ============================================================================
// RECONCILIATION ENGINE
// ============================================================================

/// Snapshot of the last collection seen, and the table it feeds.
pub struct ReconciliationEngine<R> {
    snapshot: Vec<R>,
    table: TableModel<R>,
}

impl<R: Record> Default for ReconciliationEngine<R> {
    fn default() -> Self {
        ReconciliationEngine {
            snapshot: Vec::new(),
            table: TableModel::default(),
        }
    }
}

impl<R: Record> ReconciliationEngine<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> &[R] {
        &self.snapshot
    }

    pub fn table(&self) -> &TableModel<R> {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut TableModel<R> {
        &mut self.table
    }

    /// Diff `next` against the snapshot, apply it to the table and keep
    /// `next` as the new snapshot, whether or not anything changed.
    pub fn reconcile(&mut self, next: Vec<R>) -> Diff<R> {
        let diff = diff(&self.snapshot, &next);
        if !diff.is_empty() {
            self.table.apply(&diff);
        }
        self.snapshot = next;
        diff
    }
}
