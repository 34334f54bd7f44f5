//! Decision log with undo/redo.
//!
//! Every successful command appends a decision holding the floor before and
//! after it. Floors are immutable `Arc` versions shared with the live state,
//! so undo and redo only move the cursor and swap a pointer. Recording a new
//! floor decision after an undo discards the undone decisions; pause, resume
//! and speed markers are appended without touching them.

use crate::floor::Floor;
use serde::{Deserialize, Serialize};
use shop_core::{OrderId, SimTime};
use std::fmt;
use std::sync::Arc;

/// Identifies a logged decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DecisionId(pub u64);

impl fmt::Display for DecisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DEC-{:04}", self.0)
    }
}

/// Kind of user action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionKind {
    OrderRelease,
    Schedule,
    Rebalance,
    RouteChange,
    SettingsChange,
    Pause,
    Resume,
}

impl DecisionKind {
    /// Only floor-changing actions can be undone.
    pub fn is_reversible(self) -> bool {
        matches!(
            self,
            DecisionKind::OrderRelease
                | DecisionKind::Schedule
                | DecisionKind::Rebalance
                | DecisionKind::RouteChange
        )
    }
}

/// A user action as shown in the history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub id: DecisionId,
    pub at: SimTime,
    pub kind: DecisionKind,
    pub description: String,
    pub order: Option<OrderId>,
    pub can_undo: bool,
}

#[derive(Clone, Debug)]
struct Entry {
    decision: Decision,
    before: Arc<Floor>,
    after: Arc<Floor>,
}

/// Append-only history plus an undo cursor.
#[derive(Clone, Debug, Default)]
pub struct DecisionLog {
    entries: Vec<Entry>,
    /// Index of the most recently applied decision.
    cursor: Option<usize>,
    next_id: u64,
}

impl DecisionLog {
    /// Append a decision. A reversible one discards the undone decisions
    /// after the cursor; a marker keeps them redoable.
    pub fn record(
        &mut self,
        kind: DecisionKind,
        at: SimTime,
        description: String,
        order: Option<OrderId>,
        before: Arc<Floor>,
        after: Arc<Floor>,
    ) -> DecisionId {
        let reversible = kind.is_reversible();
        let redo_pending = self.can_redo();
        if reversible {
            let cursor = self.cursor;
            let mut idx = 0;
            self.entries.retain(|e| {
                let keep = cursor.is_some_and(|c| idx <= c) || !e.decision.can_undo;
                idx += 1;
                keep
            });
        }
        self.next_id += 1;
        let id = DecisionId(self.next_id);
        self.entries.push(Entry {
            decision: Decision {
                id,
                at,
                kind,
                description,
                order,
                can_undo: kind.is_reversible(),
            },
            before,
            after,
        });
        if reversible || !redo_pending {
            self.cursor = Some(self.entries.len() - 1);
        }
        id
    }

    /// Step back to the nearest reversible decision at or before the cursor
    /// and return the floor it replaced.
    pub fn undo(&mut self) -> Option<Arc<Floor>> {
        let cursor = self.cursor?;
        let idx = (0..=cursor)
            .rev()
            .find(|&i| self.entries[i].decision.can_undo)?;
        self.cursor = idx.checked_sub(1);
        Some(Arc::clone(&self.entries[idx].before))
    }

    /// Reapply the nearest reversible decision after the cursor and return
    /// the floor it produced.
    pub fn redo(&mut self) -> Option<Arc<Floor>> {
        let from = self.cursor.map_or(0, |c| c + 1);
        let idx = (from..self.entries.len()).find(|&i| self.entries[i].decision.can_undo)?;
        self.cursor = Some(idx);
        Some(Arc::clone(&self.entries[idx].after))
    }

    pub fn can_undo(&self) -> bool {
        self.cursor
            .is_some_and(|c| (0..=c).any(|i| self.entries[i].decision.can_undo))
    }

    pub fn can_redo(&self) -> bool {
        let from = self.cursor.map_or(0, |c| c + 1);
        (from..self.entries.len()).any(|i| self.entries[i].decision.can_undo)
    }

    /// Drop all history and reset the cursor.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = None;
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn decisions(&self) -> impl Iterator<Item = &Decision> {
        self.entries.iter().map(|e| &e.decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floor(generated: u64) -> Arc<Floor> {
        Arc::new(Floor {
            total_orders_generated: generated,
            ..Floor::default()
        })
    }

    fn record(log: &mut DecisionLog, kind: DecisionKind, before: u64, after: u64) -> DecisionId {
        log.record(kind, SimTime::ZERO, format!("{kind:?}"), None, floor(before), floor(after))
    }

    #[test]
    fn undo_then_redo_moves_cursor() {
        let mut log = DecisionLog::default();
        record(&mut log, DecisionKind::OrderRelease, 0, 1);
        record(&mut log, DecisionKind::Rebalance, 1, 2);
        assert_eq!(log.cursor(), Some(1));

        assert_eq!(log.undo().map(|f| f.total_orders_generated), Some(1));
        assert_eq!(log.cursor(), Some(0));
        assert_eq!(log.undo().map(|f| f.total_orders_generated), Some(0));
        assert_eq!(log.cursor(), None);
        assert!(log.undo().is_none());

        assert_eq!(log.redo().map(|f| f.total_orders_generated), Some(1));
        assert_eq!(log.redo().map(|f| f.total_orders_generated), Some(2));
        assert!(log.redo().is_none());
    }

    #[test]
    fn new_decision_truncates_redo_tail() {
        let mut log = DecisionLog::default();
        record(&mut log, DecisionKind::OrderRelease, 0, 1);
        record(&mut log, DecisionKind::OrderRelease, 1, 2);
        log.undo();
        let id = record(&mut log, DecisionKind::Schedule, 1, 3);
        assert_eq!(log.len(), 2);
        assert!(!log.can_redo());
        assert_eq!(id, DecisionId(3));
    }

    #[test]
    fn markers_are_skipped() {
        let mut log = DecisionLog::default();
        record(&mut log, DecisionKind::OrderRelease, 0, 1);
        record(&mut log, DecisionKind::Pause, 1, 1);
        assert!(log.can_undo());
        assert_eq!(log.undo().map(|f| f.total_orders_generated), Some(0));
        assert_eq!(log.cursor(), None);

        let mut only_markers = DecisionLog::default();
        record(&mut only_markers, DecisionKind::SettingsChange, 0, 0);
        assert!(!only_markers.can_undo());
        assert!(only_markers.undo().is_none());
        assert_eq!(only_markers.cursor(), Some(0));
    }

    #[test]
    fn marker_after_undo_keeps_redo() {
        let mut log = DecisionLog::default();
        record(&mut log, DecisionKind::OrderRelease, 0, 1);
        log.undo();
        record(&mut log, DecisionKind::Pause, 0, 0);
        assert_eq!(log.len(), 2);
        assert!(log.can_redo());
        assert_eq!(log.redo().map(|f| f.total_orders_generated), Some(1));
        assert_eq!(log.cursor(), Some(0));

        // A floor decision drops undone entries but keeps the marker.
        log.undo();
        record(&mut log, DecisionKind::Schedule, 0, 5);
        let kinds: Vec<DecisionKind> = log.decisions().map(|d| d.kind).collect();
        assert_eq!(kinds, vec![DecisionKind::Pause, DecisionKind::Schedule]);
        assert!(!log.can_redo());
        assert_eq!(log.undo().map(|f| f.total_orders_generated), Some(0));
    }

    #[test]
    fn clear_resets_everything() {
        let mut log = DecisionLog::default();
        record(&mut log, DecisionKind::OrderRelease, 0, 1);
        log.clear();
        assert!(log.is_empty());
        assert_eq!(log.cursor(), None);
        assert_eq!(log.decisions().count(), 0);
    }
}
