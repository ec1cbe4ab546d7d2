//! The command log: a stack of inverse operations for every reversible user
//! action, dispatched by a generic undo/redo pair.
//!
//! Actions are plain data — an enum carrying the pre-state payload needed to
//! restore what the action changed — rather than captured closures. The
//! session owns application of the inverses, since rule re-evaluation and
//! staging recomputation follow every restore. Undo and redo never touch
//! disk; they only mutate staged state.

use std::path::PathBuf;

use serde::Serialize;

use crate::rules::Rule;
use crate::tree::NodeRef;

/// Per-node payload for undoing a manual move: exactly the destination map
/// entries the move overwrote, not a full tree snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveSnapshot {
    pub id: NodeRef,
    pub before_destination: PathBuf,
    pub before_manually_moved: bool,
    pub after_destination: PathBuf,
}

/// One reversible user action with the state needed to run it in either
/// direction.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "action")]
pub enum UndoAction {
    RuleAdded {
        rule: Rule,
    },
    RuleRemoved {
        rule: Rule,
        index: usize,
    },
    NodesMoved {
        moves: Vec<MoveSnapshot>,
    },
    Renamed {
        id: NodeRef,
        old_name: String,
        new_name: String,
        old_destination: PathBuf,
        new_destination: PathBuf,
        /// Whether the node was already frozen against rule evaluation
        /// before the rename (renaming freezes it).
        was_manually_moved: bool,
    },
    /// Undoing a virtual folder discards unsaved state via a full rescan;
    /// redo recreates the folder by name under the recorded parent path.
    VirtualFolderCreated {
        name: String,
        parent_destination: PathBuf,
    },
}

impl UndoAction {
    /// Short human-readable description, used in status text.
    pub fn describe(&self) -> String {
        match self {
            UndoAction::RuleAdded { rule } => format!("add {} rule", rule.kind),
            UndoAction::RuleRemoved { rule, .. } => format!("remove {} rule", rule.kind),
            UndoAction::NodesMoved { moves } => format!("move {} item(s)", moves.len()),
            UndoAction::Renamed { new_name, .. } => format!("rename to {new_name}"),
            UndoAction::VirtualFolderCreated { name, .. } => format!("create folder {name}"),
        }
    }
}

/// Paired undo/redo stacks. Pushing a new action clears the redo side, the
/// usual editor discipline.
#[derive(Debug, Default)]
pub struct UndoStack {
    undo: Vec<UndoAction>,
    redo: Vec<UndoAction>,
}

impl UndoStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a freshly performed action.
    pub fn push(&mut self, action: UndoAction) {
        self.undo.push(action);
        self.redo.clear();
    }

    /// Takes the most recent action for undoing. The caller applies the
    /// inverse and then hands the action back via [`UndoStack::mark_undone`].
    pub fn pop_undo(&mut self) -> Option<UndoAction> {
        self.undo.pop()
    }

    pub fn mark_undone(&mut self, action: UndoAction) {
        self.redo.push(action);
    }

    /// Takes the most recently undone action for redoing; hand it back via
    /// [`UndoStack::mark_redone`].
    pub fn pop_redo(&mut self) -> Option<UndoAction> {
        self.redo.pop()
    }

    pub fn mark_redone(&mut self, action: UndoAction) {
        self.undo.push(action);
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Drops everything. Used whenever the tree is rebuilt from disk, since
    /// recorded node ids do not survive a rescan.
    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}
