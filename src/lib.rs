pub mod cli;

mod content;
mod execute;
mod links;
pub mod logging;
mod matching;
mod rules;
mod session;
mod staging;
mod tree;
mod undo;

pub use content::{EditRecord, EditScope, SearchResult};
pub use execute::ExecutionReport;
pub use links::{PathMap, REPAIRABLE_EXTENSIONS};
pub use matching::{expand_replacement, MatchHit, MatchMode, Matcher};
pub use rules::{Rule, RuleId, RuleKind};
pub use session::{Session, SessionError, SessionEvent, TreeView};
pub use staging::StagedChange;
pub use tree::{scan, FileTree, Node, NodeRef};
pub use undo::{MoveSnapshot, UndoAction, UndoStack};
