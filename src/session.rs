//! The single logical owner of the staged-mutation state.
//!
//! A [`Session`] holds the canonical tree, rule list, undo log, and staged
//! change list for one open root, guarded by a mutex. Fast mutations (rule
//! edits, drags, renames, virtual folders, reverts, undo/redo) run on the
//! caller's thread. Long-running operations — rescan, content search,
//! content-edit staging, and execution — run on a single owned job thread
//! and apply their results back to canonical state as one atomic update.
//!
//! Only one job is ever in flight. While the busy token is held, further job
//! requests and structural mutations are rejected with
//! [`SessionError::Busy`] rather than queued; callers retry when the
//! completion event arrives. There is no cancellation.

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::{select, Receiver, Sender};
use serde::Serialize;
use thiserror::Error;

use shadowfs::Vfs;

use crate::content::{self, EditRecord, EditScope, SearchResult};
use crate::execute::{execute, ExecutionReport};
use crate::matching::{MatchMode, Matcher};
use crate::rules::{apply_rules, Rule, RuleId, RuleKind};
use crate::staging::{compute_staged_changes, StagedChange};
use crate::tree::{scan, FileTree, NodeRef};
use crate::undo::{MoveSnapshot, UndoAction, UndoStack};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("another operation is in progress")]
    Busy,

    #[error("unknown item id {0}")]
    UnknownId(NodeRef),

    #[error("target {0} is not a folder")]
    NotAFolder(NodeRef),

    #[error("unknown rule id")]
    UnknownRule,

    #[error("nothing to undo")]
    NothingToUndo,

    #[error("nothing to redo")]
    NothingToRedo,

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Notifications emitted when a background job completes. Mutations on the
/// caller's thread don't produce events; their effects are visible through
/// the observers as soon as the call returns.
#[derive(Debug)]
pub enum SessionEvent {
    ScanCompleted { entries: usize },
    SearchCompleted { results: Vec<SearchResult> },
    EditsStaged { records: Vec<EditRecord> },
    ExecutionCompleted { report: ExecutionReport },
}

/// Serializable view of one tree node, nested. What a front end renders.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeView {
    pub id: NodeRef,
    pub name: String,
    pub original_path: PathBuf,
    pub destination_path: PathBuf,
    pub is_directory: bool,
    pub is_virtual: bool,
    pub is_manually_moved: bool,
    pub is_moved: bool,
    pub is_content_modified: bool,
    pub children: Vec<TreeView>,
}

struct EngineState {
    tree: FileTree,
    rules: Vec<Rule>,
    undo: UndoStack,
    staged: Vec<StagedChange>,
    status: String,
}

enum Job {
    Rescan,
    Search {
        text: String,
        mode: MatchMode,
        case_sensitive: bool,
    },
    StageEdit {
        find: String,
        replace: String,
        scope: EditScope,
        extensions: Option<Vec<String>>,
        mode: MatchMode,
        case_sensitive: bool,
    },
    Execute,
}

/// All of the state for one open root.
pub struct Session {
    state: Arc<Mutex<EngineState>>,
    vfs: Arc<Vfs>,
    busy: Arc<AtomicBool>,
    job_sender: Sender<Job>,
    event_receiver: Receiver<SessionEvent>,

    /// Signals the job thread to stop. Must fire before the job thread
    /// handle drops or we'd block forever joining its loop.
    shutdown_sender: Sender<()>,

    /// Joined on drop; kept for its side effect.
    #[allow(unused)]
    job_thread: jod_thread::JoinHandle<()>,
}

impl Session {
    /// Opens a root: scans it synchronously and starts the job thread.
    pub fn open(vfs: Vfs, root_path: impl Into<PathBuf>) -> io::Result<Session> {
        let root_path = root_path.into();
        log::trace!("Opening session at {}", root_path.display());

        let tree = scan(&vfs, &root_path)?;
        let entries = tree.len() - 1;

        let state = Arc::new(Mutex::new(EngineState {
            tree,
            rules: Vec::new(),
            undo: UndoStack::new(),
            staged: Vec::new(),
            status: format!("Scanned {entries} item(s)"),
        }));
        let vfs = Arc::new(vfs);
        let busy = Arc::new(AtomicBool::new(false));

        let (job_sender, job_receiver) = crossbeam_channel::unbounded();
        let (event_sender, event_receiver) = crossbeam_channel::unbounded();
        let (shutdown_sender, shutdown_receiver) = crossbeam_channel::bounded(1);

        let runner = JobRunner {
            state: Arc::clone(&state),
            vfs: Arc::clone(&vfs),
            root_path,
            busy: Arc::clone(&busy),
            event_sender,
        };

        let job_thread = jod_thread::Builder::new()
            .name("stagehand job thread".to_owned())
            .spawn(move || loop {
                select! {
                    recv(job_receiver) -> job => {
                        match job {
                            Ok(job) => runner.run(job),
                            Err(_) => return,
                        }
                    },
                    recv(shutdown_receiver) -> _ => {
                        log::trace!("Job thread shutting down");
                        return;
                    },
                }
            })
            .expect("Could not start job thread");

        Ok(Session {
            state,
            vfs,
            busy,
            job_sender,
            event_receiver,
            shutdown_sender,
            job_thread,
        })
    }

    // ---- observers ----------------------------------------------------

    pub fn tree_view(&self) -> TreeView {
        let state = self.state.lock().unwrap();
        build_view(&state.tree, state.tree.root_id())
    }

    pub fn staged_changes(&self) -> Vec<StagedChange> {
        self.state.lock().unwrap().staged.clone()
    }

    pub fn rules(&self) -> Vec<Rule> {
        self.state.lock().unwrap().rules.clone()
    }

    pub fn status(&self) -> String {
        self.state.lock().unwrap().status.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn can_undo(&self) -> bool {
        self.state.lock().unwrap().undo.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.state.lock().unwrap().undo.can_redo()
    }

    /// Completion events for background jobs. The receiver can be cloned;
    /// each event is delivered to one receiver.
    pub fn events(&self) -> Receiver<SessionEvent> {
        self.event_receiver.clone()
    }

    /// Finds a node id by display name, first match pre-order. Convenience
    /// for command surfaces that address items by name.
    pub fn find_by_name(&self, name: &str) -> Option<NodeRef> {
        let state = self.state.lock().unwrap();
        state
            .tree
            .descendants(state.tree.root_id())
            .find(|node| node.name == name)
            .map(|node| node.id)
    }

    // ---- mutations (caller thread) ------------------------------------

    pub fn add_rule(
        &self,
        kind: RuleKind,
        criteria: impl Into<String>,
        target_folder: impl Into<String>,
    ) -> Result<RuleId, SessionError> {
        self.ensure_idle()?;
        let mut state = self.state.lock().unwrap();

        let rule = Rule::new(kind, criteria, target_folder);
        let id = rule.id;
        log::debug!("Adding {} rule -> {}", rule.kind, rule.target_folder);

        state.undo.push(UndoAction::RuleAdded { rule: rule.clone() });
        state.rules.push(rule);

        self.reapply_and_recompute(&mut state);
        Ok(id)
    }

    pub fn remove_rule(&self, id: RuleId) -> Result<(), SessionError> {
        self.ensure_idle()?;
        let mut state = self.state.lock().unwrap();

        let index = state
            .rules
            .iter()
            .position(|rule| rule.id == id)
            .ok_or(SessionError::UnknownRule)?;
        let rule = state.rules.remove(index);
        state.undo.push(UndoAction::RuleRemoved { rule, index });

        self.reapply_and_recompute(&mut state);
        Ok(())
    }

    /// Moves the given items into the target folder. The move takes
    /// precedence over rules until reverted. Items that would end up inside
    /// their own original subtree are left unchanged. Returns how many items
    /// actually moved.
    pub fn manual_move(&self, ids: &[NodeRef], target: NodeRef) -> Result<usize, SessionError> {
        self.ensure_idle()?;
        let mut state = self.state.lock().unwrap();

        let target_node = state
            .tree
            .get(target)
            .ok_or(SessionError::UnknownId(target))?;
        if !target_node.is_directory {
            return Err(SessionError::NotAFolder(target));
        }
        let target_destination = target_node.destination_path.clone();

        let mut moves = Vec::new();
        for &id in ids {
            let node = match state.tree.get(id) {
                Some(node) => node,
                None => {
                    log::warn!("Ignoring unknown item {id} in move");
                    continue;
                }
            };

            // A folder can never be staged into itself or its own subtree.
            if node.is_directory && target_destination.starts_with(&node.original_path) {
                log::warn!(
                    "Refusing to move {} into its own subtree",
                    node.original_path.display()
                );
                continue;
            }

            let snapshot = MoveSnapshot {
                id,
                before_destination: node.destination_path.clone(),
                before_manually_moved: node.is_manually_moved,
                after_destination: target_destination.join(&node.name),
            };

            let after = snapshot.after_destination.clone();
            state.tree.update(id, |node| {
                node.destination_path = after;
                node.is_manually_moved = true;
            });
            moves.push(snapshot);
        }

        let moved = moves.len();
        if moved > 0 {
            state.undo.push(UndoAction::NodesMoved { moves });
        }

        self.recompute(&mut state);
        Ok(moved)
    }

    /// Renames an item, staging the move to the new leaf name within its
    /// current destination folder. Freezes the item against rule rewrites.
    pub fn rename(&self, id: NodeRef, new_name: impl Into<String>) -> Result<(), SessionError> {
        self.ensure_idle()?;
        let new_name = new_name.into();
        let mut state = self.state.lock().unwrap();

        let node = state.tree.get(id).ok_or(SessionError::UnknownId(id))?;
        let old_name = node.name.clone();
        let old_destination = node.destination_path.clone();
        let was_manually_moved = node.is_manually_moved;
        let new_destination = match old_destination.parent() {
            Some(parent) => parent.join(&new_name),
            None => PathBuf::from(&new_name),
        };

        state.undo.push(UndoAction::Renamed {
            id,
            old_name,
            new_name: new_name.clone(),
            old_destination,
            new_destination: new_destination.clone(),
            was_manually_moved,
        });

        state.tree.update(id, |node| {
            node.name = new_name;
            node.destination_path = new_destination;
            node.is_manually_moved = true;
        });
        if let Some(parent) = state.tree.parent_of(id) {
            state.tree.sort_children(parent);
        }

        self.recompute(&mut state);
        Ok(())
    }

    /// Creates a folder that exists only in staging until commit.
    pub fn create_virtual_folder(
        &self,
        name: impl Into<String>,
        parent: Option<NodeRef>,
    ) -> Result<NodeRef, SessionError> {
        self.ensure_idle()?;
        let name = name.into();
        let mut state = self.state.lock().unwrap();

        let parent_id = parent.unwrap_or_else(|| state.tree.root_id());
        let parent_node = state
            .tree
            .get(parent_id)
            .ok_or(SessionError::UnknownId(parent_id))?;
        if !parent_node.is_directory {
            return Err(SessionError::NotAFolder(parent_id));
        }
        let parent_destination = parent_node.destination_path.clone();

        let id = state.tree.insert_virtual_folder(&name, Some(parent_id));
        state.undo.push(UndoAction::VirtualFolderCreated {
            name,
            parent_destination,
        });

        self.recompute(&mut state);
        Ok(id)
    }

    /// Reverts the staged state of the given items: destination back to
    /// original, manual freeze lifted, pending content dropped. Virtual
    /// folders are skipped; discarding those means a rescan. Reverted items
    /// become eligible for rules again on the next rule change.
    pub fn revert_items(&self, ids: &[NodeRef]) -> Result<usize, SessionError> {
        self.ensure_idle()?;
        let mut state = self.state.lock().unwrap();

        let mut reverted = 0;
        for &id in ids {
            let found = state.tree.update(id, |node| {
                if node.is_virtual {
                    return;
                }
                node.destination_path = node.original_path.clone();
                node.is_manually_moved = false;
                node.is_content_modified = false;
                node.pending_content = None;
            });
            if found {
                reverted += 1;
            }
        }

        self.recompute(&mut state);
        Ok(reverted)
    }

    /// Discards everything staged: rules, pending edits, virtual folders,
    /// and the undo log, then rebuilds the tree from disk.
    pub fn revert_all(&self) -> Result<(), SessionError> {
        self.ensure_idle()?;
        let mut state = self.state.lock().unwrap();

        state.rules.clear();
        state.undo.clear();
        let root = state.tree.root_path().to_path_buf();
        state.tree = scan(&self.vfs, &root)?;

        self.recompute(&mut state);
        state.status = "Reverted all staged changes".to_owned();
        Ok(())
    }

    pub fn undo(&self) -> Result<String, SessionError> {
        self.ensure_idle()?;
        let mut state = self.state.lock().unwrap();

        let action = state.undo.pop_undo().ok_or(SessionError::NothingToUndo)?;
        let description = action.describe();
        log::debug!("Undoing: {description}");

        match &action {
            UndoAction::RuleAdded { rule } => {
                if let Some(index) = state.rules.iter().position(|r| r.same_value(rule)) {
                    state.rules.remove(index);
                }
                state.undo.mark_undone(action);
                self.reapply_and_recompute(&mut state);
            }
            UndoAction::RuleRemoved { rule, index } => {
                let index = (*index).min(state.rules.len());
                state.rules.insert(index, rule.clone());
                state.undo.mark_undone(action);
                self.reapply_and_recompute(&mut state);
            }
            UndoAction::NodesMoved { moves } => {
                for snapshot in moves {
                    let destination = snapshot.before_destination.clone();
                    let manual = snapshot.before_manually_moved;
                    state.tree.update(snapshot.id, |node| {
                        node.destination_path = destination;
                        node.is_manually_moved = manual;
                    });
                }
                state.undo.mark_undone(action);
                self.recompute(&mut state);
            }
            UndoAction::Renamed {
                id,
                old_name,
                old_destination,
                was_manually_moved,
                ..
            } => {
                let (name, destination, manual) = (
                    old_name.clone(),
                    old_destination.clone(),
                    *was_manually_moved,
                );
                let id = *id;
                state.tree.update(id, |node| {
                    node.name = name;
                    node.destination_path = destination;
                    node.is_manually_moved = manual;
                });
                if let Some(parent) = state.tree.parent_of(id) {
                    state.tree.sort_children(parent);
                }
                state.undo.mark_undone(action);
                self.recompute(&mut state);
            }
            UndoAction::VirtualFolderCreated { .. } => {
                // Removing a synthesized node from a live tree is the same
                // as discarding unsaved state: rebuild from disk. Node ids
                // don't survive, so the rest of the log goes with it; the
                // redo record is path-based and stays valid.
                let root = state.tree.root_path().to_path_buf();
                state.tree = scan(&self.vfs, &root)?;
                state.undo.clear();
                state.undo.mark_undone(action);
                self.reapply_and_recompute(&mut state);
            }
        }

        state.status = format!("Undid {description}");
        Ok(description)
    }

    pub fn redo(&self) -> Result<String, SessionError> {
        self.ensure_idle()?;
        let mut state = self.state.lock().unwrap();

        let action = state.undo.pop_redo().ok_or(SessionError::NothingToRedo)?;
        let description = action.describe();
        log::debug!("Redoing: {description}");

        match &action {
            UndoAction::RuleAdded { rule } => {
                state.rules.push(rule.clone());
                state.undo.mark_redone(action);
                self.reapply_and_recompute(&mut state);
            }
            UndoAction::RuleRemoved { rule, .. } => {
                if let Some(index) = state.rules.iter().position(|r| r.same_value(rule)) {
                    state.rules.remove(index);
                }
                state.undo.mark_redone(action);
                self.reapply_and_recompute(&mut state);
            }
            UndoAction::NodesMoved { moves } => {
                for snapshot in moves {
                    let destination = snapshot.after_destination.clone();
                    state.tree.update(snapshot.id, |node| {
                        node.destination_path = destination;
                        node.is_manually_moved = true;
                    });
                }
                state.undo.mark_redone(action);
                self.recompute(&mut state);
            }
            UndoAction::Renamed {
                id,
                new_name,
                new_destination,
                ..
            } => {
                let (name, destination) = (new_name.clone(), new_destination.clone());
                let id = *id;
                state.tree.update(id, |node| {
                    node.name = name;
                    node.destination_path = destination;
                    node.is_manually_moved = true;
                });
                if let Some(parent) = state.tree.parent_of(id) {
                    state.tree.sort_children(parent);
                }
                state.undo.mark_redone(action);
                self.recompute(&mut state);
            }
            UndoAction::VirtualFolderCreated {
                name,
                parent_destination,
            } => {
                // Recreate by name under whatever node now sits at the
                // recorded parent destination, falling back to the root.
                let parent = state
                    .tree
                    .descendants(state.tree.root_id())
                    .find(|node| node.is_directory && node.destination_path == *parent_destination)
                    .map(|node| node.id);
                state.tree.insert_virtual_folder(name, parent);
                state.undo.mark_redone(action);
                self.recompute(&mut state);
            }
        }

        state.status = format!("Redid {description}");
        Ok(description)
    }

    // ---- background jobs ----------------------------------------------

    pub fn request_rescan(&self) -> Result<(), SessionError> {
        self.submit(Job::Rescan)
    }

    pub fn request_search(
        &self,
        text: impl Into<String>,
        mode: MatchMode,
        case_sensitive: bool,
    ) -> Result<(), SessionError> {
        self.submit(Job::Search {
            text: text.into(),
            mode,
            case_sensitive,
        })
    }

    pub fn request_content_edit(
        &self,
        find: impl Into<String>,
        replace: impl Into<String>,
        scope: EditScope,
        extensions: Option<Vec<String>>,
        mode: MatchMode,
        case_sensitive: bool,
    ) -> Result<(), SessionError> {
        self.submit(Job::StageEdit {
            find: find.into(),
            replace: replace.into(),
            scope,
            extensions,
            mode,
            case_sensitive,
        })
    }

    pub fn request_execute(&self) -> Result<(), SessionError> {
        self.submit(Job::Execute)
    }

    /// Blocks until the next completion event. Command-line front ends use
    /// this to wait for the job they just requested.
    pub fn wait_event(&self) -> Option<SessionEvent> {
        self.event_receiver.recv().ok()
    }

    // ---- internals ----------------------------------------------------

    fn ensure_idle(&self) -> Result<(), SessionError> {
        if self.busy.load(Ordering::SeqCst) {
            return Err(SessionError::Busy);
        }
        Ok(())
    }

    fn submit(&self, job: Job) -> Result<(), SessionError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SessionError::Busy);
        }

        // The job thread outlives every sender, so this can only fail
        // during teardown.
        if self.job_sender.send(job).is_err() {
            self.busy.store(false, Ordering::SeqCst);
        }
        Ok(())
    }

    fn reapply_and_recompute(&self, state: &mut EngineState) {
        let rules = state.rules.clone();
        apply_rules(&mut state.tree, &rules);
        self.recompute(state);
    }

    fn recompute(&self, state: &mut EngineState) {
        state.staged = compute_staged_changes(&state.tree, &self.vfs);
        state.status = describe_staged(&state.staged);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Without this the job thread would keep looping and the join on
        // drop would never return.
        let _ = self.shutdown_sender.send(());
    }
}

fn describe_staged(staged: &[StagedChange]) -> String {
    if staged.is_empty() {
        "No pending changes".to_owned()
    } else {
        format!("{} pending change(s)", staged.len())
    }
}

fn build_view(tree: &FileTree, id: NodeRef) -> TreeView {
    let node = tree.get(id).expect("view of a node that exists");

    TreeView {
        id: node.id,
        name: node.name.clone(),
        original_path: node.original_path.clone(),
        destination_path: node.destination_path.clone(),
        is_directory: node.is_directory,
        is_virtual: node.is_virtual,
        is_manually_moved: node.is_manually_moved,
        is_moved: node.is_moved(),
        is_content_modified: node.is_content_modified,
        children: node
            .children
            .iter()
            .map(|child| build_view(tree, *child))
            .collect(),
    }
}

/// Runs jobs on the owned background thread. Expects to be the only writer
/// to canonical state while the busy token is held.
struct JobRunner {
    state: Arc<Mutex<EngineState>>,
    vfs: Arc<Vfs>,
    root_path: PathBuf,
    busy: Arc<AtomicBool>,
    event_sender: Sender<SessionEvent>,
}

impl JobRunner {
    fn run(&self, job: Job) {
        match job {
            Job::Rescan => self.rescan(),
            Job::Search {
                text,
                mode,
                case_sensitive,
            } => self.search(text, mode, case_sensitive),
            Job::StageEdit {
                find,
                replace,
                scope,
                extensions,
                mode,
                case_sensitive,
            } => self.stage_edit(find, replace, scope, extensions, mode, case_sensitive),
            Job::Execute => self.execute_staged(),
        }

        self.busy.store(false, Ordering::SeqCst);
    }

    fn recompute(&self, state: &mut EngineState) {
        state.staged = compute_staged_changes(&state.tree, &self.vfs);
        state.status = describe_staged(&state.staged);
    }

    /// Rebuilds the tree from disk and reapplies the current rules. Node
    /// ids do not survive, so the undo log is dropped.
    fn rebuild_from_disk(&self, state: &mut EngineState) {
        match scan(&self.vfs, &self.root_path) {
            Ok(tree) => {
                state.tree = tree;
                state.undo.clear();
                let rules = state.rules.clone();
                apply_rules(&mut state.tree, &rules);
            }
            Err(err) => {
                log::error!("Rescan of {} failed: {}", self.root_path.display(), err);
                state.status = format!("Rescan failed: {err}");
            }
        }
    }

    fn rescan(&self) {
        let mut state = self.state.lock().unwrap();
        self.rebuild_from_disk(&mut state);
        self.recompute(&mut state);
        let entries = state.tree.len() - 1;
        drop(state);

        let _ = self
            .event_sender
            .send(SessionEvent::ScanCompleted { entries });
    }

    fn search(&self, text: String, mode: MatchMode, case_sensitive: bool) {
        let tree = self.state.lock().unwrap().tree.clone();
        let results = content::search(&tree, &self.vfs, &text, mode, case_sensitive);

        let mut state = self.state.lock().unwrap();
        state.status = if !Matcher::compile(&text, mode, case_sensitive).is_valid() {
            "Pattern is invalid; treated as no matches".to_owned()
        } else {
            format!("Search matched {} file(s)", results.len())
        };
        drop(state);

        let _ = self
            .event_sender
            .send(SessionEvent::SearchCompleted { results });
    }

    fn stage_edit(
        &self,
        find: String,
        replace: String,
        scope: EditScope,
        extensions: Option<Vec<String>>,
        mode: MatchMode,
        case_sensitive: bool,
    ) {
        // Replacement content is computed against a snapshot, off the lock,
        // then applied to canonical state in one step.
        let tree = self.state.lock().unwrap().tree.clone();
        let edits = content::compute_content_edits(
            &tree,
            &self.vfs,
            &find,
            &replace,
            scope,
            extensions.as_deref(),
            mode,
            case_sensitive,
        );

        let mut state = self.state.lock().unwrap();
        let mut records = Vec::with_capacity(edits.len());
        for edit in &edits {
            let new_content = edit.new_content.clone();
            let applied = state.tree.update(edit.id, |node| {
                node.pending_content = Some(new_content);
                node.is_content_modified = true;
            });
            if applied {
                records.push(EditRecord::from(edit));
            }
        }
        self.recompute(&mut state);
        state.status = if !Matcher::compile(&find, mode, case_sensitive).is_valid() {
            "Pattern is invalid; treated as no matches".to_owned()
        } else {
            format!("Staged replacements in {} file(s)", records.len())
        };
        drop(state);

        let _ = self.event_sender.send(SessionEvent::EditsStaged { records });
    }

    fn execute_staged(&self) {
        let (tree, staged) = {
            let state = self.state.lock().unwrap();
            (state.tree.clone(), state.staged.clone())
        };

        let report = execute(&tree, &staged, &self.vfs);

        let mut state = self.state.lock().unwrap();
        if report.is_success() {
            // The batch is consumed: rules and pending edits are done.
            state.rules.clear();
        }
        // The tree is rebuilt from disk regardless of failures so the
        // preview never reflects stale assumptions.
        self.rebuild_from_disk(&mut state);
        self.recompute(&mut state);
        state.status = report.summary();
        drop(state);

        let _ = self
            .event_sender
            .send(SessionEvent::ExecutionCompleted { report });
    }
}
