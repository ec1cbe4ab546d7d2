//! Automatic destination assignment: an ordered list of user rules evaluated
//! against every file in the tree, first match wins.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tree::FileTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(Uuid);

impl RuleId {
    pub fn new() -> Self {
        RuleId(Uuid::new_v4())
    }
}

impl Default for RuleId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    /// Matches files whose extension is in a comma/whitespace-separated
    /// list. Leading dots and surrounding whitespace in the criteria are
    /// ignored; comparison is case-insensitive.
    Extension,
    /// Matches files whose name contains the criteria, case-insensitively.
    /// A comma-separated criteria is a list of alternatives, matched by
    /// equality or case-insensitive containment.
    NameContains,
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RuleKind::Extension => "extension",
            RuleKind::NameContains => "name-contains",
        };
        f.write_str(name)
    }
}

/// One auto-assignment rule. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub kind: RuleKind,
    pub criteria: String,
    /// Folder name under the scan root that matching files move to.
    pub target_folder: String,
}

impl Rule {
    pub fn new(
        kind: RuleKind,
        criteria: impl Into<String>,
        target_folder: impl Into<String>,
    ) -> Rule {
        Rule {
            id: RuleId::new(),
            kind,
            criteria: criteria.into(),
            target_folder: target_folder.into(),
        }
    }

    /// Value equality, ignoring id. The undo log restores rules by value, so
    /// a re-added rule with a fresh id still matches its removal record.
    pub fn same_value(&self, other: &Rule) -> bool {
        self.kind == other.kind
            && self.criteria == other.criteria
            && self.target_folder == other.target_folder
    }

    /// Whether this rule matches a file with the given name.
    pub fn matches(&self, name: &str) -> bool {
        match self.kind {
            RuleKind::Extension => {
                let extension = match std::path::Path::new(name).extension() {
                    Some(extension) => extension.to_string_lossy().to_lowercase(),
                    None => return false,
                };

                self.criteria
                    .split(|ch: char| ch == ',' || ch.is_whitespace())
                    .map(|entry| entry.trim().trim_start_matches('.').to_lowercase())
                    .filter(|entry| !entry.is_empty())
                    .any(|entry| entry == extension)
            }
            RuleKind::NameContains => {
                let name_lower = name.to_lowercase();

                if self.criteria.contains(',') {
                    self.criteria
                        .split(',')
                        .map(str::trim)
                        .filter(|alternative| !alternative.is_empty())
                        .any(|alternative| {
                            name == alternative
                                || name_lower.contains(&alternative.to_lowercase())
                        })
                } else {
                    let criteria = self.criteria.trim();
                    !criteria.is_empty() && name_lower.contains(&criteria.to_lowercase())
                }
            }
        }
    }
}

/// Re-evaluates every rule against the tree.
///
/// Destinations of automatically placed nodes are reset first, then each
/// non-directory, non-manually-moved node takes the target of the first rule
/// that matches it. Directories are never auto-targeted; manually moved
/// nodes are frozen until reverted. Idempotent for a fixed rule list and
/// manual-move set.
pub fn apply_rules(tree: &mut FileTree, rules: &[Rule]) {
    tree.reset_auto_destinations();

    if rules.is_empty() {
        return;
    }

    let root_path = tree.root_path().to_path_buf();

    tree.update_all(|node| {
        if node.is_directory || node.is_manually_moved {
            return;
        }

        if let Some(rule) = rules.iter().find(|rule| rule.matches(&node.name)) {
            node.destination_path = root_path.join(&rule.target_folder).join(&node.name);
        }
    });
}
