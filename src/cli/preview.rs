use std::path::PathBuf;

use clap::Parser;
use shadowfs::Vfs;

use crate::session::Session;

use super::{print_staged_changes, resolve_path, GlobalOptions, RuleSpec};

/// Scans a directory, applies the given rules in staging, and prints the
/// pending changes without touching disk.
#[derive(Debug, Parser)]
pub struct PreviewCommand {
    /// Path to the directory to preview.
    pub path: PathBuf,

    /// Auto-assignment rule, repeatable. `ext:jpg,png=Images` moves files
    /// by extension; `name:draft=Drafts` moves files whose name contains
    /// the given text.
    #[clap(long("rule"))]
    pub rules: Vec<RuleSpec>,

    /// Print the staged changes as JSON instead of a listing.
    #[clap(long)]
    pub json: bool,
}

impl PreviewCommand {
    pub fn run(self, global: GlobalOptions) -> anyhow::Result<()> {
        let root = resolve_path(&self.path).into_owned();
        let session = Session::open(Vfs::new_default(), root.clone())?;

        for spec in &self.rules {
            session.add_rule(spec.kind, spec.criteria.as_str(), spec.target_folder.as_str())?;
        }

        let staged = session.staged_changes();

        if self.json {
            println!("{}", serde_json::to_string_pretty(&staged)?);
        } else {
            print_staged_changes(&staged, &root, global.color)?;
        }

        Ok(())
    }
}
