use std::path::PathBuf;

use anyhow::bail;
use clap::Parser;
use shadowfs::Vfs;

use crate::session::{Session, SessionEvent};

use super::{print_staged_changes, resolve_path, GlobalOptions, RuleSpec};

/// Scans a directory, applies the given rules, and commits the staged
/// changes to disk, including the reference-repair pass.
#[derive(Debug, Parser)]
pub struct ApplyCommand {
    /// Path to the directory to reorganize.
    pub path: PathBuf,

    /// Auto-assignment rule, repeatable. Same syntax as `preview`.
    #[clap(long("rule"))]
    pub rules: Vec<RuleSpec>,
}

impl ApplyCommand {
    pub fn run(self, global: GlobalOptions) -> anyhow::Result<()> {
        let root = resolve_path(&self.path).into_owned();
        let session = Session::open(Vfs::new_default(), root.clone())?;

        for spec in &self.rules {
            session.add_rule(spec.kind, spec.criteria.as_str(), spec.target_folder.as_str())?;
        }

        let staged = session.staged_changes();
        if staged.is_empty() {
            println!("No pending changes.");
            return Ok(());
        }
        print_staged_changes(&staged, &root, global.color)?;

        session.request_execute()?;
        let report = loop {
            match session.wait_event() {
                Some(SessionEvent::ExecutionCompleted { report }) => break report,
                Some(_) => continue,
                None => bail!("session closed before execution completed"),
            }
        };

        println!("{}", report.summary());
        for error in &report.errors {
            log::error!("{error}");
        }

        if !report.is_success() {
            bail!("execution completed with {} error(s)", report.error_count());
        }

        Ok(())
    }
}
