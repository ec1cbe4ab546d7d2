use std::path::PathBuf;

use anyhow::bail;
use clap::Parser;
use shadowfs::Vfs;

use crate::content::EditScope;
use crate::matching::MatchMode;
use crate::session::{Session, SessionEvent};

use super::{resolve_path, GlobalOptions};

/// Stages a find/replace across file contents, and optionally commits it.
#[derive(Debug, Parser)]
pub struct ReplaceCommand {
    /// Path to the directory to edit.
    pub path: PathBuf,

    /// Text or pattern to find.
    pub find: String,

    /// Replacement text. With wildcard patterns, `*` placeholders are
    /// substituted with the captured gaps, in order.
    pub replace: String,

    /// Only touch files with these extensions, repeatable.
    #[clap(long("ext"))]
    pub extensions: Vec<String>,

    /// How to interpret the pattern: literal, regex, or wildcard.
    #[clap(long, default_value("literal"))]
    pub mode: MatchMode,

    /// Match case exactly.
    #[clap(long)]
    pub case_sensitive: bool,

    /// Write the staged edits to disk instead of only previewing them.
    #[clap(long)]
    pub commit: bool,
}

impl ReplaceCommand {
    pub fn run(self, _global: GlobalOptions) -> anyhow::Result<()> {
        let root = resolve_path(&self.path).into_owned();
        let session = Session::open(Vfs::new_default(), root.clone())?;

        let extensions = if self.extensions.is_empty() {
            None
        } else {
            Some(self.extensions.clone())
        };

        session.request_content_edit(
            self.find.as_str(),
            self.replace.as_str(),
            EditScope::EntireTree,
            extensions,
            self.mode,
            self.case_sensitive,
        )?;
        let records = loop {
            match session.wait_event() {
                Some(SessionEvent::EditsStaged { records }) => break records,
                Some(_) => continue,
                None => bail!("session closed before edits were staged"),
            }
        };

        for record in &records {
            let shown = record.path.strip_prefix(&root).unwrap_or(&record.path);
            println!("{}: {} replacement(s)", shown.display(), record.replacements);
        }

        if records.is_empty() {
            println!("{}", session.status());
            return Ok(());
        }

        if !self.commit {
            println!("{} file(s) staged. Re-run with --commit to write.", records.len());
            return Ok(());
        }

        session.request_execute()?;
        let report = loop {
            match session.wait_event() {
                Some(SessionEvent::ExecutionCompleted { report }) => break report,
                Some(_) => continue,
                None => bail!("session closed before execution completed"),
            }
        };

        println!("{}", report.summary());
        if !report.is_success() {
            bail!("execution completed with {} error(s)", report.error_count());
        }

        Ok(())
    }
}
