use std::path::PathBuf;

use anyhow::bail;
use clap::Parser;
use shadowfs::Vfs;

use crate::matching::MatchMode;
use crate::session::{Session, SessionEvent};

use super::resolve_path;

/// Searches file contents under a directory.
#[derive(Debug, Parser)]
pub struct SearchCommand {
    /// Path to the directory to search.
    pub path: PathBuf,

    /// Text or pattern to look for.
    pub pattern: String,

    /// How to interpret the pattern: literal, regex, or wildcard.
    #[clap(long, default_value("literal"))]
    pub mode: MatchMode,

    /// Match case exactly.
    #[clap(long)]
    pub case_sensitive: bool,
}

impl SearchCommand {
    pub fn run(self) -> anyhow::Result<()> {
        let root = resolve_path(&self.path).into_owned();
        let session = Session::open(Vfs::new_default(), root.clone())?;

        session.request_search(self.pattern.as_str(), self.mode, self.case_sensitive)?;
        let results = loop {
            match session.wait_event() {
                Some(SessionEvent::SearchCompleted { results }) => break results,
                Some(_) => continue,
                None => bail!("session closed before search completed"),
            }
        };

        for result in &results {
            let shown = result.path.strip_prefix(&root).unwrap_or(&result.path);
            println!(
                "{}: {} match(es): {}",
                shown.display(),
                result.match_count,
                result.preview
            );
        }
        println!("{}", session.status());

        Ok(())
    }
}
