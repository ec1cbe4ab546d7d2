//! Defines Stagehand's CLI through clap types.

mod apply;
mod preview;
mod replace;
mod search;

use std::{borrow::Cow, env, io, io::Write, path::Path, str::FromStr};

use clap::Parser;
use termcolor::{Color, ColorSpec, StandardStream, WriteColor};
use thiserror::Error;

use crate::rules::RuleKind;
use crate::staging::StagedChange;

pub use self::apply::ApplyCommand;
pub use self::preview::PreviewCommand;
pub use self::replace::ReplaceCommand;
pub use self::search::SearchCommand;

/// Command line options that Stagehand accepts, defined using the clap crate.
#[derive(Debug, Parser)]
#[clap(name = "Stagehand", version, about)]
pub struct Options {
    #[clap(flatten)]
    pub global: GlobalOptions,

    /// Subcommand to run in this invocation.
    #[clap(subcommand)]
    pub subcommand: Subcommand,
}

impl Options {
    pub fn run(self) -> anyhow::Result<()> {
        match self.subcommand {
            Subcommand::Preview(subcommand) => subcommand.run(self.global),
            Subcommand::Apply(subcommand) => subcommand.run(self.global),
            Subcommand::Search(subcommand) => subcommand.run(),
            Subcommand::Replace(subcommand) => subcommand.run(self.global),
        }
    }
}

#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// Sets verbosity level. Can be specified multiple times.
    #[clap(long("verbose"), short, global(true), action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Set color behavior. Valid values are auto, always, and never.
    #[clap(long("color"), global(true), default_value("auto"))]
    pub color: ColorChoice,
}

#[derive(Debug, Clone, Copy)]
pub enum ColorChoice {
    Auto,
    Always,
    Never,
}

impl FromStr for ColorChoice {
    type Err = ColorChoiceParseError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        match source {
            "auto" => Ok(ColorChoice::Auto),
            "always" => Ok(ColorChoice::Always),
            "never" => Ok(ColorChoice::Never),
            _ => Err(ColorChoiceParseError {
                attempted: source.to_owned(),
            }),
        }
    }
}

impl From<ColorChoice> for termcolor::ColorChoice {
    fn from(value: ColorChoice) -> Self {
        match value {
            ColorChoice::Auto => termcolor::ColorChoice::Auto,
            ColorChoice::Always => termcolor::ColorChoice::Always,
            ColorChoice::Never => termcolor::ColorChoice::Never,
        }
    }
}

#[derive(Debug, Error)]
#[error("Invalid color choice '{attempted}'. Valid values are: auto, always, never")]
pub struct ColorChoiceParseError {
    attempted: String,
}

#[derive(Debug, Parser)]
pub enum Subcommand {
    Preview(PreviewCommand),
    Apply(ApplyCommand),
    Search(SearchCommand),
    Replace(ReplaceCommand),
}

/// One `--rule` argument: `ext:jpg,png=Images` or `name:draft=Drafts`.
#[derive(Debug, Clone)]
pub struct RuleSpec {
    pub kind: RuleKind,
    pub criteria: String,
    pub target_folder: String,
}

impl FromStr for RuleSpec {
    type Err = RuleSpecParseError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        let bad = || RuleSpecParseError {
            attempted: source.to_owned(),
        };

        let (kind, rest) = source.split_once(':').ok_or_else(bad)?;
        let (criteria, target_folder) = rest.split_once('=').ok_or_else(bad)?;

        let kind = match kind {
            "ext" | "extension" => RuleKind::Extension,
            "name" => RuleKind::NameContains,
            _ => return Err(bad()),
        };

        if criteria.is_empty() || target_folder.is_empty() {
            return Err(bad());
        }

        Ok(RuleSpec {
            kind,
            criteria: criteria.to_owned(),
            target_folder: target_folder.to_owned(),
        })
    }
}

#[derive(Debug, Error)]
#[error(
    "Invalid rule '{attempted}'. Expected `ext:jpg,png=Folder` or `name:substring=Folder`"
)]
pub struct RuleSpecParseError {
    attempted: String,
}

pub fn resolve_path(path: &Path) -> Cow<'_, Path> {
    if path.is_absolute() {
        Cow::Borrowed(path)
    } else {
        Cow::Owned(env::current_dir().unwrap().join(path))
    }
}

fn relative_to_root<'a>(path: &'a Path, root: &Path) -> &'a Path {
    path.strip_prefix(root).unwrap_or(path)
}

/// Prints the staged-change list the way the preview pane would show it.
pub(crate) fn print_staged_changes(
    changes: &[StagedChange],
    root: &Path,
    color: ColorChoice,
) -> io::Result<()> {
    let mut out = StandardStream::stdout(color.into());

    if changes.is_empty() {
        writeln!(out, "No pending changes.")?;
        return Ok(());
    }

    for change in changes {
        if change.is_directory && (change.is_virtual || change.is_implicit) {
            out.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
            let origin = if change.is_implicit { "auto" } else { "new" };
            writeln!(
                out,
                "  + {}/ ({origin} folder)",
                relative_to_root(&change.destination_path, root).display()
            )?;
        } else if change.is_moved() {
            out.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)))?;
            writeln!(
                out,
                "  > {} -> {}",
                relative_to_root(&change.original_path, root).display(),
                relative_to_root(&change.destination_path, root).display()
            )?;
        }

        if change.is_content_modified {
            out.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)))?;
            writeln!(
                out,
                "  ~ {} (content edit)",
                relative_to_root(&change.destination_path, root).display()
            )?;
        }
    }

    out.reset()?;
    writeln!(out, "{} pending change(s).", changes.len())?;
    Ok(())
}
