//! The interactive shell: an editable input directory and two commands.
//!
//! Everything the user sees goes through [`Dialogs`], so the commands can
//! be driven by a scripted implementation in tests and by
//! [`terminal::TerminalDialogs`] at runtime.

pub mod terminal;

use indicatif::ProgressBar;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::Config;
use crate::error::Error;
use crate::export::Exporter;

/// User-facing prompts and notifications.
pub trait Dialogs {
    /// Asks for a directory. `None` means the user cancelled.
    fn choose_directory(&mut self, prompt: &str, initial: Option<&Path>) -> Option<PathBuf>;

    fn show_error(&mut self, message: &str);

    fn show_message(&mut self, message: &str);

    /// A progress indicator for long-running work.
    fn progress(&mut self) -> ProgressBar {
        ProgressBar::hidden()
    }
}

/// State shared by the shell commands.
#[derive(Debug, Clone, Default)]
pub struct Session {
    /// The installation directory as typed or selected. It is validated
    /// only when a manifest is generated.
    pub install_dir: String,
    pub config: Config,
}

impl Session {
    pub fn new(config: Config) -> Self {
        Self {
            install_dir: String::new(),
            config,
        }
    }

    pub fn with_install_dir(mut self, dir: impl Into<String>) -> Self {
        self.install_dir = dir.into();
        self
    }

    fn install_path(&self) -> Option<&Path> {
        let trimmed = self.install_dir.trim();
        (!trimmed.is_empty()).then(|| Path::new(trimmed))
    }
}

/// What happened when a command ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Done,
    Cancelled,
    Failed,
}

pub trait Command {
    fn label(&self) -> &'static str;

    fn can_run(&self, _session: &Session) -> bool {
        true
    }

    fn run(&self, session: &mut Session, dialogs: &mut dyn Dialogs) -> Outcome;
}

/// Picks the installation directory.
pub struct SelectDirectory;

impl Command for SelectDirectory {
    fn label(&self) -> &'static str {
        "Select installation directory"
    }

    fn run(&self, session: &mut Session, dialogs: &mut dyn Dialogs) -> Outcome {
        let current = session.install_path().map(Path::to_path_buf);
        match dialogs.choose_directory("Installation directory", current.as_deref()) {
            Some(dir) => {
                session.install_dir = dir.display().to_string();
                debug!(dir = %session.install_dir, "installation directory selected");
                Outcome::Done
            }
            None => Outcome::Cancelled,
        }
    }
}

/// Scans the installation directory and writes the manifest.
pub struct Generate;

impl Command for Generate {
    fn label(&self) -> &'static str {
        "Generate manifest"
    }

    fn run(&self, session: &mut Session, dialogs: &mut dyn Dialogs) -> Outcome {
        let input = PathBuf::from(session.install_dir.trim());
        if !input.is_dir() {
            dialogs.show_error(&Error::DirectoryNotFound { path: input }.to_string());
            return Outcome::Failed;
        }

        let Some(output_dir) = dialogs.choose_directory("Output directory", None) else {
            return Outcome::Cancelled;
        };

        let progress = dialogs.progress();
        let exported = Exporter::new(&session.config)
            .with_progress(progress.clone())
            .export(&input, &output_dir);
        progress.finish_and_clear();

        match exported {
            Ok(export) => {
                dialogs.show_message(&export.success_message());
                Outcome::Done
            }
            Err(err) => {
                dialogs.show_error(&err.to_string());
                Outcome::Failed
            }
        }
    }
}
