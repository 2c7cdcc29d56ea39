use console::{style, Emoji, Term};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use super::{Command, Dialogs, Generate, SelectDirectory, Session};

static CHECKMARK: Emoji = Emoji("✅ ", "✓ ");
static CROSS: Emoji = Emoji("❌ ", "✗ ");
static FOLDER: Emoji = Emoji("📁 ", "");

/// Line-based dialogs on the controlling terminal.
pub struct TerminalDialogs {
    term: Term,
}

impl Default for TerminalDialogs {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalDialogs {
    pub fn new() -> Self {
        Self {
            term: Term::stdout(),
        }
    }

    fn say(&self, line: &str) {
        if let Err(err) = self.term.write_line(line) {
            warn!(error = %err, "failed to write to terminal");
        }
    }

    fn read_answer(&self, initial: Option<&Path>) -> io::Result<String> {
        match initial {
            Some(path) if self.term.is_term() => {
                self.term.read_line_initial_text(&path.display().to_string())
            }
            _ => self.term.read_line(),
        }
    }
}

impl Dialogs for TerminalDialogs {
    fn choose_directory(&mut self, prompt: &str, initial: Option<&Path>) -> Option<PathBuf> {
        loop {
            self.say(&format!(
                "{}{} {}",
                FOLDER,
                style(prompt).bold(),
                style("(empty to cancel)").dim()
            ));
            let answer = match self.read_answer(initial) {
                Ok(answer) => answer,
                Err(err) => {
                    warn!(error = %err, "failed to read from terminal");
                    return None;
                }
            };
            let answer = answer.trim();
            if answer.is_empty() {
                return None;
            }

            let path = expand_home(answer);
            if path.is_dir() {
                return Some(path);
            }
            self.show_error(&format!("Not a directory: {}", path.display()));
            if !self.term.is_term() {
                return None;
            }
        }
    }

    fn show_error(&mut self, message: &str) {
        self.say(&format!("{}{}", CROSS, style(message).red()));
    }

    fn show_message(&mut self, message: &str) {
        self.say(&format!("{}{}", CHECKMARK, style(message).green()));
    }

    fn progress(&mut self) -> ProgressBar {
        if !self.term.is_term() {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new_spinner();
        if let Ok(spinner) =
            ProgressStyle::default_spinner().template("{spinner:.green} [{pos}/{len}] {msg}")
        {
            pb.set_style(spinner);
        }
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }
}

/// Expands a leading `~` to the home directory.
fn expand_home(input: &str) -> PathBuf {
    if let Some(rest) = input.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest.trim_start_matches(['/', '\\']));
        }
    }
    PathBuf::from(input)
}

enum MenuChoice {
    Run(&'static dyn Command),
    EditPath,
    Quit,
    Unknown,
}

fn parse_choice(input: &str) -> MenuChoice {
    match input.trim().to_lowercase().as_str() {
        "1" | "s" | "select" => MenuChoice::Run(&SelectDirectory),
        "2" | "e" | "edit" => MenuChoice::EditPath,
        "3" | "g" | "generate" => MenuChoice::Run(&Generate),
        "q" | "quit" | "exit" => MenuChoice::Quit,
        _ => MenuChoice::Unknown,
    }
}

fn render(dialogs: &TerminalDialogs, session: &Session) {
    let dir = if session.install_dir.trim().is_empty() {
        style("(none)".to_string()).dim()
    } else {
        style(session.install_dir.clone()).cyan()
    };
    dialogs.say("");
    dialogs.say(&format!("{}", style("Third-party module manifest").bold()));
    dialogs.say(&format!("  Installation directory: {}", dir));
    dialogs.say("");
    for (key, label) in [
        ("1", SelectDirectory.label()),
        ("2", "Edit installation directory"),
        ("3", Generate.label()),
        ("q", "Quit"),
    ] {
        dialogs.say(&format!("  [{}] {}", style(key).yellow(), label));
    }
}

/// Runs the menu loop until the user quits or input ends.
pub fn run(session: &mut Session) -> io::Result<()> {
    let mut dialogs = TerminalDialogs::new();

    loop {
        render(&dialogs, session);
        let line = dialogs.term.read_line()?;
        if line.trim().is_empty() && !dialogs.term.is_term() {
            return Ok(());
        }

        match parse_choice(&line) {
            MenuChoice::Run(command) => {
                if command.can_run(session) {
                    command.run(session, &mut dialogs);
                }
            }
            MenuChoice::EditPath => {
                dialogs.say(&format!("{}", style("Installation directory").bold()));
                let text = if dialogs.term.is_term() {
                    dialogs.term.read_line_initial_text(&session.install_dir)?
                } else {
                    dialogs.term.read_line()?
                };
                session.install_dir = text.trim().to_string();
            }
            MenuChoice::Quit => return Ok(()),
            MenuChoice::Unknown => {
                dialogs.show_error(&format!("Unknown choice: {}", line.trim()));
            }
        }
    }
}
