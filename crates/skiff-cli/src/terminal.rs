//! Terminal front-end: coloured step lines, byte progress and a hidden
//! password prompt.

use std::io::{self, BufRead, IsTerminal, Write};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::style::Stylize;
use crossterm::terminal::{self, ClearType};
use crossterm::{cursor, execute};

use skiff_core::action::Action;
use skiff_core::report::{Reporter, SkipReason, TransferProgress};
use skiff_core::session::PasswordPrompt;

const BAR_WIDTH: usize = 24;

/// Prints `[step N]: ...` lines to stdout and transfer progress to stderr.
pub struct TerminalReporter {
    color: bool,
    progress: bool,
}

impl TerminalReporter {
    pub fn new() -> Self {
        Self {
            color: io::stdout().is_terminal(),
            progress: io::stderr().is_terminal(),
        }
    }

    fn prefix(&self, step: usize) -> String {
        let prefix = format!("[step {}]:", step);
        if self.color {
            prefix.bold().to_string()
        } else {
            prefix
        }
    }
}

impl Reporter for TerminalReporter {
    fn step_completed(&self, step: usize, action: &Action) {
        let description = action.to_string();
        let line = match (self.color, description.split_once(' ')) {
            (true, Some((keyword, rest))) => format!("{} {}", keyword.yellow(), rest.green()),
            _ => description,
        };
        println!("{} {}", self.prefix(step), line);
    }

    fn run_finished(&self, step: usize) {
        let done = if self.color {
            "done!".green().bold().to_string()
        } else {
            "done!".to_string()
        };
        println!("{} {}", self.prefix(step), done);
    }

    fn delete_skipped(&self, path: &str, reason: SkipReason) {
        let why = match reason {
            SkipReason::Protected => "protected system path, not deleting",
            SkipReason::Missing => "does not exist",
        };
        if self.color {
            println!("  {} {}", path.yellow(), why.dark_grey());
        } else {
            println!("  {} {}", path, why);
        }
    }

    fn transfer(&self, label: &str, total: u64) -> Box<dyn TransferProgress> {
        if self.progress {
            Box::new(ProgressBar::new(label, total))
        } else {
            Box::new(Quiet)
        }
    }
}

struct Quiet;

impl TransferProgress for Quiet {
    fn advance(&mut self, _bytes: u64) {}
    fn finish(&mut self) {}
}

/// Single-line progress bar redrawn in place on stderr.
struct ProgressBar {
    label: String,
    total: u64,
    done: u64,
    shown: Option<usize>,
}

impl ProgressBar {
    fn new(label: &str, total: u64) -> Self {
        Self {
            label: label.to_string(),
            total,
            done: 0,
            shown: None,
        }
    }

    fn percent(&self) -> usize {
        if self.total == 0 {
            return 100;
        }
        ((self.done.min(self.total) * 100) / self.total) as usize
    }

    fn render(&mut self) {
        let percent = self.percent();
        if self.shown == Some(percent) {
            return;
        }
        self.shown = Some(percent);

        let filled = percent * BAR_WIDTH / 100;
        let bar = format!("{}{}", "#".repeat(filled), " ".repeat(BAR_WIDTH - filled));
        let mut stderr = io::stderr();
        let _ = execute!(
            stderr,
            cursor::MoveToColumn(0),
            terminal::Clear(ClearType::CurrentLine)
        );
        let _ = write!(
            stderr,
            "  {} [{}] {:>3}% ({}/{} bytes)",
            self.label, bar, percent, self.done, self.total
        );
        let _ = stderr.flush();
    }
}

impl TransferProgress for ProgressBar {
    fn advance(&mut self, bytes: u64) {
        self.done += bytes;
        self.render();
    }

    fn finish(&mut self) {
        self.render();
        let _ = writeln!(io::stderr());
    }
}

/// Reads a password from the terminal without echoing it. Falls back to a
/// plain line read when stdin is not a terminal.
pub struct TerminalPrompt;

/// Leaves raw mode when dropped.
struct RawMode;

impl RawMode {
    fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(RawMode)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

impl PasswordPrompt for TerminalPrompt {
    fn prompt(&self, message: &str) -> io::Result<String> {
        let mut stderr = io::stderr();
        write!(stderr, "{}: ", message)?;
        stderr.flush()?;

        if !io::stdin().is_terminal() {
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line)?;
            return Ok(line.trim_end_matches(['\r', '\n']).to_string());
        }

        let password = {
            let _raw = RawMode::enable()?;
            read_hidden()?
        };
        writeln!(stderr)?;
        Ok(password)
    }
}

fn read_hidden() -> io::Result<String> {
    let mut password = String::new();
    loop {
        let Event::Key(KeyEvent {
            code,
            modifiers,
            kind,
            ..
        }) = event::read()?
        else {
            continue;
        };
        if kind != KeyEventKind::Press {
            continue;
        }
        match code {
            KeyCode::Enter => return Ok(password),
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                return Err(io::Error::new(io::ErrorKind::Interrupted, "password entry cancelled"));
            }
            KeyCode::Char(c) => password.push(c),
            KeyCode::Backspace => {
                password.pop();
            }
            KeyCode::Esc => {
                return Err(io::Error::new(io::ErrorKind::Interrupted, "password entry cancelled"));
            }
            _ => {}
        }
    }
}
