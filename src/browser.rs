//! Top-level browser state: picking a run, then browsing it.
//!
//! The terminal front end turns key presses into [`Command`]s and carries
//! out the returned [`Effect`]s; every decision is made here.

use std::path::PathBuf;

use tracing::{debug, info};

use crate::navigator::{Cursor, Navigator};
use crate::snapshot::{discover_runs, Run};

/// Rows taken by the run picker's header and footer.
pub const PICKER_CHROME_ROWS: u16 = 6;
/// Rows taken by the browsing screen's header, divider and footer.
pub const BROWSE_CHROME_ROWS: u16 = 8;

pub const NO_RUNS_MESSAGE: &str = "No analysis runs found. Press any key to exit.";
pub const LOAD_FAILED_MESSAGE: &str = "Could not load disk usage data. Press any key to continue.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Up,
    Down,
    Select,
    OpenExternally,
    ChooseRun,
    Quit,
    /// The viewport changed; only the page capacity is recomputed.
    Resize { rows: u16 },
    /// Any other key.
    Other,
}

/// What the front end has to do after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Redraw,
    Quit,
    Reveal(PathBuf),
}

pub enum Screen {
    RunSelection,
    Browsing(Navigator),
}

pub struct Browser {
    output_base: PathBuf,
    runs: Vec<Run>,
    picker: Cursor,
    screen: Screen,
    message: Option<String>,
    rows: u16,
}

fn capacity(rows: u16, chrome: u16) -> usize {
    usize::from(rows.saturating_sub(chrome).max(1))
}

impl Browser {
    /// Start in run selection with the runs currently under `output_base`.
    pub fn new(output_base: impl Into<PathBuf>, rows: u16) -> Self {
        let mut browser = Self {
            output_base: output_base.into(),
            runs: Vec::new(),
            picker: Cursor::new(capacity(rows, PICKER_CHROME_ROWS)),
            screen: Screen::RunSelection,
            message: None,
            rows,
        };
        browser.enter_run_selection();
        browser
    }

    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    pub fn picker(&self) -> &Cursor {
        &self.picker
    }

    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    pub fn navigator(&self) -> Option<&Navigator> {
        match &self.screen {
            Screen::Browsing(navigator) => Some(navigator),
            Screen::RunSelection => None,
        }
    }

    /// Centered message awaiting a key press, if any.
    pub fn message(&self) -> Option<&str> {
        if let Some(message) = self.message.as_deref() {
            return Some(message);
        }
        match self.screen {
            Screen::RunSelection if self.runs.is_empty() => Some(NO_RUNS_MESSAGE),
            _ => None,
        }
    }

    pub fn show_message(&mut self, message: impl Into<String>) {
        self.message = Some(message.into());
    }

    pub fn handle(&mut self, command: Command) -> Effect {
        if let Command::Resize { rows } = command {
            self.resize(rows);
            return Effect::Redraw;
        }
        if self.message.take().is_some() {
            return Effect::Redraw;
        }

        match &mut self.screen {
            Screen::RunSelection => self.handle_picker(command),
            Screen::Browsing(navigator) => match command {
                Command::Up => {
                    navigator.move_up();
                    Effect::Redraw
                }
                Command::Down => {
                    navigator.move_down();
                    Effect::Redraw
                }
                Command::Select => {
                    navigator.select();
                    Effect::Redraw
                }
                Command::OpenExternally => Effect::Reveal(navigator.current().to_path_buf()),
                Command::ChooseRun => {
                    self.enter_run_selection();
                    Effect::Redraw
                }
                Command::Quit => Effect::Quit,
                Command::Resize { .. } | Command::Other => Effect::Redraw,
            },
        }
    }

    fn handle_picker(&mut self, command: Command) -> Effect {
        if self.runs.is_empty() {
            return Effect::Quit;
        }
        match command {
            Command::Up => self.picker.up(),
            Command::Down => self.picker.down(self.runs.len()),
            Command::Select => self.open_selected_run(),
            Command::Quit => return Effect::Quit,
            Command::OpenExternally | Command::ChooseRun | Command::Resize { .. } | Command::Other => {}
        }
        Effect::Redraw
    }

    fn open_selected_run(&mut self) {
        let Some(run) = self.runs.get(self.picker.selected()).cloned() else {
            return;
        };
        match Navigator::open(run, capacity(self.rows, BROWSE_CHROME_ROWS)) {
            Ok(navigator) => {
                info!(run = %navigator.run().id(), "opened run");
                self.screen = Screen::Browsing(navigator);
            }
            Err(err) => {
                info!(error = %err, "could not open run");
                self.show_message(LOAD_FAILED_MESSAGE);
            }
        }
    }

    /// Drop any open run and rediscover runs from disk.
    fn enter_run_selection(&mut self) {
        self.runs = discover_runs(&self.output_base);
        debug!(count = self.runs.len(), base = %self.output_base.display(), "discovered runs");
        self.screen = Screen::RunSelection;
        self.picker.reset();
        self.picker.clamp(self.runs.len());
    }

    fn resize(&mut self, rows: u16) {
        self.rows = rows;
        self.picker
            .set_capacity(capacity(rows, PICKER_CHROME_ROWS), self.runs.len());
        if let Screen::Browsing(navigator) = &mut self.screen {
            navigator.set_page_capacity(capacity(rows, BROWSE_CHROME_ROWS));
        }
    }
}
