use std::io::{self, stdout};
use std::path::PathBuf;

use chrono::Local;
use clap::Parser;
use crossterm::cursor::{Hide, Show};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::Line;
use ratatui::widgets::{Clear, Paragraph};
use ratatui::{Frame, Terminal};
use tracing::{debug, info};

use dusnap::browser::{Browser, Command, Effect, Screen};
use dusnap::config::Config;
use dusnap::navigator::{Cursor, Entry, EntryKind, Navigator};
use dusnap::{logging, paths, reveal};

const TITLE: &str = "Disk Usage Analysis Browser";
const PICKER_FOOTER: &str = "↑/↓: Move selection, Enter: Select, q: Quit";
const BROWSE_FOOTER: &str = "↑/↓: Navigate, Enter: Open, o: Open in file manager, r: Choose run, q: Quit";
const REVEAL_FAILED_MESSAGE: &str = "Failed to open directory in file manager.\nPress any key to continue.";
const REVEAL_MISSING_MESSAGE: &str = "Directory no longer exists.\nPress any key to continue.";

#[derive(Debug, Parser)]
#[command(name = "dusnap-browse", about = "Browse disk usage snapshots interactively")]
struct Args {
    /// Base directory holding analysis runs (default: ./output)
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Debug log file (default: ./browser_debug.log)
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Settings file (default: ./dusnap.toml when present)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

/// Raw mode and the alternate screen, undone on drop and on panic.
struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> io::Result<Self> {
        enable_raw_mode()?;
        if let Err(err) = crossterm::execute!(stdout(), EnterAlternateScreen, Hide) {
            restore_terminal();
            return Err(err);
        }

        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |panic| {
            restore_terminal();
            previous(panic);
        }));
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        restore_terminal();
    }
}

fn restore_terminal() {
    let _ = disable_raw_mode();
    let _ = crossterm::execute!(stdout(), LeaveAlternateScreen, Show);
}

fn command_for(key: KeyEvent) -> Command {
    if key.modifiers.contains(KeyModifiers::CONTROL) && matches!(key.code, KeyCode::Char('c')) {
        return Command::Quit;
    }
    match key.code {
        KeyCode::Up | KeyCode::Char('k') => Command::Up,
        KeyCode::Down | KeyCode::Char('j') => Command::Down,
        KeyCode::Enter => Command::Select,
        KeyCode::Char('o') => Command::OpenExternally,
        KeyCode::Char('r') => Command::ChooseRun,
        KeyCode::Char('q') => Command::Quit,
        _ => Command::Other,
    }
}

/// Keep the last `max` characters, marking the cut with `...`.
fn truncate_left(text: &str, max: usize) -> String {
    let count = text.chars().count();
    if count <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(3);
    let tail: String = text.chars().skip(count - keep).collect();
    format!("...{tail}")
}

/// Keep the first `max` characters, marking the cut with `...`.
fn truncate_right(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let head: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{head}...")
}

/// `name - size`, or just the name when there is no size to show.
fn entry_label(entry: &Entry) -> String {
    if entry.size_label.is_empty() {
        entry.name.clone()
    } else {
        format!("{} - {}", entry.name, entry.size_label)
    }
}

fn highlighted(text: String, selected: bool) -> Line<'static> {
    if selected {
        Line::styled(text, Style::default().add_modifier(Modifier::REVERSED))
    } else {
        Line::raw(text)
    }
}

fn bold(text: impl Into<String>) -> Line<'static> {
    Line::styled(text.into(), Style::default().add_modifier(Modifier::BOLD))
}

/// Thumb offset and length for a track of `capacity` rows, or `None` when
/// everything fits.
fn scrollbar(cursor: &Cursor, len: usize) -> Option<(usize, usize)> {
    let capacity = cursor.capacity();
    if len <= capacity {
        return None;
    }
    let thumb = (capacity * capacity / len).max(1);
    let offset = cursor.scroll() * (capacity - thumb) / (len - capacity).max(1);
    Some((offset, thumb))
}

fn draw_scrollbar(frame: &mut Frame, area: Rect, cursor: &Cursor, len: usize) {
    let Some((offset, thumb)) = scrollbar(cursor, len) else {
        return;
    };
    let lines: Vec<Line> = (0..usize::from(area.height))
        .map(|row| {
            if (offset..offset + thumb).contains(&row) {
                Line::raw("█")
            } else {
                Line::raw("│")
            }
        })
        .collect();
    frame.render_widget(Paragraph::new(lines), area);
}

/// Middle row of the three-row footer band.
fn footer_row(band: Rect) -> Rect {
    let offset = band.height.min(2) / 2;
    Rect::new(band.x, band.y + offset, band.width, band.height.min(1))
}

fn draw_header(frame: &mut Frame, area: Rect, extra: Vec<Line<'static>>) {
    let mut lines = vec![bold(TITLE), Line::raw("=".repeat(usize::from(area.width)))];
    lines.extend(extra);
    frame.render_widget(Paragraph::new(lines), area);
}

fn draw_picker(frame: &mut Frame, browser: &Browser) {
    let rows = Layout::vertical([Constraint::Length(3), Constraint::Min(1), Constraint::Length(3)])
        .split(frame.area());
    draw_header(
        frame,
        rows[0],
        vec![Line::raw("Available analysis runs (newest first):")],
    );

    let [list, bar] = Layout::horizontal([Constraint::Min(1), Constraint::Length(2)]).areas(rows[1]);
    let runs = browser.runs();
    let picker = browser.picker();
    let now = Local::now().naive_local();
    let width = usize::from(list.width);
    let lines: Vec<Line> = picker
        .visible(runs.len())
        .map(|index| {
            let text = format!("{}. {}", index + 1, runs[index].id().describe(now));
            highlighted(truncate_right(&text, width), index == picker.selected())
        })
        .collect();
    frame.render_widget(Paragraph::new(lines), list);
    draw_scrollbar(frame, bar, picker, runs.len());

    frame.render_widget(Paragraph::new(bold(PICKER_FOOTER)), footer_row(rows[2]));
}

fn draw_browsing(frame: &mut Frame, navigator: &Navigator) {
    let rows = Layout::vertical([Constraint::Length(5), Constraint::Min(1), Constraint::Length(3)])
        .split(frame.area());
    let view = navigator.view();
    let width = usize::from(rows[0].width);

    let location = truncate_left(&view.path.display().to_string(), width.saturating_sub(10));
    draw_header(
        frame,
        rows[0],
        vec![
            Line::raw(format!("Location: {location}")),
            Line::raw(format!("Size: {}", view.size_label)),
            Line::raw("-".repeat(width)),
        ],
    );

    let [list, bar] = Layout::horizontal([Constraint::Min(1), Constraint::Length(2)]).areas(rows[1]);
    let cursor = navigator.cursor();
    let entries = &view.entries;
    let has_children = entries.iter().any(|entry| entry.kind == EntryKind::Child);

    let mut lines: Vec<Line> = cursor
        .visible(entries.len())
        .map(|index| {
            highlighted(
                truncate_right(&entry_label(&entries[index]), usize::from(list.width)),
                index == cursor.selected(),
            )
        })
        .collect();
    if !has_children {
        lines.push(Line::raw(""));
        lines.push(Line::raw("No subdirectories found"));
    }
    frame.render_widget(Paragraph::new(lines), list);
    draw_scrollbar(frame, bar, cursor, entries.len());

    frame.render_widget(Paragraph::new(bold(BROWSE_FOOTER)), footer_row(rows[2]));
}

fn draw_message(frame: &mut Frame, message: &str) {
    let area = frame.area();
    let lines: Vec<Line> = message.lines().map(|line| Line::raw(line.to_string())).collect();
    let height = (lines.len() as u16).min(area.height);
    let top = area.y + (area.height - height) / 2;
    let target = Rect::new(area.x, top, area.width, height);

    frame.render_widget(Clear, area);
    frame.render_widget(Paragraph::new(lines).alignment(Alignment::Center), target);
}

fn draw_ui(frame: &mut Frame, browser: &Browser) {
    if let Some(message) = browser.message() {
        draw_message(frame, message);
        return;
    }
    match browser.screen() {
        Screen::RunSelection => draw_picker(frame, browser),
        Screen::Browsing(navigator) => draw_browsing(frame, navigator),
    }
}

fn reveal_directory(browser: &mut Browser, path: PathBuf) {
    if !path.is_dir() {
        info!(path = %path.display(), "directory to reveal no longer exists");
        browser.show_message(REVEAL_MISSING_MESSAGE);
        return;
    }
    if !reveal::open_in_file_manager(&path) {
        browser.show_message(REVEAL_FAILED_MESSAGE);
    }
}

fn run_app(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, output: PathBuf) -> io::Result<()> {
    let rows = terminal.size()?.height;
    let mut browser = Browser::new(output, rows);

    loop {
        terminal.draw(|frame| draw_ui(frame, &browser))?;

        let command = match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => command_for(key),
            Event::Resize(_, rows) => Command::Resize { rows },
            _ => continue,
        };
        debug!(?command, "input");

        match browser.handle(command) {
            Effect::Redraw => {}
            Effect::Quit => break,
            Effect::Reveal(path) => reveal_directory(&mut browser, path),
        }
    }

    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;
    let output = paths::absolute(&args.output.unwrap_or(config.output))?;
    let log_file = args.log_file.unwrap_or(config.browse.log_file);
    let _log_guard = logging::init_file("dusnap=debug,warn", &log_file)?;
    info!(output = %output.display(), "browser starting");

    let app_result = {
        let _terminal_guard = TerminalGuard::enter()?;
        let backend = CrosstermBackend::new(stdout());
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;
        run_app(&mut terminal, output)
    };
    app_result?;

    info!("browser exited");
    println!("Thank you for using the Disk Usage Analysis Browser!");
    Ok(())
}
