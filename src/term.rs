use std::io::{stdout, Write};
use std::panic;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Mutex;
use std::time::Duration;

use bevy::app::AppExit;
use bevy::prelude::*;
use crossterm::event::{Event as CrosstermEvent, KeyCode, KeyEvent, KeyModifiers};
use crossterm::style::{
    Attribute, Attributes, Color, ContentStyle, Print, PrintStyledContent, StyledContent,
};
use crossterm::terminal::{Clear, ClearType};
use crossterm::{execute, queue};
use discovery_core::capture::{CaptureOp, DiscoveryRecorded};
use discovery_core::detection::{DisplayCandidate, SequencerOp, SequencerPhase, SequencerUpdated};
use discovery_core::journal::Journal;
use discovery_core::op::OpSubtype;
use discovery_core::DiscoverySet;
use getset::CopyGetters;

const BAR_WIDTH: usize = 10;

/// Draws the detection status to the terminal, and in interactive mode
/// turns key presses into detection requests.
#[derive(Clone, Copy, Debug)]
pub struct TermPresentationPlugin {
    pub mode: TermMode,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Resource)]
pub enum TermMode {
    /// Raw terminal, one status line redrawn in place
    Interactive,
    /// Plain lines, captures every result until this many are recorded
    Headless { captures: usize },
}

impl Plugin for TermPresentationPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(self.mode)
            .init_resource::<StatusBoard>()
            .init_resource::<ColorScheme>()
            .add_systems(
                Startup,
                sys_init_board.after(discovery_core::journal::sys_load_journal),
            )
            .add_systems(
                Update,
                (sys_update_board, sys_draw_status)
                    .chain()
                    .after(DiscoverySet::Persist),
            );
        match self.mode {
            TermMode::Interactive => {
                app.init_resource::<TerminalGuard>()
                    .init_resource::<TermEventListener>()
                    .add_systems(First, sys_term_input);
            },
            TermMode::Headless { captures } => {
                app.insert_resource(AutoCapture {
                    remaining: captures,
                })
                .add_systems(Update, sys_auto_capture.after(DiscoverySet::Persist));
            },
        }
    }
}

/// The view the terminal shows and controls.
#[derive(Clone, Copy, Debug, Deref, Resource)]
pub struct ActiveView(pub Entity);

/// Everything the status line is drawn from.
#[derive(Clone, Debug, Default, PartialEq, Resource)]
pub struct StatusBoard {
    pub phase: SequencerPhase,
    pub running: bool,
    pub display: Option<DisplayCandidate>,
    pub discoveries: usize,
    pub total_points: u64,
}

#[derive(Clone, CopyGetters, Debug, Resource)]
#[get_copy = "pub"]
pub struct ColorScheme {
    idle: ContentStyle,
    scanning: ContentStyle,
    analyzing: ContentStyle,
    found: ContentStyle,
    bar: ContentStyle,
    points: ContentStyle,
    totals: ContentStyle,
}

impl Default for ColorScheme {
    fn default() -> Self {
        ColorScheme {
            idle: style(Some(Color::Grey), None, None),
            scanning: style(Some(Color::Cyan), None, Some(Attribute::Bold)),
            analyzing: style(Some(Color::Yellow), None, Some(Attribute::Bold)),
            found: style(
                Some(Color::Black),
                Some(Color::Green),
                Some(Attribute::Bold),
            ),
            bar: style(Some(Color::Green), None, None),
            points: style(Some(Color::Magenta), None, None),
            totals: style(Some(Color::DarkGrey), None, None),
        }
    }
}

pub fn style(fg: Option<Color>, bg: Option<Color>, attr: Option<Attribute>) -> ContentStyle {
    let attributes = attr
        .map(|attr| Attributes::default() | attr)
        .unwrap_or_default();
    ContentStyle {
        foreground_color: fg,
        background_color: bg,
        attributes,
    }
}

/// Pure function of the board: the styled pieces of the status line.
pub fn render_status(board: &StatusBoard, scheme: &ColorScheme) -> Vec<StyledContent<String>> {
    let (tag, tag_style) = match board.phase {
        SequencerPhase::Idle => ("[ waiting ]", scheme.idle()),
        _ if !board.running => ("[ stopped ]", scheme.idle()),
        SequencerPhase::Scanning => ("[ scanning ]", scheme.scanning()),
        SequencerPhase::Analyzing => ("[ analyzing ]", scheme.analyzing()),
        SequencerPhase::Final => ("[ found! ]", scheme.found()),
    };
    let mut pieces = vec![StyledContent::new(tag_style, tag.to_string())];
    if let Some(display) = board.display.as_ref() {
        pieces.push(StyledContent::new(
            ContentStyle::default(),
            format!(" {}", display.label()),
        ));
        if display.confidence_percent() > 0 {
            let filled = display.confidence_percent() as usize * BAR_WIDTH / 100;
            pieces.push(StyledContent::new(
                scheme.bar(),
                format!(
                    " [{}{}] {}%",
                    "#".repeat(filled),
                    "-".repeat(BAR_WIDTH - filled),
                    display.confidence_percent()
                ),
            ));
        }
        if display.points_preview() > 0 {
            pieces.push(StyledContent::new(
                scheme.points(),
                format!(" +{} pts", display.points_preview()),
            ));
        }
    }
    pieces.push(StyledContent::new(
        scheme.totals(),
        format!(
            "  | {} found, {} pts",
            board.discoveries, board.total_points
        ),
    ));
    pieces
}

fn plain_text(pieces: &[StyledContent<String>]) -> String {
    pieces.iter().map(|piece| piece.content().as_str()).collect()
}

/// Puts the terminal in raw mode for as long as it lives.
#[derive(Debug, Resource)]
struct TerminalGuard;

impl TerminalGuard {
    fn new() -> crossterm::Result<Self> {
        Self::reset_terminal_on_panic();
        execute!(
            stdout(),
            crossterm::cursor::Hide,
            crossterm::terminal::SetTitle("Nature Quest")
        )?;
        crossterm::terminal::enable_raw_mode()?;
        Ok(TerminalGuard)
    }

    fn reset_terminal_state() -> crossterm::Result<()> {
        crossterm::terminal::disable_raw_mode()?;
        execute!(stdout(), crossterm::cursor::Show, Print("\r\n"))?;
        Ok(())
    }

    fn reset_terminal_on_panic() {
        let default_hook = panic::take_hook();
        panic::set_hook(Box::new(move |panic_info| {
            log::error!(
                "Panic occurred\n{:#?}\n\nAttempting to reset terminal",
                panic_info
            );
            match Self::reset_terminal_state() {
                Ok(()) => log::info!("Successfully reset terminal"),
                Err(e) => log::error!("Failure resetting terminal: {:#?}", e),
            }
            default_hook(panic_info)
        }))
    }
}

impl Default for TerminalGuard {
    fn default() -> Self {
        match Self::new() {
            Ok(guard) => guard,
            Err(e) => {
                log::error!("Unable to put terminal in raw mode: {:?}", e);
                TerminalGuard
            },
        }
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        match Self::reset_terminal_state() {
            Ok(()) => log::info!("Successfully reset terminal from Drop"),
            Err(e) => log::error!("Failure resetting terminal from Drop: {:#?}", e),
        }
    }
}

#[derive(Deref, Resource)]
struct TermEventListener {
    rx: Mutex<Receiver<CrosstermEvent>>,
}

impl std::fmt::Debug for TermEventListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TermEventListener").finish_non_exhaustive()
    }
}

impl Default for TermEventListener {
    fn default() -> Self {
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let duration = Duration::from_millis(100);
            loop {
                match crossterm::event::poll(duration) {
                    Ok(false) => {},
                    Err(e) => {
                        log::error!("Error polling terminal events: {:?}", e);
                        break;
                    },
                    Ok(true) => match crossterm::event::read() {
                        Ok(event) => {
                            if tx.send(event).is_err() {
                                // Receiver is gone, the app is shutting down
                                break;
                            }
                        },
                        Err(e) => {
                            log::error!("Error reading terminal events: {:?}", e);
                            break;
                        },
                    },
                }
            }
        });
        TermEventListener { rx: Mutex::new(rx) }
    }
}

/// What a key press asks for.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KeyCommand {
    Sequencer(SequencerOp),
    Capture,
    Quit,
}

pub fn key_command(event: &KeyEvent) -> Option<KeyCommand> {
    match event.code {
        KeyCode::Char('c') if event.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(KeyCommand::Quit)
        },
        KeyCode::Char('s') => Some(KeyCommand::Sequencer(SequencerOp::Start)),
        KeyCode::Char('x') => Some(KeyCommand::Sequencer(SequencerOp::Stop)),
        KeyCode::Char('r') => Some(KeyCommand::Sequencer(SequencerOp::Reset)),
        KeyCode::Char('c') | KeyCode::Enter | KeyCode::Char(' ') => Some(KeyCommand::Capture),
        KeyCode::Char('q') | KeyCode::Esc => Some(KeyCommand::Quit),
        _ => None,
    }
}

fn sys_term_input(
    listener: Res<TermEventListener>,
    active_view: Res<ActiveView>,
    mut evw_sequencer_op: EventWriter<discovery_core::op::Op<SequencerOp>>,
    mut evw_capture_op: EventWriter<discovery_core::op::Op<CaptureOp>>,
    mut evw_exit: EventWriter<AppExit>,
) {
    let Ok(rx) = listener.try_lock() else {
        log::error!("Terminal event receiver is unavailable");
        return;
    };
    loop {
        match rx.try_recv() {
            Ok(CrosstermEvent::Key(key_event)) => match key_command(&key_event) {
                Some(KeyCommand::Sequencer(op)) => {
                    evw_sequencer_op.send(op.for_view(**active_view));
                },
                Some(KeyCommand::Capture) => {
                    evw_capture_op.send(CaptureOp.for_view(**active_view));
                },
                Some(KeyCommand::Quit) => {
                    evw_exit.send(AppExit::Success);
                },
                None => {},
            },
            Ok(_) => {},
            Err(TryRecvError::Empty) => break,
            Err(TryRecvError::Disconnected) => {
                log::error!("Terminal listener thread closed unexpectedly");
                break;
            },
        }
    }
}

fn sys_init_board(res_journal: Res<Journal>, mut res_board: ResMut<StatusBoard>) {
    res_board.discoveries = res_journal.len();
    res_board.total_points = res_journal.total_points();
}

fn sys_update_board(
    active_view: Res<ActiveView>,
    res_mode: Res<TermMode>,
    mut evr_updated: EventReader<SequencerUpdated>,
    mut evr_recorded: EventReader<DiscoveryRecorded>,
    res_journal: Res<Journal>,
    mut res_board: ResMut<StatusBoard>,
) {
    for update in evr_updated.read() {
        if update.view != **active_view {
            continue;
        }
        let board = StatusBoard {
            phase: update.phase,
            running: update.running,
            display: update.display.clone(),
            ..res_board.clone()
        };
        res_board.set_if_neq(board);
    }
    for DiscoveryRecorded { discovery, .. } in evr_recorded.read() {
        let announcement = format!(
            "Captured {} ({:?}, {}% confidence) for {} points!",
            discovery.species_name(),
            discovery.rarity_tier(),
            discovery.confidence_percent(),
            discovery.points()
        );
        if let Err(e) = announce(&announcement, *res_mode) {
            log::error!("Unable to write to terminal: {:?}", e);
        }
        res_board.discoveries = res_journal.len();
        res_board.total_points = res_journal.total_points();
    }
}

fn announce(message: &str, mode: TermMode) -> crossterm::Result<()> {
    let mut out = stdout();
    match mode {
        TermMode::Interactive => {
            queue!(
                out,
                Print("\r"),
                Clear(ClearType::CurrentLine),
                Print(message),
                Print("\r\n")
            )?;
        },
        TermMode::Headless { .. } => {
            queue!(out, Print(message), Print("\n"))?;
        },
    }
    out.flush()?;
    Ok(())
}

fn sys_draw_status(
    res_board: Res<StatusBoard>,
    res_scheme: Res<ColorScheme>,
    res_mode: Res<TermMode>,
) {
    if !res_board.is_changed() {
        return;
    }
    let pieces = render_status(&res_board, &res_scheme);
    if let Err(e) = draw_status(&pieces, *res_mode) {
        log::error!("Unable to draw status line: {:?}", e);
    }
}

fn draw_status(pieces: &[StyledContent<String>], mode: TermMode) -> crossterm::Result<()> {
    let mut out = stdout();
    match mode {
        TermMode::Interactive => {
            queue!(out, Print("\r"), Clear(ClearType::CurrentLine))?;
            for piece in pieces {
                queue!(out, PrintStyledContent(piece.clone()))?;
            }
        },
        TermMode::Headless { .. } => {
            queue!(out, Print(plain_text(pieces)), Print("\n"))?;
        },
    }
    out.flush()?;
    Ok(())
}

#[derive(Debug, Resource)]
struct AutoCapture {
    remaining: usize,
}

fn sys_auto_capture(
    mut res_auto_capture: ResMut<AutoCapture>,
    mut evr_updated: EventReader<SequencerUpdated>,
    mut evr_recorded: EventReader<DiscoveryRecorded>,
    mut evw_capture_op: EventWriter<discovery_core::op::Op<CaptureOp>>,
    mut evw_exit: EventWriter<AppExit>,
) {
    for update in evr_updated.read() {
        if update.running
            && update.phase == SequencerPhase::Final
            && res_auto_capture.remaining > 0
        {
            evw_capture_op.send(CaptureOp.for_view(update.view));
        }
    }
    for _ in evr_recorded.read() {
        res_auto_capture.remaining = res_auto_capture.remaining.saturating_sub(1);
        if res_auto_capture.remaining == 0 {
            log::info!("Captured everything that was asked for, exiting");
            evw_exit.send(AppExit::Success);
        }
    }
}
