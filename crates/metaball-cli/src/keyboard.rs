//! Keyboard control surface: `r` starts recording, `s` stops it,
//! `q` / `Esc` / `Ctrl-C` stop the process.
//!
//! Keys are read in raw mode on a dedicated worker thread; the terminal is
//! restored when the thread exits.

use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use metaball_runtime::SharedRecordingState;
use tracing::{info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    StartRecording,
    StopRecording,
    Quit,
    Ignored,
}

/// Map a key press to its action.  Releases and repeats are ignored.
pub fn action_for(key: &KeyEvent) -> KeyAction {
    if key.kind != KeyEventKind::Press {
        return KeyAction::Ignored;
    }
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => KeyAction::Quit,
        KeyCode::Char('r') | KeyCode::Char('R') => KeyAction::StartRecording,
        KeyCode::Char('s') | KeyCode::Char('S') => KeyAction::StopRecording,
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => KeyAction::Quit,
        _ => KeyAction::Ignored,
    }
}

/// Apply `action` to the shared flags.  Recording keys are ignored when
/// `recording_enabled` is false.
pub fn apply(state: &SharedRecordingState, action: KeyAction, recording_enabled: bool) {
    match action {
        KeyAction::StartRecording if recording_enabled => {
            if !state.set_recording(true) {
                info!("recording started");
            }
        }
        KeyAction::StopRecording if recording_enabled => {
            if state.set_recording(false) {
                info!("recording stopped");
            }
        }
        KeyAction::Quit => {
            info!("stop requested from keyboard");
            state.request_stop();
        }
        _ => {}
    }
}

/// Leaves raw mode when dropped.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> std::io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

/// Read keys until `should_stop`.  Returns immediately when stdin is not a
/// terminal; Ctrl-C is then still handled by the signal handler.
pub fn run(state: SharedRecordingState, recording_enabled: bool) {
    let _raw = match RawModeGuard::enable() {
        Ok(guard) => guard,
        Err(e) => {
            warn!(error = %e, "keyboard control unavailable");
            return;
        }
    };
    while !state.should_stop() {
        match event::poll(POLL_INTERVAL) {
            Ok(true) => match event::read() {
                Ok(Event::Key(key)) => apply(&state, action_for(&key), recording_enabled),
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "keyboard read failed");
                    return;
                }
            },
            Ok(false) => {}
            Err(e) => {
                warn!(error = %e, "keyboard poll failed");
                return;
            }
        }
    }
}
