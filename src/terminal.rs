//! The terminal as a keyboard.
//!
//! [`TerminalPlugin`] prepares the terminal for key input: raw mode, the alternate screen, focus
//! change reporting and, when available, the [kitty keyboard protocol] so that key releases are
//! reported. It spawns a [`TerminalWindow`] entity that stands in for the window of forwarded key
//! and focus events. Everything is restored when [`TerminalContext`] is dropped.
//!
//! [kitty keyboard protocol]: https://sw.kovidgoyal.net/kitty/keyboard-protocol/
use std::io::{self, stdout, Stdout};

use bevy::prelude::*;
use color_eyre::Result;
use crossterm::{
    cursor,
    event::{
        DisableFocusChange, EnableFocusChange, KeyboardEnhancementFlags,
        PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
    },
    terminal::{
        disable_raw_mode, enable_raw_mode, supports_keyboard_enhancement, EnterAlternateScreen,
        LeaveAlternateScreen,
    },
    ExecutableCommand,
};
use ratatui::backend::CrosstermBackend;

use crate::error::exit_on_error;

/// Sets up the terminal for key input. See the [module docs](self).
pub struct TerminalPlugin {
    pub enable_kitty_protocol: bool,
}

impl Default for TerminalPlugin {
    fn default() -> Self {
        Self {
            enable_kitty_protocol: true,
        }
    }
}

impl Plugin for TerminalPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(TerminalSettings {
            enable_kitty_protocol: self.enable_kitty_protocol,
        })
        .add_systems(Startup, setup.pipe(exit_on_error));
    }
}

#[derive(Resource, Debug, Clone, Copy)]
pub struct TerminalSettings {
    pub enable_kitty_protocol: bool,
}

/// Stands in for a window on key and focus events that come from the terminal.
#[derive(Component, Debug, Default)]
pub struct TerminalWindow;

/// Present when the kitty keyboard protocol is active. Pops the protocol flags when dropped.
#[derive(Resource, Debug)]
pub struct KittyEnabled;

impl Drop for KittyEnabled {
    fn drop(&mut self) {
        let _ = stdout().execute(PopKeyboardEnhancementFlags);
    }
}

/// A startup system that sets up the terminal.
pub fn setup(mut commands: Commands, settings: Res<TerminalSettings>) -> Result<()> {
    let context = TerminalContext::init()?;
    commands.insert_resource(context);
    if settings.enable_kitty_protocol {
        match enable_kitty_protocol() {
            Ok(()) => commands.insert_resource(KittyEnabled),
            Err(err) => info!("key releases will be emulated: {err}"),
        }
    }
    commands.spawn(TerminalWindow);
    Ok(())
}

/// Enables the kitty keyboard protocol, which reports key releases and repeats.
pub fn enable_kitty_protocol() -> io::Result<()> {
    if !supports_keyboard_enhancement()? {
        return Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "the kitty keyboard protocol is not supported by this terminal",
        ));
    }
    stdout().execute(PushKeyboardEnhancementFlags(
        KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES
            | KeyboardEnhancementFlags::REPORT_EVENT_TYPES,
    ))?;
    Ok(())
}

/// A [`ratatui::Terminal`] on stdout that owns the terminal's input modes.
///
/// Draw through it like any ratatui terminal:
///
/// ```no_run
/// use bevy::prelude::*;
/// use bevy_keyboard_controls::terminal::TerminalContext;
///
/// fn draw(mut context: ResMut<TerminalContext>) -> color_eyre::Result<()> {
///     context.draw(|frame| frame.render_widget("WASD to move", frame.size()))?;
///     Ok(())
/// }
/// ```
#[derive(Resource, Deref, DerefMut)]
pub struct TerminalContext(ratatui::Terminal<CrosstermBackend<Stdout>>);

impl TerminalContext {
    /// Enters the alternate screen, enables focus reporting and raw mode.
    pub fn init() -> io::Result<Self> {
        stdout()
            .execute(EnterAlternateScreen)?
            .execute(EnableFocusChange)?;
        enable_raw_mode()?;
        let terminal = ratatui::Terminal::new(CrosstermBackend::new(stdout()))?;
        Ok(Self(terminal))
    }

    /// Leaves the alternate screen and raw mode.
    pub fn restore() -> io::Result<()> {
        stdout()
            .execute(DisableFocusChange)?
            .execute(LeaveAlternateScreen)?
            .execute(cursor::Show)?;
        disable_raw_mode()?;
        Ok(())
    }
}

impl Drop for TerminalContext {
    fn drop(&mut self) {
        if let Err(err) = TerminalContext::restore() {
            eprintln!("Failed to restore terminal: {err}");
        }
    }
}
