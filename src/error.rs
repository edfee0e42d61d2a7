//! Error reporting for the terminal key source.
//!
//! The keyboard controls themselves cannot fail. Reading keys from a terminal can: the terminal
//! may refuse raw mode or the event stream may break. Those systems return [`Result`] and are piped
//! into [`exit_on_error`]. [`ErrorPlugin`] makes sure panics and reports are printed to a restored
//! terminal rather than into the alternate screen.
use std::panic;

use bevy::{app::AppExit, prelude::*};
use color_eyre::{
    config::{EyreHook, HookBuilder, PanicHook},
    eyre, Result,
};

use crate::terminal::TerminalContext;

/// Installs color-eyre hooks that restore the terminal before reporting.
pub struct ErrorPlugin;

impl Plugin for ErrorPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, install_hooks.pipe(exit_on_error));
    }
}

/// Installs the panic and error report hooks.
pub fn install_hooks() -> Result<()> {
    let (panic_hook, eyre_hook) = HookBuilder::default()
        .display_env_section(false)
        .into_hooks();
    install_panic_hook(panic_hook);
    install_eyre_hook(eyre_hook)
}

fn install_panic_hook(panic_hook: PanicHook) {
    let panic_hook = panic_hook.into_panic_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let _ = TerminalContext::restore();
        panic_hook(panic_info);
    }));
}

fn install_eyre_hook(eyre_hook: EyreHook) -> Result<()> {
    let eyre_hook = eyre_hook.into_eyre_hook();
    eyre::set_hook(Box::new(move |error| {
        let _ = TerminalContext::restore();
        eyre_hook(error)
    }))?;
    Ok(())
}

/// Logs the error of a piped system and exits the app.
///
/// ```no_run
/// use bevy::prelude::*;
/// use bevy_keyboard_controls::error::exit_on_error;
///
/// fn fallible() -> color_eyre::Result<()> {
///     Ok(())
/// }
///
/// App::new().add_systems(Update, fallible.pipe(exit_on_error));
/// ```
pub fn exit_on_error(In(result): In<Result<()>>, mut app_exit: EventWriter<AppExit>) {
    if let Err(err) = result {
        error!("keyboard controls: {err:?}");
        app_exit.send(AppExit::error());
    }
}
