use bevy::{app::PluginGroupBuilder, prelude::*};

use crate::{error, terminal, terminal_input, KeyboardControlsPlugin};

/// A plugin group that includes the keyboard controls and, optionally, the terminal key source.
///
/// # Example
///
/// ```no_run
/// use bevy::prelude::*;
/// use bevy_keyboard_controls::KeyboardControlsPlugins;
///
/// App::new().add_plugins(KeyboardControlsPlugins {
///     enable_terminal_input: true,
///     ..default()
/// });
/// ```
pub struct KeyboardControlsPlugins {
    /// Read keys from the terminal through crossterm. Puts the terminal in raw mode.
    pub enable_terminal_input: bool,
    /// Use the kitty keyboard protocol if the terminal supports it. Only used with terminal input.
    pub enable_kitty_protocol: bool,
}

impl Default for KeyboardControlsPlugins {
    fn default() -> Self {
        Self {
            enable_terminal_input: false,
            enable_kitty_protocol: true,
        }
    }
}

impl PluginGroup for KeyboardControlsPlugins {
    fn build(self) -> PluginGroupBuilder {
        let mut builder = PluginGroupBuilder::start::<Self>().add(KeyboardControlsPlugin);
        if self.enable_terminal_input {
            builder = builder
                .add(error::ErrorPlugin)
                .add(terminal::TerminalPlugin {
                    enable_kitty_protocol: self.enable_kitty_protocol,
                })
                .add(terminal_input::TerminalInputPlugin);
        }
        builder
    }
}
