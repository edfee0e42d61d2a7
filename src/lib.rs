//! Keyboard movement controls for Bevy entities.
//!
//! Attach [`KeyboardControls`] to an entity and this crate will:
//!
//! - track which physical keys are held down for that entity ([`PressedKeys`]),
//! - turn WASD and the arrow keys into a movement delta every frame ([`KeyboardVelocity`]),
//! - re-emit captured key transitions as entity-scoped [`KeyboardControlEvent`]s named like
//!   `keydown:KeyW`,
//! - and optionally read keys from a remote or recorded [`ProxyControls`] source instead of the
//!   local keyboard.
//!
//! Keys come from bevy's [`KeyboardInput`](bevy::input::keyboard::KeyboardInput) events, so any
//! windowing backend works. A terminal backend built on crossterm is included in
//! [`terminal`] and [`terminal_input`].
//!
//! # Example
//!
//! ```no_run
//! use bevy::prelude::*;
//! use bevy_keyboard_controls::{KeyboardControls, KeyboardControlsPlugins, KeyboardVelocity};
//!
//! fn main() {
//!     App::new()
//!         .add_plugins((MinimalPlugins, KeyboardControlsPlugins::default()))
//!         .add_systems(Startup, |mut commands: Commands| {
//!             commands.spawn(KeyboardControls::default());
//!         })
//!         .add_systems(Update, print_velocity)
//!         .run();
//! }
//!
//! fn print_velocity(query: Query<&KeyboardVelocity, Changed<KeyboardVelocity>>) {
//!     for velocity in &query {
//!         info!("moving by {:?}", velocity.delta);
//!     }
//! }
//! ```
use bevy::{input::InputSystem, prelude::*, window::WindowFocused};

pub mod capture;
pub mod controls;
pub mod error;
pub mod movement;
mod plugins;
pub mod proxy;
pub mod relay;
pub mod terminal;
pub mod terminal_input;

pub use capture::{CapturePolicy, KeyCapture, TextFocus};
pub use controls::{Controls, ControlsPaused, KeyListener, KeyMap, KeyboardControls, PressedKeys};
pub use movement::{Directions, KeyboardVelocity, LastDirection, MovementDirection};
pub use plugins::KeyboardControlsPlugins;
pub use proxy::{ProxyControls, ProxyKeyboard, ProxySource};
pub use relay::{InputOrigin, KeyAction, KeyboardControlEvent};

/// Ordering of the systems this crate runs in [`PreUpdate`].
///
/// Key sources run before bevy's [`InputSystem`], everything else after it, so that systems in
/// [`Update`] always observe this frame's key state and movement.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum ControlsSet {
    /// Backends that produce [`KeyboardInput`](bevy::input::keyboard::KeyboardInput) events.
    Source,
    /// Attaching and detaching key listeners.
    Lifecycle,
    /// Updating pressed keys and relaying key events.
    Track,
    /// Computing the movement delta.
    Resolve,
}

/// Tracks keys and resolves movement for every entity with [`KeyboardControls`].
///
/// Input comes from bevy's [`KeyboardInput`](bevy::input::keyboard::KeyboardInput) and
/// [`WindowFocused`] events. Use [`KeyboardControlsPlugins`] to also read keys from the terminal.
pub struct KeyboardControlsPlugin;

impl Plugin for KeyboardControlsPlugin {
    fn build(&self, app: &mut App) {
        if !app.is_plugin_added::<bevy::input::InputPlugin>() {
            // Provides `KeyboardInput` and `ButtonInput<KeyCode>`.
            app.add_plugins(bevy::input::InputPlugin);
        }
        app.add_event::<WindowFocused>()
            .add_event::<KeyboardControlEvent>()
            .init_resource::<CapturePolicy>()
            .init_resource::<TextFocus>()
            .configure_sets(PreUpdate, ControlsSet::Source.before(InputSystem))
            .configure_sets(
                PreUpdate,
                (
                    ControlsSet::Lifecycle,
                    ControlsSet::Track,
                    ControlsSet::Resolve,
                )
                    .chain()
                    .after(InputSystem),
            )
            .add_systems(
                PreUpdate,
                (
                    controls::release_removed_listeners,
                    controls::detach_listeners,
                    controls::attach_listeners,
                    controls::clear_when_disabled,
                )
                    .chain()
                    .in_set(ControlsSet::Lifecycle),
            )
            .add_systems(PreUpdate, controls::track_keys.in_set(ControlsSet::Track))
            .add_systems(
                PreUpdate,
                movement::resolve_movement.in_set(ControlsSet::Resolve),
            );
    }
}
