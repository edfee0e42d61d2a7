//! The [`KeyboardControls`] component and the systems that track its keys.
//!
//! Every entity with [`KeyboardControls`] gets a [`KeyListener`] while it is playing. Listening
//! entities record captured key presses in their [`PressedKeys`] and relay each transition as a
//! [`KeyboardControlEvent`]. Losing window focus clears every listener's keys so nothing stays
//! stuck down.
//!
//! Insert [`ControlsPaused`] to pause an entity. Its listener is detached, its keys are cleared and
//! it does not move, even under a connected proxy, until the marker is removed again.
use std::{borrow::Cow, collections::HashMap};

use bevy::{
    ecs::system::SystemParam,
    input::{keyboard::KeyboardInput, ButtonState},
    prelude::*,
    window::WindowFocused,
};

use crate::{
    capture::KeyCapture,
    movement::{self, KeyboardVelocity, LastDirection},
    proxy::{self, ProxySource},
    relay::{self, InputOrigin, KeyboardControlEvent},
};

/// Maps physical key codes to whether they are held down. Absent keys are not held.
pub type KeyMap = HashMap<KeyCode, bool>;

/// Returns whether `code` is held in `keys`.
pub fn is_held(keys: &KeyMap, code: KeyCode) -> bool {
    keys.get(&code).copied().unwrap_or(false)
}

/// Returns whether any key is held in `keys`.
pub fn any_held(keys: &KeyMap) -> bool {
    keys.values().any(|held| *held)
}

/// Turns keyboard input into movement and key events for this entity.
#[derive(Component, Debug, Clone, PartialEq, Eq)]
#[require(PressedKeys, KeyboardVelocity, LastDirection)]
pub struct KeyboardControls {
    /// Master switch. A disabled entity ignores key input and does not move.
    pub enabled: bool,
    /// Log every relayed key event.
    pub debug: bool,
}

impl Default for KeyboardControls {
    fn default() -> Self {
        Self {
            enabled: true,
            debug: false,
        }
    }
}

impl KeyboardControls {
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

/// Keys held down according to this entity's own listener.
///
/// This is the local state only. Use [`Controls::keys`] for the keys that actually drive the
/// entity, which come from a connected [`ProxySource`] when there is one.
#[derive(Component, Debug, Default, Clone, PartialEq, Eq)]
pub struct PressedKeys(KeyMap);

impl PressedKeys {
    /// Marks `code` as held. Pressing a held key again changes nothing.
    pub fn press(&mut self, code: KeyCode) {
        self.0.insert(code, true);
    }

    /// Forgets `code`. Releasing a key that is not held changes nothing.
    pub fn release(&mut self, code: KeyCode) {
        self.0.remove(&code);
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn is_pressed(&self, code: KeyCode) -> bool {
        is_held(&self.0, code)
    }

    pub fn is_empty(&self) -> bool {
        !any_held(&self.0)
    }

    pub fn as_map(&self) -> &KeyMap {
        &self.0
    }
}

/// Marker that pauses an entity's [`KeyboardControls`].
#[derive(Component, Debug, Default, Clone, Copy)]
pub struct ControlsPaused;

/// The key and focus subscription of a playing entity.
///
/// Inserted and removed by this crate. An entity has at most one, and only entities that have one
/// observe key events.
#[derive(Component, Debug, Default)]
pub struct KeyListener;

pub(crate) fn attach_listeners(
    mut commands: Commands,
    controls: Query<Entity, (With<KeyboardControls>, Without<KeyListener>, Without<ControlsPaused>)>,
) {
    for entity in &controls {
        debug!("attaching key listener to {entity}");
        commands.entity(entity).insert(KeyListener);
    }
}

pub(crate) fn detach_listeners(
    mut commands: Commands,
    mut paused: Query<(Entity, &mut PressedKeys), (With<KeyListener>, With<ControlsPaused>)>,
) {
    for (entity, mut keys) in &mut paused {
        debug!("detaching key listener from {entity}");
        // The release of a held key can no longer be observed.
        keys.clear();
        commands.entity(entity).remove::<KeyListener>();
    }
}

pub(crate) fn release_removed_listeners(
    mut commands: Commands,
    mut removed: RemovedComponents<KeyboardControls>,
    uncontrolled: Query<(), Without<KeyboardControls>>,
) {
    for entity in removed.read() {
        // Despawned entities and entities that got their controls back are left alone.
        if uncontrolled.contains(entity) {
            debug!("releasing key listener of {entity}");
            commands.entity(entity).remove::<(
                KeyListener,
                ControlsPaused,
                PressedKeys,
                KeyboardVelocity,
                LastDirection,
            )>();
        }
    }
}

pub(crate) fn clear_when_disabled(
    mut controls: Query<(&KeyboardControls, &mut PressedKeys), Changed<KeyboardControls>>,
) {
    for (controls, mut keys) in &mut controls {
        if !controls.enabled && !keys.is_empty() {
            keys.clear();
        }
    }
}

type Listeners<'w, 's> = Query<
    'w,
    's,
    (Entity, &'static KeyboardControls, &'static mut PressedKeys),
    With<KeyListener>,
>;

/// Applies this frame's key and focus events to every listener.
///
/// Key and focus events arrive on separate streams. An unfocused window receives no keys, so in a
/// frame that ends unfocused the keys came before the blur, and in a frame that ends focused they
/// came after it.
pub(crate) fn track_keys(
    mut inputs: EventReader<KeyboardInput>,
    mut focus: EventReader<WindowFocused>,
    mut capture: KeyCapture,
    mut controls: Listeners,
    mut relayed: EventWriter<KeyboardControlEvent>,
) {
    let mut blurred = false;
    let mut focused = true;
    for event in focus.read() {
        blurred |= !event.focused;
        focused = event.focused;
    }
    if blurred && focused {
        forget_keys(&mut capture, &mut controls);
    }

    for input in inputs.read() {
        if !capture.should_capture(input) {
            continue;
        }
        for (entity, controls, mut keys) in &mut controls {
            if !controls.enabled {
                continue;
            }
            match input.state {
                ButtonState::Pressed => keys.press(input.key_code),
                ButtonState::Released => keys.release(input.key_code),
            }
            for event in relay::relay(entity, input, InputOrigin::Local) {
                if controls.debug {
                    info!("{entity} emits {} ({:?})", event.name, event.key_code);
                }
                relayed.send(event);
            }
        }
    }

    if blurred && !focused {
        forget_keys(&mut capture, &mut controls);
    }
}

fn forget_keys(capture: &mut KeyCapture, controls: &mut Listeners) {
    capture.reset();
    for (_, _, mut keys) in controls.iter_mut() {
        if !keys.is_empty() {
            keys.clear();
        }
    }
}

/// Read access to the effective key state of controlled entities.
///
/// The effective keys are the [`ProxySource`]'s snapshot while it is connected and the entity's
/// own [`PressedKeys`] otherwise.
///
/// ```
/// use bevy::prelude::*;
/// use bevy_keyboard_controls::Controls;
///
/// fn jump(controls: Controls, players: Query<Entity, With<Name>>) {
///     for player in &players {
///         if controls.is_pressed(player, KeyCode::Space) {
///             info!("{player} jumps");
///         }
///     }
/// }
/// ```
#[derive(SystemParam)]
pub struct Controls<'w, 's> {
    proxy: Option<Res<'w, ProxySource>>,
    controls: Query<
        'w,
        's,
        (
            &'static KeyboardControls,
            &'static PressedKeys,
            Has<ControlsPaused>,
        ),
    >,
}

impl Controls<'_, '_> {
    /// Whether keys are currently read from a connected proxy.
    pub fn is_proxied(&self) -> bool {
        proxy::is_proxied(self.proxy.as_deref())
    }

    /// The effective keys of `entity`, or `None` if it has no [`KeyboardControls`].
    pub fn keys(&self, entity: Entity) -> Option<Cow<'_, KeyMap>> {
        let (_, pressed, _) = self.controls.get(entity).ok()?;
        Some(proxy::effective_keys(pressed, self.proxy.as_deref()))
    }

    pub fn is_pressed(&self, entity: Entity, code: KeyCode) -> bool {
        self.keys(entity).is_some_and(|keys| is_held(&keys, code))
    }

    /// The movement delta of `entity` for the current key state. Paused entities do not move.
    pub fn velocity_delta(&self, entity: Entity) -> Vec3 {
        let Ok((controls, pressed, false)) = self.controls.get(entity) else {
            return Vec3::ZERO;
        };
        let keys = proxy::effective_keys(pressed, self.proxy.as_deref());
        movement::velocity_delta(controls, &keys)
    }

    pub fn is_velocity_active(&self, entity: Entity) -> bool {
        let Ok((controls, pressed, false)) = self.controls.get(entity) else {
            return false;
        };
        let keys = proxy::effective_keys(pressed, self.proxy.as_deref());
        movement::is_velocity_active(controls, &keys)
    }
}
