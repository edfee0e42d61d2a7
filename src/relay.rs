//! Entity-scoped key events.
//!
//! Every captured key transition is re-emitted as a [`KeyboardControlEvent`] addressed to the
//! listening entity and named after the transition and the physical key, e.g. `keydown:KeyW` or
//! `keyup:ArrowLeft`. Systems can match on the name or on the typed fields.
use bevy::{
    input::{
        keyboard::{Key, KeyboardInput},
        ButtonState,
    },
    prelude::*,
};
use smol_str::SmolStr;

/// The direction of a key transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAction {
    Down,
    Up,
}

impl KeyAction {
    pub fn as_str(self) -> &'static str {
        match self {
            KeyAction::Down => "keydown",
            KeyAction::Up => "keyup",
        }
    }
}

impl From<ButtonState> for KeyAction {
    fn from(state: ButtonState) -> Self {
        match state {
            ButtonState::Pressed => KeyAction::Down,
            ButtonState::Released => KeyAction::Up,
        }
    }
}

/// Where a relayed key event came from.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum InputOrigin {
    /// The local keyboard, through a [`KeyListener`](crate::KeyListener).
    #[default]
    Local,
    /// A [`ProxyControls`](crate::ProxyControls) source.
    Proxy,
}

/// A key transition relayed to a controlled entity.
#[derive(Event, Debug, Clone, PartialEq, Eq)]
pub struct KeyboardControlEvent {
    /// The entity whose controls captured the key.
    pub entity: Entity,
    /// `keydown`/`keyup`, followed by `:` and the key code for key-specific events.
    pub name: SmolStr,
    pub action: KeyAction,
    pub key_code: KeyCode,
    pub logical_key: Key,
}

impl KeyboardControlEvent {
    /// Whether this is the key-specific form, e.g. `keydown:KeyW`.
    pub fn is_key_specific(&self) -> bool {
        self.name.contains(':')
    }
}

/// The string form of a physical key code, e.g. `KeyW` or `ArrowUp`.
pub fn key_code_name(key_code: KeyCode) -> SmolStr {
    SmolStr::new(format!("{key_code:?}"))
}

/// The name of the key-specific event, e.g. `keydown:KeyW`.
pub fn event_name(action: KeyAction, key_code: KeyCode) -> SmolStr {
    SmolStr::new(format!("{}:{key_code:?}", action.as_str()))
}

/// The events relayed to `entity` for one captured `input`.
///
/// The key-specific event is always produced. The generic `keydown`/`keyup` event is only produced
/// for proxied input; the local listeners never relay proxied input, so in practice only the
/// key-specific event is seen.
pub fn relay(
    entity: Entity,
    input: &KeyboardInput,
    origin: InputOrigin,
) -> impl Iterator<Item = KeyboardControlEvent> {
    let action = KeyAction::from(input.state);
    let event = |name| KeyboardControlEvent {
        entity,
        name,
        action,
        key_code: input.key_code,
        logical_key: input.logical_key.clone(),
    };
    let generic = (origin == InputOrigin::Proxy).then(|| event(SmolStr::new_static(action.as_str())));
    let specific = event(event_name(action, input.key_code));
    generic.into_iter().chain(std::iter::once(specific))
}
