//! Deciding which key events the controls may intercept.
//!
//! Keys typed into a text field should not also move the player. The [`CapturePolicy`] resource
//! decides, per [`KeyboardInput`] event, whether listeners see it at all.
use std::{collections::HashSet, fmt};

use bevy::{
    ecs::system::SystemParam,
    input::{keyboard::KeyboardInput, ButtonState},
    prelude::*,
};

const META_KEYS: [KeyCode; 3] = [KeyCode::SuperLeft, KeyCode::SuperRight, KeyCode::Meta];

/// Which key events are captured by [`KeyboardControls`](crate::KeyboardControls).
///
/// - [`Automatic`][CapturePolicy::Automatic] captures events unless a text field has focus (see
///   [`TextFocus`]) or a Super/Meta key is held, so system shortcuts are left alone.
/// - [`Always`][CapturePolicy::Always] captures every event.
/// - [`Manual`][CapturePolicy::Manual] asks the given function.
#[derive(Resource, Default, Clone, Copy)]
pub enum CapturePolicy {
    #[default]
    Automatic,
    Always,
    Manual(fn(&KeyboardInput) -> bool),
}

impl fmt::Debug for CapturePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapturePolicy::Automatic => f.write_str("Automatic"),
            CapturePolicy::Always => f.write_str("Always"),
            CapturePolicy::Manual(_) => f.write_str("Manual(..)"),
        }
    }
}

impl CapturePolicy {
    /// Returns whether `input` should be captured given the focused text field, if any, and
    /// whether a meta key is held.
    pub fn allows(&self, input: &KeyboardInput, text_focus: Option<Entity>, meta_held: bool) -> bool {
        match self {
            CapturePolicy::Automatic => text_focus.is_none() && !meta_held,
            CapturePolicy::Always => true,
            CapturePolicy::Manual(predicate) => predicate(input),
        }
    }
}

/// The text input entity that currently has keyboard focus.
///
/// Set this from your UI code while a text field is being edited.
#[derive(Resource, Debug, Default, Clone, Copy, PartialEq, Eq, Deref, DerefMut)]
pub struct TextFocus(pub Option<Entity>);

/// The Super/Meta keys held according to the key events seen so far.
#[derive(Debug, Default)]
pub struct MetaKeys(HashSet<KeyCode>);

impl MetaKeys {
    pub fn observe(&mut self, input: &KeyboardInput) {
        if !META_KEYS.contains(&input.key_code) {
            return;
        }
        match input.state {
            ButtonState::Pressed => self.0.insert(input.key_code),
            ButtonState::Released => self.0.remove(&input.key_code),
        };
    }

    pub fn is_held(&self) -> bool {
        !self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

/// Evaluates the [`CapturePolicy`] against the current focus and modifier state.
///
/// The modifier state is replayed from the events themselves, so [`should_capture`] must see
/// every event in the order it arrived.
///
/// [`should_capture`]: KeyCapture::should_capture
#[derive(SystemParam)]
pub struct KeyCapture<'w, 's> {
    policy: Res<'w, CapturePolicy>,
    focus: Res<'w, TextFocus>,
    meta: Local<'s, MetaKeys>,
}

impl KeyCapture<'_, '_> {
    pub fn should_capture(&mut self, input: &KeyboardInput) -> bool {
        self.meta.observe(input);
        self.policy.allows(input, self.focus.0, self.meta.is_held())
    }

    /// Forgets held modifiers, e.g. after the window lost focus.
    pub fn reset(&mut self) {
        self.meta.clear();
    }
}

#[cfg(test)]
mod tests {
    use bevy::input::keyboard::{Key, NativeKey};

    use super::*;
    use crate::{
        controls::tests::{app, press, relayed},
        KeyboardControls,
    };

    fn input(key_code: KeyCode) -> KeyboardInput {
        KeyboardInput {
            key_code,
            logical_key: Key::Unidentified(NativeKey::Unidentified),
            state: ButtonState::Pressed,
            repeat: false,
            window: Entity::PLACEHOLDER,
        }
    }

    #[test]
    fn automatic_policy() {
        let policy = CapturePolicy::Automatic;
        let w = input(KeyCode::KeyW);
        assert!(policy.allows(&w, None, false));
        assert!(!policy.allows(&w, Some(Entity::PLACEHOLDER), false));
        assert!(!policy.allows(&w, None, true));
    }

    #[test]
    fn always_policy_ignores_focus_and_meta() {
        let policy = CapturePolicy::Always;
        assert!(policy.allows(&input(KeyCode::KeyW), Some(Entity::PLACEHOLDER), true));
    }

    #[test]
    fn manual_policy_asks_the_predicate() {
        fn arrows_only(input: &KeyboardInput) -> bool {
            matches!(
                input.key_code,
                KeyCode::ArrowUp | KeyCode::ArrowDown | KeyCode::ArrowLeft | KeyCode::ArrowRight
            )
        }
        let policy = CapturePolicy::Manual(arrows_only);
        assert!(policy.allows(&input(KeyCode::ArrowUp), None, false));
        assert!(!policy.allows(&input(KeyCode::KeyW), None, false));
        assert_eq!(format!("{policy:?}"), "Manual(..)");
    }

    #[test]
    fn meta_keys_follow_presses_and_releases() {
        let mut meta = MetaKeys::default();
        meta.observe(&input(KeyCode::KeyW));
        assert!(!meta.is_held());

        meta.observe(&input(KeyCode::SuperLeft));
        meta.observe(&input(KeyCode::SuperRight));
        assert!(meta.is_held());

        let mut released = input(KeyCode::SuperLeft);
        released.state = ButtonState::Released;
        meta.observe(&released);
        assert!(meta.is_held());
        released.key_code = KeyCode::SuperRight;
        meta.observe(&released);
        assert!(!meta.is_held());
    }

    #[test]
    fn manual_policy_filters_tracked_keys() {
        let mut app = app();
        app.insert_resource(CapturePolicy::Manual(|input| input.key_code != KeyCode::KeyW));
        let entity = app.world_mut().spawn(KeyboardControls::default()).id();

        press(&mut app, KeyCode::KeyW);
        press(&mut app, KeyCode::KeyA);
        app.update();

        let keys = app.world().get::<crate::PressedKeys>(entity).unwrap();
        assert!(!keys.is_pressed(KeyCode::KeyW));
        assert!(keys.is_pressed(KeyCode::KeyA));
        let names: Vec<_> = relayed(&app).into_iter().map(|event| event.name).collect();
        assert_eq!(names, ["keydown:KeyA"]);
    }
}
