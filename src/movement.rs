//! Turning held keys into a movement delta.
//!
//! The mapping is fixed:
//!
//! | keys               | direction  | delta  |
//! |--------------------|------------|--------|
//! | `KeyW`, `ArrowUp`    | forward    | z - 1  |
//! | `KeyA`, `ArrowLeft`  | left       | x - 1  |
//! | `KeyS`, `ArrowDown`  | backward   | z + 1  |
//! | `KeyD`, `ArrowRight` | right      | x + 1  |
//!
//! Opposite keys cancel out and the y axis is never touched. The delta is not normalized, so a
//! diagonal has length √2; scale it however your movement code wants.
use bevy::prelude::*;

use crate::{
    controls::{any_held, is_held, ControlsPaused, KeyMap, KeyboardControls, PressedKeys},
    proxy::{effective_keys, ProxySource},
};

/// A direction the keys can move an entity in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MovementDirection {
    Forward,
    Backward,
    Left,
    Right,
}

bitflags::bitflags! {
    /// The set of directions whose keys are held.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Directions: u8 {
        const FORWARD = 0b0001;
        const LEFT = 0b0010;
        const BACKWARD = 0b0100;
        const RIGHT = 0b1000;
    }
}

struct AxisRule {
    keys: [KeyCode; 2],
    flag: Directions,
    direction: MovementDirection,
    step: Vec3,
}

/// Evaluated in this order; [`LastDirection`] depends on it.
const RULES: [AxisRule; 4] = [
    AxisRule {
        keys: [KeyCode::KeyW, KeyCode::ArrowUp],
        flag: Directions::FORWARD,
        direction: MovementDirection::Forward,
        step: Vec3::NEG_Z,
    },
    AxisRule {
        keys: [KeyCode::KeyA, KeyCode::ArrowLeft],
        flag: Directions::LEFT,
        direction: MovementDirection::Left,
        step: Vec3::NEG_X,
    },
    AxisRule {
        keys: [KeyCode::KeyS, KeyCode::ArrowDown],
        flag: Directions::BACKWARD,
        direction: MovementDirection::Backward,
        step: Vec3::Z,
    },
    AxisRule {
        keys: [KeyCode::KeyD, KeyCode::ArrowRight],
        flag: Directions::RIGHT,
        direction: MovementDirection::Right,
        step: Vec3::X,
    },
];

impl Directions {
    /// The summed delta of every direction in the set.
    pub fn delta(self) -> Vec3 {
        RULES
            .iter()
            .filter(|rule| self.contains(rule.flag))
            .fold(Vec3::ZERO, |delta, rule| delta + rule.step)
    }

    /// The direction evaluated last among those in the set (forward, left, backward, right).
    pub fn last(self) -> Option<MovementDirection> {
        RULES
            .iter()
            .filter(|rule| self.contains(rule.flag))
            .last()
            .map(|rule| rule.direction)
    }
}

impl From<MovementDirection> for Directions {
    fn from(direction: MovementDirection) -> Self {
        match direction {
            MovementDirection::Forward => Directions::FORWARD,
            MovementDirection::Backward => Directions::BACKWARD,
            MovementDirection::Left => Directions::LEFT,
            MovementDirection::Right => Directions::RIGHT,
        }
    }
}

/// The directions whose keys are held in `keys`.
pub fn held_directions(keys: &KeyMap) -> Directions {
    RULES
        .iter()
        .filter(|rule| rule.keys.iter().any(|code| is_held(keys, *code)))
        .fold(Directions::empty(), |held, rule| held | rule.flag)
}

/// The movement delta for `keys`. Always zero while `controls` is disabled.
pub fn velocity_delta(controls: &KeyboardControls, keys: &KeyMap) -> Vec3 {
    if !controls.enabled {
        return Vec3::ZERO;
    }
    held_directions(keys).delta()
}

/// Whether `controls` is enabled and any key at all is held.
pub fn is_velocity_active(controls: &KeyboardControls, keys: &KeyMap) -> bool {
    controls.enabled && any_held(keys)
}

/// This frame's movement intent, refreshed in [`PreUpdate`]. Zero while paused.
#[derive(Component, Debug, Default, Clone, Copy, PartialEq)]
pub struct KeyboardVelocity {
    pub delta: Vec3,
    /// Enabled and at least one key held. Any key counts, not just movement keys.
    pub active: bool,
}

/// The most recent direction that contributed to the delta.
///
/// When several directions are held, the last one in forward, left, backward, right order wins.
/// Keeps its value while no movement key is held.
#[derive(Component, Debug, Default, Clone, Copy, PartialEq, Eq, Deref)]
pub struct LastDirection(pub Option<MovementDirection>);

pub(crate) fn resolve_movement(
    proxy: Option<Res<ProxySource>>,
    mut controls: Query<(
        &KeyboardControls,
        &PressedKeys,
        &mut KeyboardVelocity,
        &mut LastDirection,
        Has<ControlsPaused>,
    )>,
) {
    for (controls, pressed, mut velocity, mut last, paused) in &mut controls {
        let keys = effective_keys(pressed, proxy.as_deref());
        let moving = controls.enabled && !paused;
        let directions = if moving {
            held_directions(&keys)
        } else {
            Directions::empty()
        };
        velocity.set_if_neq(KeyboardVelocity {
            delta: directions.delta(),
            active: moving && any_held(&keys),
        });
        if let Some(direction) = directions.last() {
            last.set_if_neq(LastDirection(Some(direction)));
        }
    }
}
