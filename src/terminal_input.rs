//! Forwards terminal key and focus events to bevy's input events.
//!
//! Terminal key presses become [`KeyboardInput`] events and losing terminal focus becomes a
//! [`WindowFocused`] event, so the controls treat the terminal like any other window. The raw
//! crossterm events stay available as [`TerminalKeyEvent`]s.
//!
//! # Key releases
//!
//! Without the kitty protocol a terminal only reports presses, and it cannot report two keys held
//! at once. Until a real release is seen, this plugin emulates releases:
//!
//! - pressing another key releases the previously held one,
//! - the held key is released when [`ReleaseKey`] says so.
//!
//! ```no_run
//! # use std::time::Duration;
//! # use bevy::prelude::*;
//! # use bevy_keyboard_controls::terminal_input::ReleaseKey;
//! # let mut app = App::new();
//! app.insert_resource(ReleaseKey::Duration(Duration::from_millis(250)));
//! ```
use std::time::Duration;

use bevy::{
    app::AppExit,
    input::{
        keyboard::{Key, KeyboardInput},
        ButtonState,
    },
    prelude::*,
    window::WindowFocused,
};
use color_eyre::Result;
use crossterm::event::{self, Event as TerminalEvent, KeyEventKind, KeyModifiers};
use smol_str::SmolStr;

use crate::{error::exit_on_error, terminal::TerminalWindow, ControlsSet};

/// Wrapper around `crossterm::event::KeyEvent`.
#[derive(Debug, Deref, Event, PartialEq, Eq, Clone, Hash)]
pub struct TerminalKeyEvent(pub crossterm::event::KeyEvent);

/// Reads terminal events and forwards them to bevy's input events.
pub struct TerminalInputPlugin;

impl Plugin for TerminalInputPlugin {
    fn build(&self, app: &mut App) {
        if !app.is_plugin_added::<bevy::input::InputPlugin>() {
            app.add_plugins(bevy::input::InputPlugin);
        }
        if !app.is_plugin_added::<bevy::time::TimePlugin>() {
            // We need this plugin for the release timer.
            app.add_plugins(bevy::time::TimePlugin);
        }
        app.add_event::<TerminalKeyEvent>()
            .add_event::<WindowFocused>()
            .init_resource::<ReleaseKey>()
            .init_resource::<ReleaseDetected>()
            .add_systems(
                PreUpdate,
                (read_terminal_events.pipe(exit_on_error), forward_key_events)
                    .chain()
                    .in_set(ControlsSet::Source),
            );
    }
}

/// When to emulate the release of the last pressed key. See the [module docs](self).
#[derive(Resource, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseKey {
    /// Release after the key has not repeated for this long.
    Duration(Duration),
    /// Release after this many frames without a repeat.
    FrameCount(u32),
    /// Release on the next frame.
    Immediate,
    /// Hold the key until another key is pressed.
    OnNextKey,
}

impl Default for ReleaseKey {
    /// Slightly longer than the usual initial key repeat delay.
    fn default() -> Self {
        ReleaseKey::Duration(Duration::from_millis(600))
    }
}

/// Whether the terminal has reported a real key release. Once set, emulation stops.
#[derive(Resource, Debug, Default, Deref, DerefMut)]
pub struct ReleaseDetected(pub bool);

#[derive(Debug, Default)]
enum ReleaseKeyState {
    #[default]
    Idle,
    Count(u32),
    Timer(Timer),
}

impl ReleaseKey {
    fn reset(&self, state: &mut ReleaseKeyState) {
        *state = match self {
            ReleaseKey::Duration(duration) => {
                ReleaseKeyState::Timer(Timer::new(*duration, TimerMode::Once))
            }
            _ => ReleaseKeyState::Count(0),
        };
    }

    fn tick(&self, state: &mut ReleaseKeyState, delta: Duration) {
        match state {
            ReleaseKeyState::Count(count) => *count = count.saturating_add(1),
            ReleaseKeyState::Timer(timer) => {
                timer.tick(delta);
            }
            ReleaseKeyState::Idle => {}
        }
    }

    fn finished(&self, state: &ReleaseKeyState) -> bool {
        match (self, state) {
            (ReleaseKey::OnNextKey, _) | (_, ReleaseKeyState::Idle) => false,
            (ReleaseKey::Immediate, ReleaseKeyState::Count(count)) => *count >= 1,
            (ReleaseKey::FrameCount(target), ReleaseKeyState::Count(count)) => count >= target,
            (ReleaseKey::Duration(_), ReleaseKeyState::Timer(timer)) => timer.finished(),
            _ => false,
        }
    }
}

/// The key held by release emulation.
#[derive(Default)]
struct HeldKey {
    input: Option<KeyboardInput>,
    state: ReleaseKeyState,
}

/// Drains pending crossterm events. Ctrl+C exits the app.
pub fn read_terminal_events(
    window: Query<Entity, With<TerminalWindow>>,
    mut keys: EventWriter<TerminalKeyEvent>,
    mut focus: EventWriter<WindowFocused>,
    mut app_exit: EventWriter<AppExit>,
) -> Result<()> {
    while event::poll(Duration::ZERO)? {
        match event::read()? {
            TerminalEvent::Key(key) => {
                if key.kind == KeyEventKind::Press
                    && key.modifiers.contains(KeyModifiers::CONTROL)
                    && key.code == event::KeyCode::Char('c')
                {
                    app_exit.send_default();
                }
                keys.send(TerminalKeyEvent(key));
            }
            focus_event @ (TerminalEvent::FocusGained | TerminalEvent::FocusLost) => {
                if let Ok(window) = window.get_single() {
                    focus.send(WindowFocused {
                        window,
                        focused: focus_event == TerminalEvent::FocusGained,
                    });
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Sends [`KeyboardInput`] events for the terminal keys read this frame, emulating releases until
/// the terminal reports one.
pub(crate) fn forward_key_events(
    time: Res<Time>,
    release_key: Res<ReleaseKey>,
    mut detected: ResMut<ReleaseDetected>,
    window: Query<Entity, With<TerminalWindow>>,
    mut terminal_keys: EventReader<TerminalKeyEvent>,
    mut held: Local<HeldKey>,
    mut keyboard_input: EventWriter<KeyboardInput>,
) {
    let Ok(window) = window.get_single() else {
        terminal_keys.clear();
        return;
    };
    let mut pressed_this_frame = false;
    for key_event in terminal_keys.read() {
        if key_event.kind == KeyEventKind::Release && !**detected {
            debug!("terminal reports key releases, no longer emulating them");
            **detected = true;
            if let Some(previous) = held.input.take() {
                // The emulated press is released here unless this event releases it.
                let releasing = to_bevy_key(&key_event.code).map(|(code, _)| code);
                if releasing != Some(previous.key_code) {
                    keyboard_input.send(released(previous));
                }
            }
        }
        let Some(input) = key_event_to_bevy(key_event, window) else {
            continue;
        };
        if **detected {
            keyboard_input.send(input);
            continue;
        }
        pressed_this_frame = true;
        match held.input.take() {
            Some(previous) if previous.key_code == input.key_code => {
                held.input = Some(previous);
            }
            Some(previous) => {
                keyboard_input.send(released(previous));
                keyboard_input.send(input.clone());
                held.input = Some(input);
            }
            None => {
                keyboard_input.send(input.clone());
                held.input = Some(input);
            }
        }
        release_key.reset(&mut held.state);
    }
    if **detected || held.input.is_none() || pressed_this_frame {
        return;
    }
    release_key.tick(&mut held.state, time.delta());
    if release_key.finished(&held.state) {
        if let Some(previous) = held.input.take() {
            keyboard_input.send(released(previous));
        }
        held.state = ReleaseKeyState::Idle;
    }
}

fn released(input: KeyboardInput) -> KeyboardInput {
    KeyboardInput {
        state: ButtonState::Released,
        repeat: false,
        ..input
    }
}

/// Converts a crossterm key event, or returns `None` for keys without a physical key code.
pub fn key_event_to_bevy(
    key_event: &crossterm::event::KeyEvent,
    window: Entity,
) -> Option<KeyboardInput> {
    let (key_code, logical_key) = to_bevy_key(&key_event.code)?;
    let state = match key_event.kind {
        KeyEventKind::Press | KeyEventKind::Repeat => ButtonState::Pressed,
        KeyEventKind::Release => ButtonState::Released,
    };
    Some(KeyboardInput {
        key_code,
        logical_key,
        state,
        repeat: key_event.kind == KeyEventKind::Repeat,
        window,
    })
}

/// Maps a crossterm key to its physical key code and logical key.
///
/// Terminals report characters rather than keys, so shifted symbols and non-ASCII characters have
/// no physical key code and map to `None`.
pub fn to_bevy_key(code: &event::KeyCode) -> Option<(KeyCode, Key)> {
    use event::KeyCode as c;
    let mapped = match code {
        c::Up => (KeyCode::ArrowUp, Key::ArrowUp),
        c::Down => (KeyCode::ArrowDown, Key::ArrowDown),
        c::Left => (KeyCode::ArrowLeft, Key::ArrowLeft),
        c::Right => (KeyCode::ArrowRight, Key::ArrowRight),
        c::Enter => (KeyCode::Enter, Key::Enter),
        c::Esc => (KeyCode::Escape, Key::Escape),
        c::Tab | c::BackTab => (KeyCode::Tab, Key::Tab),
        c::Backspace => (KeyCode::Backspace, Key::Backspace),
        c::Delete => (KeyCode::Delete, Key::Delete),
        c::Insert => (KeyCode::Insert, Key::Insert),
        c::Home => (KeyCode::Home, Key::Home),
        c::End => (KeyCode::End, Key::End),
        c::PageUp => (KeyCode::PageUp, Key::PageUp),
        c::PageDown => (KeyCode::PageDown, Key::PageDown),
        c::Char(' ') => (KeyCode::Space, Key::Space),
        c::Char(ch) => {
            let mut buffer = [0u8; 4];
            let logical = Key::Character(SmolStr::new(ch.encode_utf8(&mut buffer)));
            (char_key_code(*ch)?, logical)
        }
        _ => return None,
    };
    Some(mapped)
}

const LETTERS: [KeyCode; 26] = [
    KeyCode::KeyA,
    KeyCode::KeyB,
    KeyCode::KeyC,
    KeyCode::KeyD,
    KeyCode::KeyE,
    KeyCode::KeyF,
    KeyCode::KeyG,
    KeyCode::KeyH,
    KeyCode::KeyI,
    KeyCode::KeyJ,
    KeyCode::KeyK,
    KeyCode::KeyL,
    KeyCode::KeyM,
    KeyCode::KeyN,
    KeyCode::KeyO,
    KeyCode::KeyP,
    KeyCode::KeyQ,
    KeyCode::KeyR,
    KeyCode::KeyS,
    KeyCode::KeyT,
    KeyCode::KeyU,
    KeyCode::KeyV,
    KeyCode::KeyW,
    KeyCode::KeyX,
    KeyCode::KeyY,
    KeyCode::KeyZ,
];

const DIGITS: [KeyCode; 10] = [
    KeyCode::Digit0,
    KeyCode::Digit1,
    KeyCode::Digit2,
    KeyCode::Digit3,
    KeyCode::Digit4,
    KeyCode::Digit5,
    KeyCode::Digit6,
    KeyCode::Digit7,
    KeyCode::Digit8,
    KeyCode::Digit9,
];

fn char_key_code(ch: char) -> Option<KeyCode> {
    let key_code = match ch.to_ascii_lowercase() {
        letter @ 'a'..='z' => LETTERS[letter as usize - 'a' as usize],
        digit @ '0'..='9' => DIGITS[digit as usize - '0' as usize],
        '-' => KeyCode::Minus,
        '=' => KeyCode::Equal,
        '[' => KeyCode::BracketLeft,
        ']' => KeyCode::BracketRight,
        '\\' => KeyCode::Backslash,
        ';' => KeyCode::Semicolon,
        '\'' => KeyCode::Quote,
        '`' => KeyCode::Backquote,
        ',' => KeyCode::Comma,
        '.' => KeyCode::Period,
        '/' => KeyCode::Slash,
        _ => return None,
    };
    Some(key_code)
}

#[cfg(test)]
mod tests {
    use bevy::ecs::event::Events;
    use crossterm::event::{KeyCode as TermKey, KeyEvent, KeyEventState};

    use super::*;

    fn app(release_key: ReleaseKey) -> App {
        let mut app = App::new();
        app.add_event::<TerminalKeyEvent>()
            .add_event::<KeyboardInput>()
            .init_resource::<Time>()
            .init_resource::<ReleaseDetected>()
            .insert_resource(release_key)
            .add_systems(Update, forward_key_events);
        app.world_mut().spawn(TerminalWindow);
        app
    }

    fn send(app: &mut App, code: TermKey, kind: KeyEventKind) {
        app.world_mut().send_event(TerminalKeyEvent(KeyEvent {
            code,
            modifiers: KeyModifiers::NONE,
            kind,
            state: KeyEventState::NONE,
        }));
    }

    fn forwarded(app: &App) -> Vec<(KeyCode, ButtonState)> {
        app.world()
            .resource::<Events<KeyboardInput>>()
            .iter_current_update_events()
            .map(|input| (input.key_code, input.state))
            .collect()
    }

    #[test]
    fn maps_keys() {
        assert_eq!(
            to_bevy_key(&TermKey::Char('w')),
            Some((KeyCode::KeyW, Key::Character("w".into())))
        );
        assert_eq!(
            to_bevy_key(&TermKey::Char('W')).map(|(code, _)| code),
            Some(KeyCode::KeyW)
        );
        assert_eq!(
            to_bevy_key(&TermKey::Char('7')).map(|(code, _)| code),
            Some(KeyCode::Digit7)
        );
        assert_eq!(to_bevy_key(&TermKey::Up), Some((KeyCode::ArrowUp, Key::ArrowUp)));
        assert_eq!(to_bevy_key(&TermKey::Char(' ')), Some((KeyCode::Space, Key::Space)));
        assert_eq!(to_bevy_key(&TermKey::Char('é')), None);
        assert_eq!(to_bevy_key(&TermKey::F(1)), None);
    }

    #[test]
    fn repeats_are_pressed_and_flagged() {
        let event = KeyEvent {
            code: TermKey::Char('a'),
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Repeat,
            state: KeyEventState::NONE,
        };
        let input = key_event_to_bevy(&event, Entity::PLACEHOLDER).unwrap();
        assert_eq!(input.state, ButtonState::Pressed);
        assert!(input.repeat);
    }

    #[test]
    fn immediate_release_on_the_next_frame() {
        let mut app = app(ReleaseKey::Immediate);
        send(&mut app, TermKey::Char('w'), KeyEventKind::Press);
        app.update();
        assert_eq!(forwarded(&app), [(KeyCode::KeyW, ButtonState::Pressed)]);

        app.update();
        assert_eq!(forwarded(&app), [(KeyCode::KeyW, ButtonState::Released)]);

        app.update();
        assert!(forwarded(&app).is_empty());
    }

    #[test]
    fn repeats_keep_the_key_held() {
        let mut app = app(ReleaseKey::FrameCount(2));
        send(&mut app, TermKey::Char('w'), KeyEventKind::Press);
        app.update();
        app.update();
        send(&mut app, TermKey::Char('w'), KeyEventKind::Press);
        app.update();
        // The repeat is absorbed and restarts the count.
        assert!(forwarded(&app).is_empty());

        app.update();
        assert!(forwarded(&app).is_empty());
        app.update();
        assert_eq!(forwarded(&app), [(KeyCode::KeyW, ButtonState::Released)]);
    }

    #[test]
    fn another_key_releases_the_held_one() {
        let mut app = app(ReleaseKey::OnNextKey);
        send(&mut app, TermKey::Char('w'), KeyEventKind::Press);
        app.update();
        for _ in 0..5 {
            app.update();
            assert!(forwarded(&app).is_empty());
        }

        send(&mut app, TermKey::Char('d'), KeyEventKind::Press);
        app.update();
        assert_eq!(
            forwarded(&app),
            [
                (KeyCode::KeyW, ButtonState::Released),
                (KeyCode::KeyD, ButtonState::Pressed)
            ]
        );
    }

    #[test]
    fn real_releases_stop_emulation() {
        let mut app = app(ReleaseKey::Immediate);
        send(&mut app, TermKey::Char('w'), KeyEventKind::Press);
        send(&mut app, TermKey::Char('d'), KeyEventKind::Press);
        app.update();
        send(&mut app, TermKey::Char('d'), KeyEventKind::Release);
        app.update();
        assert!(**app.world().resource::<ReleaseDetected>());
        assert_eq!(forwarded(&app), [(KeyCode::KeyD, ButtonState::Released)]);

        send(&mut app, TermKey::Char('a'), KeyEventKind::Press);
        app.update();
        app.update();
        // Held until the terminal says otherwise.
        assert!(forwarded(&app).is_empty());
    }

    #[test]
    fn unmapped_keys_are_dropped() {
        let mut app = app(ReleaseKey::Immediate);
        send(&mut app, TermKey::F(3), KeyEventKind::Press);
        app.update();
        assert!(forwarded(&app).is_empty());
    }
}
