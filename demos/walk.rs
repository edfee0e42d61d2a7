use std::time::Duration;

use bevy::{
    app::{AppExit, ScheduleRunnerPlugin},
    prelude::*,
};
use bevy_keyboard_controls::{
    error::exit_on_error, terminal::TerminalContext, terminal_input::TerminalKeyEvent, Controls,
    KeyboardControlEvent, KeyboardControls, KeyboardControlsPlugins, KeyboardVelocity,
    LastDirection,
};
use crossterm::event::KeyCode as TerminalKeyCode;
use ratatui::text::Text;

const SPEED: f32 = 4.0;

fn main() {
    let frame_rate = Duration::from_secs_f64(1. / 60.);
    App::new()
        .add_plugins((
            MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(frame_rate)),
            KeyboardControlsPlugins {
                enable_terminal_input: true,
                ..default()
            },
        ))
        .add_systems(Startup, spawn_walker)
        .add_systems(Update, (quit_system, walk_system, remember_event_system))
        .add_systems(PostUpdate, ui_system.pipe(exit_on_error))
        .run();
}

#[derive(Component, Default, Deref, DerefMut)]
struct Position(Vec3);

#[derive(Resource, Default, Deref, DerefMut)]
struct LastEvent(String);

fn spawn_walker(mut commands: Commands) {
    commands.spawn((KeyboardControls::default(), Position::default()));
    commands.init_resource::<LastEvent>();
}

fn quit_system(mut keys: EventReader<TerminalKeyEvent>, mut app_exit: EventWriter<AppExit>) {
    for key in keys.read() {
        if matches!(key.code, TerminalKeyCode::Char('q') | TerminalKeyCode::Esc) {
            app_exit.send_default();
        }
    }
}

fn walk_system(time: Res<Time>, mut walkers: Query<(&KeyboardVelocity, &mut Position)>) {
    for (velocity, mut position) in &mut walkers {
        if velocity.active {
            **position += velocity.delta * SPEED * time.delta_secs();
        }
    }
}

fn remember_event_system(
    mut events: EventReader<KeyboardControlEvent>,
    mut last_event: ResMut<LastEvent>,
) {
    if let Some(event) = events.read().last() {
        **last_event = event.name.to_string();
    }
}

fn ui_system(
    mut context: ResMut<TerminalContext>,
    controls: Controls,
    walkers: Query<(Entity, &Position, &KeyboardVelocity, &LastDirection)>,
    last_event: Option<Res<LastEvent>>,
) -> color_eyre::Result<()> {
    let Ok((walker, position, velocity, last_direction)) = walkers.get_single() else {
        return Ok(());
    };
    let mut held: Vec<String> = controls
        .keys(walker)
        .map(|keys| {
            keys.iter()
                .filter(|(_, held)| **held)
                .map(|(code, _)| format!("{code:?}"))
                .collect()
        })
        .unwrap_or_default();
    held.sort();

    context.draw(|frame| {
        let mut text = Text::raw("WASD or arrow keys to walk. Press 'q' to quit.");
        text.push_line("");
        text.push_line(format!(
            "position  x {:>7.2}  z {:>7.2}",
            position.x, position.z
        ));
        text.push_line(format!(
            "delta     x {:>7.2}  z {:>7.2}  {}",
            velocity.delta.x,
            velocity.delta.z,
            if velocity.active { "active" } else { "idle" }
        ));
        text.push_line(format!("heading   {:?}", **last_direction));
        text.push_line(format!("held      {}", held.join(" ")));
        if let Some(last_event) = &last_event {
            text.push_line(format!("event     {}", last_event.as_str()));
        }
        frame.render_widget(text.centered(), frame.size());
    })?;
    Ok(())
}
