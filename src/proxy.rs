//! Reading keys from somewhere other than the local keyboard.
//!
//! A [`ProxyControls`] source, such as a recording being replayed or a remote player, can take
//! over the keys of every controlled entity. Insert it once as a [`ProxySource`] resource; while it
//! reports itself connected, [`Controls`](crate::Controls) and the movement resolver read its
//! snapshot instead of each entity's [`PressedKeys`]. Local tracking keeps running underneath and
//! takes effect again as soon as the proxy disconnects.
use std::{
    borrow::Cow,
    sync::{Arc, PoisonError, RwLock},
};

use bevy::prelude::*;

use crate::controls::{KeyMap, PressedKeys};

/// A source of key state other than the local keyboard.
pub trait ProxyControls: Send + Sync + 'static {
    /// Whether the source is live. Disconnected sources are ignored.
    fn is_connected(&self) -> bool;

    /// A snapshot of the keys the source holds down.
    fn keyboard(&self) -> KeyMap;
}

/// The proxy in use, if this resource exists.
#[derive(Resource, Clone, Deref)]
pub struct ProxySource(pub Arc<dyn ProxyControls>);

impl ProxySource {
    pub fn new(proxy: impl ProxyControls) -> Self {
        Self(Arc::new(proxy))
    }
}

impl<T: ProxyControls> From<Arc<T>> for ProxySource {
    fn from(proxy: Arc<T>) -> Self {
        Self(proxy)
    }
}

/// Whether a proxy is present and connected.
pub fn is_proxied(proxy: Option<&ProxySource>) -> bool {
    proxy.is_some_and(|proxy| proxy.is_connected())
}

/// The keys that drive an entity: the proxy's snapshot while it is connected, otherwise the
/// entity's own keys.
pub fn effective_keys<'a>(local: &'a PressedKeys, proxy: Option<&ProxySource>) -> Cow<'a, KeyMap> {
    match proxy {
        Some(proxy) if proxy.is_connected() => Cow::Owned(proxy.keyboard()),
        _ => Cow::Borrowed(local.as_map()),
    }
}

#[derive(Debug, Default)]
struct ProxyState {
    connected: bool,
    keys: KeyMap,
}

/// A [`ProxyControls`] driven through method calls.
///
/// Share it between the [`ProxySource`] and whatever feeds it, e.g. a network task or a replay
/// system. Writers take a short lock; readers only ever copy the snapshot.
///
/// ```
/// use std::sync::Arc;
///
/// use bevy::prelude::*;
/// use bevy_keyboard_controls::{ProxyKeyboard, ProxySource};
///
/// let remote = Arc::new(ProxyKeyboard::default());
/// let mut app = App::new();
/// app.insert_resource(ProxySource::from(remote.clone()));
///
/// remote.connect();
/// remote.press(KeyCode::KeyW);
/// ```
#[derive(Debug, Default)]
pub struct ProxyKeyboard {
    state: RwLock<ProxyState>,
}

impl ProxyKeyboard {
    pub fn connect(&self) {
        self.write(|state| state.connected = true);
    }

    /// Marks the source disconnected. The snapshot is kept for the next connection.
    pub fn disconnect(&self) {
        self.write(|state| state.connected = false);
    }

    pub fn press(&self, code: KeyCode) {
        self.write(|state| {
            state.keys.insert(code, true);
        });
    }

    pub fn release(&self, code: KeyCode) {
        self.write(|state| {
            state.keys.remove(&code);
        });
    }

    /// Replaces the whole snapshot.
    pub fn set_keyboard(&self, keys: KeyMap) {
        self.write(|state| state.keys = keys);
    }

    fn write(&self, f: impl FnOnce(&mut ProxyState)) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut state);
    }
}

impl ProxyControls for ProxyKeyboard {
    fn is_connected(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .connected
    }

    fn keyboard(&self) -> KeyMap {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use bevy::ecs::system::SystemState;

    use super::*;
    use crate::{
        controls::tests::{app, press, relayed, release},
        Controls, ControlsPaused, KeyboardControls, KeyboardVelocity,
    };

    fn proxied_app() -> (App, Arc<ProxyKeyboard>) {
        let remote = Arc::new(ProxyKeyboard::default());
        let mut app = app();
        app.insert_resource(ProxySource::from(remote.clone()));
        (app, remote)
    }

    #[test]
    fn snapshot_is_used_only_while_connected() {
        let remote = ProxyKeyboard::default();
        remote.press(KeyCode::KeyW);
        let source = ProxySource::new(remote);

        let mut local = PressedKeys::default();
        local.press(KeyCode::KeyD);

        assert!(!is_proxied(Some(&source)));
        assert!(!is_proxied(None));
        assert_eq!(*effective_keys(&local, Some(&source)), *local.as_map());
        assert_eq!(*effective_keys(&local, None), *local.as_map());
    }

    #[test]
    fn connected_proxy_replaces_local_keys() {
        let remote = Arc::new(ProxyKeyboard::default());
        remote.connect();
        remote.press(KeyCode::KeyW);
        let source = ProxySource::from(remote.clone());

        let mut local = PressedKeys::default();
        local.press(KeyCode::KeyD);

        assert!(is_proxied(Some(&source)));
        let keys = effective_keys(&local, Some(&source));
        assert_eq!(keys.len(), 1);
        assert_eq!(keys.get(&KeyCode::KeyW), Some(&true));

        remote.release(KeyCode::KeyW);
        assert!(effective_keys(&local, Some(&source)).is_empty());
    }

    #[test]
    fn set_keyboard_replaces_the_snapshot() {
        let remote = ProxyKeyboard::default();
        remote.press(KeyCode::KeyA);
        remote.set_keyboard([(KeyCode::ArrowUp, true)].into_iter().collect());
        let keys = remote.keyboard();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys.get(&KeyCode::ArrowUp), Some(&true));
    }

    #[test]
    fn local_tracking_continues_while_proxied() {
        let (mut app, remote) = proxied_app();
        let entity = app.world_mut().spawn(KeyboardControls::default()).id();
        remote.connect();
        remote.press(KeyCode::KeyA);

        press(&mut app, KeyCode::KeyD);
        app.update();

        // Listeners still relay local keys.
        assert_eq!(relayed(&app).len(), 1);
        let local = app.world().get::<PressedKeys>(entity).unwrap();
        assert!(local.is_pressed(KeyCode::KeyD));

        let mut state: SystemState<Controls> = SystemState::new(app.world_mut());
        let controls = state.get(app.world());
        assert!(controls.is_proxied());
        assert!(controls.is_pressed(entity, KeyCode::KeyA));
        assert!(!controls.is_pressed(entity, KeyCode::KeyD));
        assert_eq!(controls.velocity_delta(entity), Vec3::NEG_X);
        assert_eq!(
            app.world().get::<KeyboardVelocity>(entity).unwrap().delta,
            Vec3::NEG_X
        );

        remote.disconnect();
        app.update();
        let controls = state.get(app.world());
        assert!(!controls.is_proxied());
        assert!(controls.is_pressed(entity, KeyCode::KeyD));
        assert!(!controls.is_pressed(entity, KeyCode::KeyA));
        assert_eq!(
            app.world().get::<KeyboardVelocity>(entity).unwrap().delta,
            Vec3::X
        );
    }

    #[test]
    fn local_releases_while_proxied_take_effect_after_disconnect() {
        let (mut app, remote) = proxied_app();
        let entity = app.world_mut().spawn(KeyboardControls::default()).id();
        press(&mut app, KeyCode::KeyW);
        app.update();

        remote.connect();
        release(&mut app, KeyCode::KeyW);
        app.update();
        assert!(!app.world().get::<KeyboardVelocity>(entity).unwrap().active);

        remote.disconnect();
        app.update();
        let velocity = app.world().get::<KeyboardVelocity>(entity).unwrap();
        assert_eq!(velocity.delta, Vec3::ZERO);
        assert!(!velocity.active);
    }

    #[test]
    fn disabled_controls_ignore_the_proxy_too() {
        let (mut app, remote) = proxied_app();
        let entity = app
            .world_mut()
            .spawn(KeyboardControls::default().with_enabled(false))
            .id();
        remote.connect();
        remote.press(KeyCode::KeyW);
        app.update();

        let velocity = app.world().get::<KeyboardVelocity>(entity).unwrap();
        assert_eq!(velocity.delta, Vec3::ZERO);
        assert!(!velocity.active);

        let mut state: SystemState<Controls> = SystemState::new(app.world_mut());
        let controls = state.get(app.world());
        assert!(controls.is_pressed(entity, KeyCode::KeyW));
        assert!(!controls.is_velocity_active(entity));
    }

    #[test]
    fn paused_controls_do_not_follow_the_proxy() {
        let (mut app, remote) = proxied_app();
        let entity = app
            .world_mut()
            .spawn((KeyboardControls::default(), ControlsPaused))
            .id();
        remote.connect();
        remote.press(KeyCode::KeyD);
        app.update();

        let velocity = app.world().get::<KeyboardVelocity>(entity).unwrap();
        assert_eq!(*velocity, KeyboardVelocity::default());
        let mut state: SystemState<Controls> = SystemState::new(app.world_mut());
        let controls = state.get(app.world());
        assert!(controls.is_pressed(entity, KeyCode::KeyD));
        assert_eq!(controls.velocity_delta(entity), Vec3::ZERO);
        assert!(!controls.is_velocity_active(entity));

        app.world_mut().entity_mut(entity).remove::<ControlsPaused>();
        app.update();
        assert_eq!(
            app.world().get::<KeyboardVelocity>(entity).unwrap().delta,
            Vec3::X
        );
    }
}
