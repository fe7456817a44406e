//! Scriptable in-memory implementations of the external window sources,
//! shared by resolver, bridge, and engine tests.

use std::time::Duration;

use parking_lot::Mutex;

use crate::common::collections::{HashMap, HashSet};
use crate::sys::ax::{AccessibilityTree, AxError, AxHandle, AxWindowInfo, role, subrole};
use crate::sys::geometry::Rect;
use crate::sys::notify::{NotificationSource, NotifyKind, ObserverToken, RawHandler, RawNotification};
use crate::sys::window_server::{
    AppInfo, ListScope, NORMAL_WINDOW_LEVEL, WindowServer, WindowServerId, WindowServerInfo, pid_t,
};

#[derive(Default)]
struct ServerState {
    apps: Vec<AppInfo>,
    windows: Vec<WindowServerInfo>,
}

pub struct FakeWindowServer {
    own_pid: pid_t,
    state: Mutex<ServerState>,
}

impl FakeWindowServer {
    pub fn new(own_pid: pid_t) -> Self {
        FakeWindowServer {
            own_pid,
            state: Mutex::new(ServerState::default()),
        }
    }

    pub fn add_app(&self, pid: pid_t, bundle_id: &str, name: &str) {
        self.state.lock().apps.push(AppInfo {
            pid,
            bundle_id: Some(bundle_id.to_string()),
            name: name.to_string(),
            executable_path: None,
            icon: None,
            is_regular: true,
        });
    }

    pub fn add_background_app(&self, pid: pid_t, bundle_id: &str, name: &str) {
        self.state.lock().apps.push(AppInfo {
            pid,
            bundle_id: Some(bundle_id.to_string()),
            name: name.to_string(),
            executable_path: None,
            icon: None,
            is_regular: false,
        });
    }

    /// Appends an on-screen, layer-zero window. Insertion order is z-order,
    /// front-most first.
    pub fn add_window(&self, id: u32, pid: pid_t, frame: Rect) {
        self.push_window(id, pid, frame, NORMAL_WINDOW_LEVEL, true, None);
    }

    pub fn add_window_at_layer(&self, id: u32, pid: pid_t, frame: Rect, layer: i32) {
        self.push_window(id, pid, frame, layer, true, None);
    }

    /// A window on another virtual desktop: off screen, with the
    /// server-side title the resolver falls back to.
    pub fn add_offscreen_window(&self, id: u32, pid: pid_t, title: &str, frame: Rect) {
        self.push_window(id, pid, frame, NORMAL_WINDOW_LEVEL, false, Some(title.to_string()));
    }

    pub fn remove_window(&self, id: u32) {
        self.state
            .lock()
            .windows
            .retain(|w| w.id != WindowServerId::new(id));
    }

    fn push_window(
        &self,
        id: u32,
        pid: pid_t,
        frame: Rect,
        layer: i32,
        on_screen: bool,
        title: Option<String>,
    ) {
        self.state.lock().windows.push(WindowServerInfo {
            id: WindowServerId::new(id),
            pid,
            layer,
            frame,
            title,
            on_screen,
        });
    }
}

impl WindowServer for FakeWindowServer {
    fn list_windows(&self, scope: ListScope) -> Vec<WindowServerInfo> {
        let state = self.state.lock();
        state
            .windows
            .iter()
            .filter(|w| scope == ListScope::AllSpaces || w.on_screen)
            .cloned()
            .collect()
    }

    fn running_apps(&self) -> Vec<AppInfo> {
        self.state.lock().apps.clone()
    }

    fn own_pid(&self) -> pid_t {
        self.own_pid
    }
}

#[derive(Default)]
struct TreeState {
    trusted: bool,
    windows: HashMap<pid_t, Vec<AxWindowInfo>>,
    probe_only: HashMap<pid_t, Vec<AxWindowInfo>>,
    failures: HashMap<pid_t, AxError>,
    focused: HashMap<pid_t, AxHandle>,
    ids: HashMap<AxHandle, WindowServerId>,
    titles: HashMap<AxHandle, String>,
    frames: HashMap<AxHandle, Rect>,
    dead: HashSet<AxHandle>,
    raised: Vec<AxHandle>,
    frame_calls: Vec<(AxHandle, Rect)>,
}

pub struct FakeTree {
    state: Mutex<TreeState>,
}

impl FakeTree {
    pub fn new() -> Self {
        FakeTree {
            state: Mutex::new(TreeState {
                trusted: true,
                ..TreeState::default()
            }),
        }
    }

    pub fn add_window(&self, pid: pid_t, id: u32, title: &str, frame: Rect) -> AxHandle {
        self.insert(pid, id, title, frame, false, false)
    }

    pub fn add_minimized_window(&self, pid: pid_t, id: u32, title: &str, frame: Rect) -> AxHandle {
        self.insert(pid, id, title, frame, true, false)
    }

    /// A window the default per-process query cannot see; only
    /// `probe_window` finds it.
    pub fn add_probe_only_window(&self, pid: pid_t, id: u32, title: &str, frame: Rect) -> AxHandle {
        self.insert(pid, id, title, frame, false, true)
    }

    pub fn fail_pid(&self, pid: pid_t, error: AxError) {
        self.state.lock().failures.insert(pid, error);
    }

    pub fn set_trusted(&self, trusted: bool) {
        self.state.lock().trusted = trusted;
    }

    pub fn set_focused(&self, pid: pid_t, handle: AxHandle) {
        self.state.lock().focused.insert(pid, handle);
    }

    /// Marks a handle as destroyed: every call through it fails from now on.
    pub fn kill_handle(&self, handle: AxHandle) {
        let mut state = self.state.lock();
        state.dead.insert(handle);
        state.ids.remove(&handle);
        for windows in state.windows.values_mut() {
            windows.retain(|w| w.handle != handle);
        }
    }

    /// Moves a window the way a user drag would: the frame changes without
    /// a `set_frame` call being recorded.
    pub fn move_window(&self, handle: AxHandle, frame: Rect) {
        self.state.lock().frames.insert(handle, frame);
    }

    pub fn raised(&self) -> Vec<AxHandle> {
        self.state.lock().raised.clone()
    }

    pub fn frame_calls(&self) -> Vec<(AxHandle, Rect)> {
        self.state.lock().frame_calls.clone()
    }

    fn insert(
        &self,
        pid: pid_t,
        id: u32,
        title: &str,
        frame: Rect,
        minimized: bool,
        probe_only: bool,
    ) -> AxHandle {
        let handle = AxHandle::new(pid, id as u64);
        let info = AxWindowInfo {
            handle,
            window_server_id: Some(WindowServerId::new(id)),
            title: title.to_string(),
            frame,
            minimized,
            role: role::WINDOW.to_string(),
            subrole: subrole::STANDARD_WINDOW.to_string(),
        };
        let mut state = self.state.lock();
        state.ids.insert(handle, WindowServerId::new(id));
        state.titles.insert(handle, title.to_string());
        state.frames.insert(handle, frame);
        if probe_only {
            state.probe_only.entry(pid).or_default().push(info);
        } else {
            state.windows.entry(pid).or_default().push(info);
        }
        handle
    }

    fn root(pid: pid_t) -> AxHandle {
        AxHandle::new(pid, 0)
    }
}

impl Default for FakeTree {
    fn default() -> Self {
        FakeTree::new()
    }
}

impl AccessibilityTree for FakeTree {
    fn is_trusted(&self) -> bool {
        self.state.lock().trusted
    }

    fn app_windows(&self, pid: pid_t, _timeout: Duration) -> Result<Vec<AxWindowInfo>, AxError> {
        let state = self.state.lock();
        if let Some(error) = state.failures.get(&pid) {
            return Err(error.clone());
        }
        Ok(state.windows.get(&pid).cloned().unwrap_or_default())
    }

    fn probe_window(&self, pid: pid_t, id: WindowServerId) -> Option<AxWindowInfo> {
        let state = self.state.lock();
        if state.failures.contains_key(&pid) {
            return None;
        }
        state
            .probe_only
            .get(&pid)
            .into_iter()
            .chain(state.windows.get(&pid))
            .flatten()
            .find(|w| w.window_server_id == Some(id))
            .cloned()
    }

    fn application_root(&self, pid: pid_t) -> Result<AxHandle, AxError> {
        let state = self.state.lock();
        if let Some(error) = state.failures.get(&pid) {
            return Err(error.clone());
        }
        Ok(Self::root(pid))
    }

    fn focused_window(&self, pid: pid_t) -> Result<AxHandle, AxError> {
        self.state.lock().focused.get(&pid).copied().ok_or(AxError::NotFound)
    }

    fn window_id(&self, handle: AxHandle) -> Result<WindowServerId, AxError> {
        let state = self.state.lock();
        if state.dead.contains(&handle) {
            return Err(AxError::StaleElement);
        }
        state.ids.get(&handle).copied().ok_or(AxError::NotFound)
    }

    fn is_window(&self, handle: AxHandle) -> bool {
        self.state.lock().ids.contains_key(&handle)
    }

    fn window_title(&self, handle: AxHandle) -> Result<String, AxError> {
        let state = self.state.lock();
        if state.dead.contains(&handle) {
            return Err(AxError::StaleElement);
        }
        state.titles.get(&handle).cloned().ok_or(AxError::NotFound)
    }

    fn window_frame(&self, handle: AxHandle) -> Result<Rect, AxError> {
        let state = self.state.lock();
        if state.dead.contains(&handle) {
            return Err(AxError::StaleElement);
        }
        state.frames.get(&handle).copied().ok_or(AxError::NotFound)
    }

    fn set_frame(&self, handle: AxHandle, frame: Rect) -> Result<(), AxError> {
        let mut state = self.state.lock();
        if state.dead.contains(&handle) {
            return Err(AxError::StaleElement);
        }
        state.frame_calls.push((handle, frame));
        state.frames.insert(handle, frame);
        Ok(())
    }

    fn raise(&self, handle: AxHandle) -> Result<(), AxError> {
        let mut state = self.state.lock();
        if state.dead.contains(&handle) {
            return Err(AxError::StaleElement);
        }
        state.raised.push(handle);
        Ok(())
    }
}

#[derive(Default)]
struct NotifyState {
    next_token: u64,
    observers: HashMap<ObserverToken, (pid_t, RawHandler)>,
    subscriptions: HashSet<(ObserverToken, AxHandle, NotifyKind)>,
    unobservable: HashSet<pid_t>,
}

#[derive(Default)]
pub struct FakeNotifications {
    state: Mutex<NotifyState>,
}

impl FakeNotifications {
    pub fn new() -> Self {
        FakeNotifications::default()
    }

    pub fn observer_count(&self) -> usize {
        self.state.lock().observers.len()
    }

    pub fn subscription_count(&self) -> usize {
        self.state.lock().subscriptions.len()
    }

    /// Makes observer creation fail for `pid`, the way it does for a process
    /// that is shutting down or cannot be messaged.
    pub fn fail_pid(&self, pid: pid_t) {
        self.state.lock().unobservable.insert(pid);
    }

    pub fn is_subscribed(&self, element: AxHandle, kind: NotifyKind) -> bool {
        self.state
            .lock()
            .subscriptions
            .iter()
            .any(|(_, e, k)| *e == element && *k == kind)
    }

    /// Delivers a notification the way the external mechanism would: to the
    /// process's observer callback, on whatever thread the caller is on.
    pub fn deliver(&self, pid: pid_t, kind: NotifyKind, element: AxHandle) {
        let handler = {
            let state = self.state.lock();
            state
                .observers
                .values()
                .find(|(observer_pid, _)| *observer_pid == pid)
                .map(|(_, handler)| handler.clone())
        };
        if let Some(handler) = handler {
            handler(RawNotification { pid, kind, element });
        }
    }
}

impl NotificationSource for FakeNotifications {
    fn create_observer(&self, pid: pid_t, handler: RawHandler) -> Result<ObserverToken, AxError> {
        let mut state = self.state.lock();
        if state.unobservable.contains(&pid) {
            return Err(AxError::CannotComplete);
        }
        state.next_token += 1;
        let token = ObserverToken(state.next_token);
        state.observers.insert(token, (pid, handler));
        Ok(token)
    }

    fn destroy_observer(&self, token: ObserverToken) {
        let mut state = self.state.lock();
        state.observers.remove(&token);
        state.subscriptions.retain(|(t, _, _)| *t != token);
    }

    fn subscribe(
        &self,
        token: ObserverToken,
        element: AxHandle,
        kind: NotifyKind,
    ) -> Result<(), AxError> {
        let mut state = self.state.lock();
        if !state.observers.contains_key(&token) {
            return Err(AxError::NotFound);
        }
        state.subscriptions.insert((token, element, kind));
        Ok(())
    }

    fn unsubscribe(&self, token: ObserverToken, element: AxHandle, kind: NotifyKind) {
        self.state.lock().subscriptions.remove(&(token, element, kind));
    }
}
