//! Subscribes to external notifications for every grouped window and fans
//! the raw callbacks, which arrive on an arbitrary external thread, into a
//! single typed event stream consumed on the engine task.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use crate::actor;
use crate::common::collections::HashMap;
use crate::model::window::WindowRecord;
use crate::sys::ax::{AccessibilityTree, AxHandle};
use crate::sys::notify::{NotificationSource, NotifyKind, ObserverToken, RawNotification};
use crate::sys::window_server::{WindowServerId, pid_t};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowEvent {
    Moved(WindowServerId),
    Resized(WindowServerId),
    Destroyed(WindowServerId),
    TitleChanged(WindowServerId),
    Focused(pid_t, AxHandle),
}

pub type Sender = actor::Sender<WindowEvent>;
pub type Receiver = actor::Receiver<WindowEvent>;

struct PidEntry {
    token: ObserverToken,
    root: AxHandle,
    /// Grouped windows of this process, by id, with the subscribed handle.
    windows: HashMap<WindowServerId, AxHandle>,
}

/// Cache from `AxHandle::stable_hash` to window id, shared with the raw
/// callback. On a destroy notification the handle itself may already be
/// invalid; the cache lets those still resolve to the right window.
type HandleCache = Arc<RwLock<HashMap<u64, WindowServerId>>>;

pub struct WindowNotifier {
    source: Arc<dyn NotificationSource>,
    tree: Arc<dyn AccessibilityTree>,
    events_tx: Sender,
    entries: HashMap<pid_t, PidEntry>,
    cache: HandleCache,
}

impl WindowNotifier {
    pub fn new(
        source: Arc<dyn NotificationSource>,
        tree: Arc<dyn AccessibilityTree>,
        events_tx: Sender,
    ) -> Self {
        WindowNotifier {
            source,
            tree,
            events_tx,
            entries: HashMap::default(),
            cache: Arc::new(RwLock::new(HashMap::default())),
        }
    }

    /// Ensures the process observer exists (first grouped window creates it,
    /// along with the process-level focus subscription) and subscribes the
    /// window's four notification kinds.
    pub fn register_window(&mut self, record: &WindowRecord) {
        let pid = record.pid;
        if !self.entries.contains_key(&pid) {
            let handler = self.raw_handler();
            let token = match self.source.create_observer(pid, handler) {
                Ok(token) => token,
                Err(err) => {
                    warn!("cannot observe process {pid}: {err}");
                    return;
                }
            };
            let root = match self.tree.application_root(pid) {
                Ok(root) => root,
                Err(err) => {
                    warn!("no application root for {pid}: {err}");
                    self.source.destroy_observer(token);
                    return;
                }
            };
            if let Err(err) = self.source.subscribe(token, root, NotifyKind::FocusChanged) {
                debug!("focus subscription failed for {pid}: {err}");
            }
            self.entries.insert(pid, PidEntry {
                token,
                root,
                windows: HashMap::default(),
            });
        }
        let Some(entry) = self.entries.get_mut(&pid) else {
            return;
        };
        if entry.windows.contains_key(&record.id) {
            return;
        }
        let handle = record.ax.handle;
        self.cache.write().insert(handle.stable_hash(), record.id);
        for kind in NotifyKind::window_kinds() {
            if let Err(err) = self.source.subscribe(entry.token, handle, kind) {
                debug!("subscription {kind} failed for window {}: {err}", record.id);
            }
        }
        entry.windows.insert(record.id, handle);
    }

    /// Removes the window's subscriptions; tears the process observer down
    /// when its grouped-window count drops to zero.
    pub fn unregister_window(&mut self, pid: pid_t, id: WindowServerId) {
        let Some(entry) = self.entries.get_mut(&pid) else {
            return;
        };
        let Some(handle) = entry.windows.remove(&id) else {
            return;
        };
        for kind in NotifyKind::window_kinds() {
            self.source.unsubscribe(entry.token, handle, kind);
        }
        self.cache.write().remove(&handle.stable_hash());
        if entry.windows.is_empty()
            && let Some(entry) = self.entries.remove(&pid)
        {
            self.source.unsubscribe(entry.token, entry.root, NotifyKind::FocusChanged);
            self.source.destroy_observer(entry.token);
        }
    }

    /// Unconditionally clears every registration (shutdown path).
    pub fn stop_all(&mut self) {
        for (_, entry) in self.entries.drain() {
            for (_, handle) in entry.windows {
                for kind in NotifyKind::window_kinds() {
                    self.source.unsubscribe(entry.token, handle, kind);
                }
            }
            self.source.unsubscribe(entry.token, entry.root, NotifyKind::FocusChanged);
            self.source.destroy_observer(entry.token);
        }
        self.cache.write().clear();
    }

    /// The single funnel for raw callbacks. Runs on whatever thread the
    /// external mechanism uses: resolve to a typed event and enqueue, no
    /// group state in reach.
    fn raw_handler(&self) -> crate::sys::notify::RawHandler {
        let cache = self.cache.clone();
        let tree = self.tree.clone();
        let events_tx = self.events_tx.clone();
        Arc::new(move |raw: RawNotification| {
            let event = match raw.kind {
                NotifyKind::FocusChanged => {
                    // The element is either the focused window itself or the
                    // application root, in which case we ask the process for
                    // its focused window.
                    let handle = if tree.is_window(raw.element) {
                        raw.element
                    } else {
                        match tree.focused_window(raw.pid) {
                            Ok(handle) => handle,
                            Err(err) => {
                                trace!("focus notification unresolvable for {}: {err}", raw.pid);
                                return;
                            }
                        }
                    };
                    WindowEvent::Focused(raw.pid, handle)
                }
                kind => {
                    let id = cache
                        .read()
                        .get(&raw.element.stable_hash())
                        .copied()
                        .or_else(|| tree.window_id(raw.element).ok());
                    let Some(id) = id else {
                        trace!("notification {kind} for unknown window element");
                        return;
                    };
                    match kind {
                        NotifyKind::Moved => WindowEvent::Moved(id),
                        NotifyKind::Resized => WindowEvent::Resized(id),
                        NotifyKind::Destroyed => WindowEvent::Destroyed(id),
                        NotifyKind::TitleChanged => WindowEvent::TitleChanged(id),
                        NotifyKind::FocusChanged => unreachable!(),
                    }
                }
            };
            if events_tx.send(event).is_err() {
                debug!("engine channel closed, dropping notification");
            }
        })
    }
}
