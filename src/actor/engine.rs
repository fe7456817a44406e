//! The single consumer loop that owns all group state. Hotkey commands and
//! bridge events are linearized here; nothing else touches the store.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{Instrument, debug, instrument, trace, warn};

use crate::actor;
use crate::actor::broadcast::{BroadcastEvent, BroadcastSender};
use crate::actor::window_notify::{WindowEvent, WindowNotifier};
use crate::common::config::Config;
use crate::model::store::{GroupId, GroupStore, ReleaseOutcome};
use crate::model::window::{AxRef, WindowRecord};
use crate::resolver::WindowResolver;
use crate::sys::ax::AccessibilityTree;
use crate::sys::geometry::Rect;
use crate::sys::window_server::WindowServerId;

/// Abstract commands from the hotkey bridge. `repeat` marks OS key-repeat
/// duplicates, which must not advance a cycle.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    NewTab,
    ReleaseTab,
    CycleStart { repeat: bool },
    CycleModifierReleased,
    SwitchToTab(usize),
}

#[derive(Debug)]
pub enum Event {
    Command(Command),
    Window(WindowEvent),
    /// Group creation requested by the picker UI with resolved records.
    CreateGroup {
        windows: Vec<WindowRecord>,
        frame: Rect,
    },
    MoveTab {
        group: GroupId,
        source: usize,
        destination: usize,
    },
    Shutdown,
}

pub type Sender = actor::Sender<Event>;
pub type Receiver = actor::Receiver<Event>;

#[derive(Clone, Copy, Debug)]
struct ExpectedFrame {
    frame: Rect,
    deadline: Instant,
}

/// Per-window record of the frame we most recently set ourselves, so the
/// resulting move/resize notifications can be told apart from user action.
#[derive(Clone, Default)]
pub struct FrameTxStore(Arc<DashMap<WindowServerId, ExpectedFrame>>);

impl FrameTxStore {
    pub fn new() -> Self {
        FrameTxStore::default()
    }

    pub fn expect(&self, id: WindowServerId, frame: Rect, ttl: Duration) {
        self.0.insert(id, ExpectedFrame { frame, deadline: Instant::now() + ttl });
    }

    /// True when `frame` matches the expected frame for `id` within
    /// `tolerance` and its deadline. A hit consumes the entry; an expired
    /// entry is dropped.
    pub fn matches(&self, id: WindowServerId, frame: Rect, tolerance: f64) -> bool {
        let Some(entry) = self.0.get(&id).map(|e| *e) else {
            return false;
        };
        if entry.deadline < Instant::now() {
            self.0.remove(&id);
            return false;
        }
        if entry.frame.approx_eq(&frame, tolerance) {
            self.0.remove(&id);
            return true;
        }
        false
    }

    pub fn remove(&self, id: WindowServerId) {
        self.0.remove(&id);
    }
}

pub struct Engine {
    config: Config,
    rx: Receiver,
    store: GroupStore,
    notifier: WindowNotifier,
    resolver: WindowResolver,
    tree: Arc<dyn AccessibilityTree>,
    frame_tx: FrameTxStore,
    events_tx: BroadcastSender,
    focused: Option<WindowServerId>,
    /// The group a cycle gesture is running in, if any. Doubles as the
    /// "gesture active" flag for key-repeat suppression.
    cycling: Option<GroupId>,
}

impl Engine {
    pub fn new(
        config: Config,
        rx: Receiver,
        notifier: WindowNotifier,
        resolver: WindowResolver,
        tree: Arc<dyn AccessibilityTree>,
        events_tx: BroadcastSender,
    ) -> Self {
        Engine {
            store: GroupStore::with_events(events_tx.clone()),
            config,
            rx,
            notifier,
            resolver,
            tree,
            frame_tx: FrameTxStore::new(),
            events_tx,
            focused: None,
            cycling: None,
        }
    }

    pub async fn run(mut self) {
        if !self.tree.is_trusted() {
            // Surfaced once; scans simply come back empty until the user
            // grants access.
            warn!("accessibility permission not granted");
            _ = self.events_tx.send(BroadcastEvent::PermissionNeeded);
        }
        while let Some((span, event)) = self.rx.recv().await {
            if matches!(event, Event::Shutdown) {
                break;
            }
            self.handle_event(event).instrument(span).await;
        }
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.notifier.stop_all();
        self.store.dissolve_all();
    }

    #[instrument(skip(self))]
    pub async fn handle_event(&mut self, event: Event) {
        match event {
            Event::Command(command) => self.handle_command(command).await,
            Event::Window(window_event) => self.handle_window_event(window_event),
            Event::CreateGroup { windows, frame } => self.create_group(windows, frame),
            Event::MoveTab { group, source, destination } => {
                if let Some(tab_group) = self.store.get_mut(group) {
                    if tab_group.move_tab(source, destination) {
                        self.store.notify_changed(group);
                    }
                }
            }
            Event::Shutdown => self.shutdown(),
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::NewTab => {
                // The picker UI turns this into a CreateGroup/add request.
                let records = self.resolver.resolve().await;
                let windows = records.iter().map(Into::into).collect();
                _ = self.events_tx.send(BroadcastEvent::WindowsResolved { windows });
            }
            Command::ReleaseTab => {
                if let Some(id) = self.focused
                    && let Some(group) = self.store.group_of(id)
                {
                    self.release_window(id, group);
                }
            }
            Command::CycleStart { repeat } => {
                if repeat {
                    trace!("ignoring key-repeat cycle event");
                    return;
                }
                self.advance_cycle();
            }
            Command::CycleModifierReleased => {
                if let Some(group) = self.cycling.take()
                    && let Some(tab_group) = self.store.get_mut(group)
                {
                    tab_group.end_cycle();
                    let active = tab_group.active_index();
                    _ = self.events_tx.send(BroadcastEvent::ActiveTabChanged { group, active });
                }
            }
            Command::SwitchToTab(index) => {
                if let Some(group) = self.focused_group()
                    && self.store.get(group).is_some_and(|g| index < g.len())
                {
                    self.focus_tab(group, index);
                }
            }
        }
    }

    fn handle_window_event(&mut self, event: WindowEvent) {
        match event {
            WindowEvent::Destroyed(id) => {
                self.frame_tx.remove(id);
                if let Some(group) = self.store.group_of(id) {
                    self.release_window(id, group);
                }
                if self.focused == Some(id) {
                    self.focused = None;
                }
            }
            WindowEvent::Focused(pid, handle) => {
                let Ok(id) = self.tree.window_id(handle) else {
                    trace!("focused element of {pid} has no window id");
                    return;
                };
                self.focused = Some(id);
                let Some(group) = self.store.group_of(id) else {
                    return;
                };
                let Some(tab_group) = self.store.get_mut(group) else {
                    return;
                };
                // A concrete handle observed at focus time upgrades a
                // placeholder record.
                if let Some(record) = tab_group.get_mut(id)
                    && record.ax.placeholder
                {
                    record.ax = AxRef::window(handle);
                }
                // Mid-cycle focus events must not perturb MRU history;
                // record_focus enforces that itself.
                tab_group.record_focus(id);
                if let Some(active) = tab_group.activate(id) {
                    _ = self.events_tx.send(BroadcastEvent::ActiveTabChanged { group, active });
                }
            }
            WindowEvent::Moved(id) | WindowEvent::Resized(id) => self.reconcile_frame(id),
            WindowEvent::TitleChanged(id) => {
                let Some(group) = self.store.group_of(id) else {
                    return;
                };
                let Some(tab_group) = self.store.get_mut(group) else {
                    return;
                };
                let Some(record) = tab_group.get_mut(id) else {
                    return;
                };
                if let Ok(title) = self.tree.window_title(record.ax.handle) {
                    record.title = title.clone();
                    _ = self.events_tx.send(BroadcastEvent::WindowTitleChanged { id, title });
                }
            }
        }
    }

    fn create_group(&mut self, windows: Vec<WindowRecord>, frame: Rect) {
        let records = windows.clone();
        match self.store.create_group(windows, frame) {
            Ok(group) => {
                for record in &records {
                    self.notifier.register_window(record);
                    self.apply_frame(record, frame);
                }
                self.focus_tab(group, 0);
            }
            Err(err) => debug!("group creation rejected: {err}"),
        }
    }

    /// Group of the currently focused window, or the running cycle's group.
    fn focused_group(&self) -> Option<GroupId> {
        self.cycling.or_else(|| self.focused.and_then(|id| self.store.group_of(id)))
    }

    fn advance_cycle(&mut self) {
        let Some(group) = self.focused_group() else {
            return;
        };
        let Some(tab_group) = self.store.get_mut(group) else {
            self.cycling = None;
            return;
        };
        let Some(index) = tab_group.next_in_mru_cycle() else {
            return;
        };
        self.cycling = Some(group);
        self.focus_tab(group, index);
    }

    /// Raises the window at `index`, resolving a placeholder handle first.
    /// A window that no longer resolves gets the same cleanup as an
    /// explicit destroy notification.
    fn focus_tab(&mut self, group: GroupId, index: usize) {
        let Some(tab_group) = self.store.get_mut(group) else {
            return;
        };
        let Some(record) = tab_group.windows().get(index) else {
            return;
        };
        let id = record.id;
        let pid = record.pid;
        let mut handle = record.ax.handle;
        if record.ax.placeholder {
            // Placeholders resolve to a concrete window handle lazily, at
            // focus time.
            match self.tree.probe_window(pid, id) {
                Some(info) => {
                    handle = info.handle;
                    if let Some(record) = tab_group.get_mut(id) {
                        record.ax = AxRef::window(info.handle);
                        let record = record.clone();
                        self.notifier.register_window(&record);
                    }
                }
                None => {
                    debug!("window {id} no longer resolves, releasing");
                    self.release_window(id, group);
                    return;
                }
            }
        }
        if self.tree.raise(handle).is_err() {
            debug!("raise failed for window {id}, treating as gone");
            self.release_window(id, group);
            return;
        }
        if let Some(tab_group) = self.store.get_mut(group)
            && let Some(active) = tab_group.activate(id)
        {
            _ = self.events_tx.send(BroadcastEvent::ActiveTabChanged { group, active });
        }
    }

    /// A move/resize either echoes a frame we set ourselves (suppressed) or
    /// is user action, in which case the group adopts the new frame and
    /// re-applies it to the other members.
    fn reconcile_frame(&mut self, id: WindowServerId) {
        let Some(group) = self.store.group_of(id) else {
            return;
        };
        let Some(tab_group) = self.store.get(group) else {
            return;
        };
        let Some(record) = tab_group.get(id) else {
            return;
        };
        let Ok(frame) = self.tree.window_frame(record.ax.handle) else {
            return;
        };
        let tolerance = self.config.settings.frames.match_tolerance;
        if self.frame_tx.matches(id, frame, tolerance) {
            trace!("suppressing self-inflicted frame change for {id}");
            return;
        }
        let Some(tab_group) = self.store.get_mut(group) else {
            return;
        };
        tab_group.set_frame(frame);
        if let Some(record) = tab_group.get_mut(id) {
            record.cached_bounds = Some(frame);
        }
        let others: Vec<WindowRecord> =
            tab_group.windows().iter().filter(|w| w.id != id).cloned().collect();
        for other in &others {
            self.apply_frame(other, frame);
        }
    }

    /// Best-effort frame application; the expected frame is registered
    /// first so the echo notification is suppressed.
    fn apply_frame(&mut self, record: &WindowRecord, frame: Rect) {
        let ttl = Duration::from_millis(self.config.settings.frames.suppress_deadline_ms);
        self.frame_tx.expect(record.id, frame, ttl);
        if let Err(err) = self.tree.set_frame(record.ax.handle, frame) {
            debug!("set_frame failed for window {}: {err}", record.id);
            self.frame_tx.remove(record.id);
        }
    }

    /// Releases `id` from `group`. A group left with a single member is
    /// collapsed: grouping one window is meaningless, so the survivor is
    /// expanded back to independent geometry.
    fn release_window(&mut self, id: WindowServerId, group: GroupId) {
        let outcome = match self.store.release_window(id, group) {
            Ok(outcome) => outcome,
            Err(err) => {
                debug!("release of {id} rejected: {err}");
                return;
            }
        };
        match outcome {
            ReleaseOutcome::Removed(removed) => {
                self.notifier.unregister_window(removed.pid, removed.id);
                if self.store.get(group).is_some_and(|g| g.len() == 1)
                    && let Some(dissolved) = self.store.dissolve_group(group)
                {
                    if self.cycling == Some(group) {
                        self.cycling = None;
                    }
                    for survivor in dissolved.windows() {
                        self.notifier.unregister_window(survivor.pid, survivor.id);
                        self.expand_window(survivor);
                    }
                }
            }
            ReleaseOutcome::Dissolved { removed, .. } => {
                self.notifier.unregister_window(removed.pid, removed.id);
                if self.cycling == Some(group) {
                    self.cycling = None;
                }
            }
        }
    }

    /// Restores a formerly grouped window to independent geometry.
    fn expand_window(&mut self, record: &WindowRecord) {
        if let Some(bounds) = record.cached_bounds {
            self.apply_frame(record, bounds);
        }
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &GroupStore {
        &self.store
    }

    #[cfg(test)]
    pub(crate) fn focused_window(&self) -> Option<WindowServerId> {
        self.focused
    }
}
