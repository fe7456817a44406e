//! Per-group mutable state: member windows in tab order, the shared frame,
//! and the MRU cycling state machine.

use crate::model::store::GroupId;
use crate::model::window::WindowRecord;
use crate::sys::geometry::Rect;
use crate::sys::window_server::WindowServerId;

/// Snapshot taken when a modifier-held cycling gesture starts. The live
/// focus history may be mutated concurrently by focus notifications (an app
/// programmatically refocusing mid-gesture); without freezing, a mutation
/// could make the same window be visited twice or one be skipped.
#[derive(Clone, Debug)]
struct CycleState {
    frozen: Vec<WindowServerId>,
    position: usize,
}

#[derive(Debug)]
pub struct TabGroup {
    id: GroupId,
    /// Insertion order is the tab order, distinct from MRU order.
    windows: Vec<WindowRecord>,
    active_index: usize,
    frame: Rect,
    /// Most-recent-first.
    focus_history: Vec<WindowServerId>,
    cycle: Option<CycleState>,
}

impl TabGroup {
    pub(crate) fn new(id: GroupId, windows: Vec<WindowRecord>, frame: Rect) -> Self {
        let focus_history = windows.iter().map(|w| w.id).collect();
        TabGroup {
            id,
            windows,
            active_index: 0,
            frame,
            focus_history,
            cycle: None,
        }
    }

    pub fn id(&self) -> GroupId {
        self.id
    }

    pub fn windows(&self) -> &[WindowRecord] {
        &self.windows
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn frame(&self) -> Rect {
        self.frame
    }

    pub fn set_frame(&mut self, frame: Rect) {
        self.frame = frame;
    }

    pub fn active_index(&self) -> usize {
        self.active_index
    }

    pub fn active_window(&self) -> Option<&WindowRecord> {
        self.windows.get(self.active_index)
    }

    pub fn contains(&self, id: WindowServerId) -> bool {
        self.windows.iter().any(|w| w.id == id)
    }

    pub fn index_of(&self, id: WindowServerId) -> Option<usize> {
        self.windows.iter().position(|w| w.id == id)
    }

    pub fn get(&self, id: WindowServerId) -> Option<&WindowRecord> {
        self.windows.iter().find(|w| w.id == id)
    }

    pub fn get_mut(&mut self, id: WindowServerId) -> Option<&mut WindowRecord> {
        self.windows.iter_mut().find(|w| w.id == id)
    }

    pub fn is_cycling(&self) -> bool {
        self.cycle.is_some()
    }

    #[cfg(test)]
    pub(crate) fn focus_history(&self) -> &[WindowServerId] {
        &self.focus_history
    }

    /// Appends to the tab order and to the MRU tail. Membership invariants
    /// are the store's responsibility; this only mutates group state.
    pub(crate) fn push_window(&mut self, window: WindowRecord) {
        self.focus_history.push(window.id);
        self.windows.push(window);
    }

    /// Removes a member, keeping `active_index` on the same logical window
    /// where possible. Returns the removed record.
    pub(crate) fn remove_window(&mut self, id: WindowServerId) -> Option<WindowRecord> {
        let index = self.index_of(id)?;
        let removed = self.windows.remove(index);
        self.focus_history.retain(|h| *h != id);
        if self.windows.is_empty() {
            self.active_index = 0;
        } else if self.active_index > index {
            self.active_index -= 1;
        } else if self.active_index >= self.windows.len() {
            self.active_index = self.windows.len() - 1;
        }
        Some(removed)
    }

    /// Marks `id` as the active tab. Returns its tab-order index.
    pub fn activate(&mut self, id: WindowServerId) -> Option<usize> {
        let index = self.index_of(id)?;
        self.active_index = index;
        Some(index)
    }

    /// Moves `id` to the front of the focus history. A no-op while a cycle
    /// gesture is in progress: focus events arriving mid-cycle must not
    /// perturb history or a single gesture could revisit a window.
    pub fn record_focus(&mut self, id: WindowServerId) {
        if self.cycle.is_some() || !self.contains(id) {
            return;
        }
        self.focus_history.retain(|h| *h != id);
        self.focus_history.insert(0, id);
    }

    /// Advances the MRU cycle, entering the Cycling state on the first call.
    /// Returns the tab-order index of the window to activate, or `None` when
    /// fewer than two members remain.
    pub fn next_in_mru_cycle(&mut self) -> Option<usize> {
        if self.windows.len() < 2 {
            return None;
        }
        let mut cycle = match self.cycle.take() {
            Some(cycle) => cycle,
            None => {
                let mut frozen: Vec<WindowServerId> = self
                    .focus_history
                    .iter()
                    .copied()
                    .filter(|id| self.contains(*id))
                    .collect();
                if frozen.is_empty() {
                    frozen = self.windows.iter().map(|w| w.id).collect();
                }
                CycleState { frozen, position: 0 }
            }
        };
        let len = cycle.frozen.len();
        let mut result = None;
        // Skip ids whose windows closed mid-cycle.
        for _ in 0..len {
            cycle.position = (cycle.position + 1) % len;
            let id = cycle.frozen[cycle.position];
            if let Some(index) = self.index_of(id) {
                result = Some(index);
                break;
            }
        }
        self.cycle = Some(cycle);
        result
    }

    /// Leaves the Cycling state, committing the window the gesture landed on
    /// to the front of the live focus history. Falls back to the current
    /// active window when the snapshot entry no longer exists. Called exactly
    /// once per gesture, on modifier release.
    pub fn end_cycle(&mut self) {
        let Some(cycle) = self.cycle.take() else {
            return;
        };
        let committed = cycle
            .frozen
            .get(cycle.position)
            .copied()
            .filter(|id| self.contains(*id))
            .or_else(|| self.active_window().map(|w| w.id));
        if let Some(id) = committed {
            self.focus_history.retain(|h| *h != id);
            self.focus_history.insert(0, id);
        }
    }

    /// Reorders the tab order only; MRU history and cycling state are never
    /// touched. `destination` uses list-removal-then-insertion semantics:
    /// removing the source first shifts higher indices down by one, so a
    /// destination greater than the source is decremented before insertion.
    /// `active_index` keeps pointing at the same logical window.
    pub fn move_tab(&mut self, source: usize, destination: usize) -> bool {
        if source >= self.windows.len() || destination >= self.windows.len() {
            return false;
        }
        if source == destination {
            return true;
        }
        let active_id = self.active_window().map(|w| w.id);
        let window = self.windows.remove(source);
        let insert_at = if destination > source {
            destination - 1
        } else {
            destination
        };
        self.windows.insert(insert_at, window);
        if let Some(id) = active_id
            && let Some(index) = self.index_of(id)
        {
            self.active_index = index;
        }
        true
    }
}
