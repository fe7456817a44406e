//! Process-wide collection of tab groups. Mutated only from the engine
//! task; the membership side-index gives O(1) cross-group uniqueness checks.

use slotmap::{SlotMap, new_key_type};
use thiserror::Error;
use tracing::debug;

use crate::actor::broadcast::{BroadcastEvent, BroadcastSender};
use crate::common::collections::{HashMap, HashSet};
use crate::model::group::TabGroup;
use crate::model::window::WindowRecord;
use crate::sys::geometry::Rect;
use crate::sys::window_server::WindowServerId;

new_key_type! {
    pub struct GroupId;
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("cannot create a group with no windows")]
    EmptyGroup,
    #[error("window {0} appears twice in the input")]
    DuplicateWindow(WindowServerId),
    #[error("window {0} already belongs to a group")]
    AlreadyGrouped(WindowServerId),
    #[error("group is not tracked")]
    UnknownGroup,
    #[error("window {0} is not a member of this group")]
    NotAMember(WindowServerId),
}

/// Result of releasing a window from its group.
#[derive(Debug)]
pub enum ReleaseOutcome {
    Removed(WindowRecord),
    /// Removing the member emptied the group, which was dissolved as a side
    /// effect. The dissolved group object is returned for caller cleanup.
    Dissolved {
        removed: WindowRecord,
        group: TabGroup,
    },
}

#[derive(Default)]
pub struct GroupStore {
    groups: SlotMap<GroupId, TabGroup>,
    membership: HashMap<WindowServerId, GroupId>,
    events_tx: Option<BroadcastSender>,
}

impl GroupStore {
    pub fn new() -> Self {
        GroupStore::default()
    }

    pub fn with_events(events_tx: BroadcastSender) -> Self {
        GroupStore {
            events_tx: Some(events_tx),
            ..GroupStore::default()
        }
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn get(&self, group: GroupId) -> Option<&TabGroup> {
        self.groups.get(group)
    }

    pub fn get_mut(&mut self, group: GroupId) -> Option<&mut TabGroup> {
        self.groups.get_mut(group)
    }

    pub fn groups(&self) -> impl Iterator<Item = &TabGroup> {
        self.groups.values()
    }

    /// The group `id` belongs to, if any.
    pub fn group_of(&self, id: WindowServerId) -> Option<GroupId> {
        self.membership.get(&id).copied()
    }

    /// Creates a group whose tab order is the input order, with the MRU
    /// history seeded to the same order. Rejects empty input, duplicate ids,
    /// and ids that already belong to any group.
    pub fn create_group(
        &mut self,
        windows: Vec<WindowRecord>,
        frame: Rect,
    ) -> Result<GroupId, StoreError> {
        if windows.is_empty() {
            return Err(StoreError::EmptyGroup);
        }
        let mut seen = HashSet::default();
        for window in &windows {
            if !seen.insert(window.id) {
                return Err(StoreError::DuplicateWindow(window.id));
            }
            if self.membership.contains_key(&window.id) {
                return Err(StoreError::AlreadyGrouped(window.id));
            }
        }
        let ids: Vec<WindowServerId> = windows.iter().map(|w| w.id).collect();
        let group = self.groups.insert_with_key(|key| TabGroup::new(key, windows, frame));
        for id in &ids {
            self.membership.insert(*id, group);
        }
        debug!("created group {group:?} with windows {ids:?}");
        self.emit(BroadcastEvent::GroupCreated { group, windows: ids });
        Ok(group)
    }

    /// Appends `window` to the group's tab order and MRU tail.
    pub fn add_window(&mut self, window: WindowRecord, group: GroupId) -> Result<(), StoreError> {
        if self.membership.contains_key(&window.id) {
            return Err(StoreError::AlreadyGrouped(window.id));
        }
        let Some(tab_group) = self.groups.get_mut(group) else {
            return Err(StoreError::UnknownGroup);
        };
        let id = window.id;
        tab_group.push_window(window);
        self.membership.insert(id, group);
        self.emit_changed(group);
        Ok(())
    }

    /// Removes `id` from `group`. Dissolves the group as a side effect if
    /// the removal empties it.
    pub fn release_window(
        &mut self,
        id: WindowServerId,
        group: GroupId,
    ) -> Result<ReleaseOutcome, StoreError> {
        let Some(tab_group) = self.groups.get_mut(group) else {
            return Err(StoreError::UnknownGroup);
        };
        let Some(removed) = tab_group.remove_window(id) else {
            return Err(StoreError::NotAMember(id));
        };
        self.membership.remove(&id);
        if self.groups[group].is_empty() {
            // dissolve_group skips membership cleanup here: the group has no
            // members left.
            let dissolved = self.dissolve_group(group).ok_or(StoreError::UnknownGroup)?;
            return Ok(ReleaseOutcome::Dissolved { removed, group: dissolved });
        }
        self.emit_changed(group);
        Ok(ReleaseOutcome::Removed(removed))
    }

    /// Removes the group from the store's bookkeeping. The returned group
    /// deliberately keeps its member list intact so the caller can still
    /// enumerate surviving windows for cleanup.
    pub fn dissolve_group(&mut self, group: GroupId) -> Option<TabGroup> {
        let dissolved = self.groups.remove(group)?;
        let ids: Vec<WindowServerId> = dissolved.windows().iter().map(|w| w.id).collect();
        for id in &ids {
            self.membership.remove(id);
        }
        debug!("dissolved group {group:?}, surviving windows {ids:?}");
        self.emit(BroadcastEvent::GroupDissolved { group, windows: ids });
        Some(dissolved)
    }

    /// Clears every tracked group unconditionally (shutdown path).
    pub fn dissolve_all(&mut self) -> Vec<TabGroup> {
        let groups: Vec<GroupId> = self.groups.keys().collect();
        groups.into_iter().filter_map(|g| self.dissolve_group(g)).collect()
    }

    /// Emits a change notification for callers that mutate a group through
    /// `get_mut` (tab moves, focus changes).
    pub fn notify_changed(&self, group: GroupId) {
        self.emit_changed(group);
    }

    fn emit_changed(&self, group: GroupId) {
        let Some(tab_group) = self.groups.get(group) else {
            return;
        };
        self.emit(BroadcastEvent::GroupChanged {
            group,
            windows: tab_group.windows().iter().map(|w| w.id).collect(),
            active: tab_group.active_index(),
        });
    }

    fn emit(&self, event: BroadcastEvent) {
        if let Some(tx) = &self.events_tx {
            _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::actor;
    use crate::model::window::AxRef;
    use crate::sys::ax::AxHandle;

    fn record(id: u32) -> WindowRecord {
        WindowRecord {
            id: WindowServerId::new(id),
            pid: 100 + (id as i32) / 10,
            bundle_id: None,
            title: format!("window {id}"),
            app_name: "App".to_string(),
            icon: None,
            ax: AxRef::window(AxHandle::new(100, id as u64)),
            cached_bounds: None,
        }
    }

    fn records(ids: &[u32]) -> Vec<WindowRecord> {
        ids.iter().map(|id| record(*id)).collect()
    }

    fn wid(id: u32) -> WindowServerId {
        WindowServerId::new(id)
    }

    fn frame() -> Rect {
        Rect::new(0.0, 0.0, 800.0, 600.0)
    }

    #[test]
    fn create_rejects_empty_input() {
        let mut store = GroupStore::new();
        assert_eq!(store.create_group(vec![], frame()), Err(StoreError::EmptyGroup));
    }

    #[test]
    fn create_rejects_duplicate_ids() {
        let mut store = GroupStore::new();
        assert_eq!(
            store.create_group(records(&[1, 2, 1]), frame()),
            Err(StoreError::DuplicateWindow(wid(1)))
        );
        assert!(store.is_empty());
    }

    #[test]
    fn create_rejects_windows_grouped_elsewhere() {
        let mut store = GroupStore::new();
        store.create_group(records(&[1, 2]), frame()).unwrap();
        assert_eq!(
            store.create_group(records(&[3, 2]), frame()),
            Err(StoreError::AlreadyGrouped(wid(2)))
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn add_window_rejects_grouped_and_unknown() {
        let mut store = GroupStore::new();
        let a = store.create_group(records(&[1, 2]), frame()).unwrap();
        let b = store.create_group(records(&[3, 4]), frame()).unwrap();
        assert_eq!(
            store.add_window(record(3), a),
            Err(StoreError::AlreadyGrouped(wid(3)))
        );
        store.dissolve_group(b).unwrap();
        assert_eq!(store.add_window(record(5), b), Err(StoreError::UnknownGroup));
    }

    #[test]
    fn add_window_appends_to_tab_order() {
        let mut store = GroupStore::new();
        let a = store.create_group(records(&[1, 2]), frame()).unwrap();
        store.add_window(record(3), a).unwrap();
        let ids: Vec<_> = store.get(a).unwrap().windows().iter().map(|w| w.id).collect();
        assert_eq!(ids, vec![wid(1), wid(2), wid(3)]);
        assert_eq!(store.group_of(wid(3)), Some(a));
    }

    #[test]
    fn release_unknown_member_rejected() {
        let mut store = GroupStore::new();
        let a = store.create_group(records(&[1, 2]), frame()).unwrap();
        assert!(matches!(
            store.release_window(wid(9), a),
            Err(StoreError::NotAMember(_))
        ));
    }

    #[test]
    fn release_last_member_dissolves_group() {
        let mut store = GroupStore::new();
        let a = store.create_group(records(&[1, 2]), frame()).unwrap();
        assert!(matches!(
            store.release_window(wid(1), a).unwrap(),
            ReleaseOutcome::Removed(_)
        ));
        let outcome = store.release_window(wid(2), a).unwrap();
        match outcome {
            ReleaseOutcome::Dissolved { removed, group } => {
                assert_eq!(removed.id, wid(2));
                assert!(group.is_empty());
            }
            other => panic!("expected dissolution, got {other:?}"),
        }
        assert!(store.is_empty());
        assert_eq!(store.group_of(wid(1)), None);
        assert_eq!(store.group_of(wid(2)), None);
    }

    #[test]
    fn dissolved_group_keeps_member_list() {
        let mut store = GroupStore::new();
        let a = store.create_group(records(&[1, 2]), frame()).unwrap();
        store.release_window(wid(1), a).unwrap();
        let dissolved = store.dissolve_group(a).unwrap();
        let survivors: Vec<_> = dissolved.windows().iter().map(|w| w.id).collect();
        assert_eq!(survivors, vec![wid(2)]);
        assert_eq!(store.group_of(wid(2)), None);
    }

    #[test]
    fn dissolve_all_clears_everything() {
        let mut store = GroupStore::new();
        store.create_group(records(&[1, 2]), frame()).unwrap();
        store.create_group(records(&[3, 4]), frame()).unwrap();
        let dissolved = store.dissolve_all();
        assert_eq!(dissolved.len(), 2);
        assert!(store.is_empty());
        assert_eq!(store.group_of(wid(3)), None);
    }

    #[test]
    fn broadcasts_on_mutation() {
        let (tx, mut rx) = actor::channel();
        let mut store = GroupStore::with_events(tx);
        let a = store.create_group(records(&[1, 2]), frame()).unwrap();
        store.add_window(record(3), a).unwrap();
        store.release_window(wid(3), a).unwrap();
        store.dissolve_group(a).unwrap();

        let mut kinds = Vec::new();
        while let Ok((_, event)) = rx.try_recv() {
            kinds.push(match event {
                BroadcastEvent::GroupCreated { .. } => "created",
                BroadcastEvent::GroupChanged { .. } => "changed",
                BroadcastEvent::GroupDissolved { .. } => "dissolved",
                _ => "other",
            });
        }
        assert_eq!(kinds, vec!["created", "changed", "changed", "dissolved"]);
    }

    /// Invariant check over randomized operation sequences: no window id is
    /// ever a member of two groups at once.
    #[test]
    fn random_sequences_never_double_group() {
        let mut state = 0x9e3779b97f4a7c15u64;
        let mut next = move || {
            // xorshift64*
            state ^= state >> 12;
            state ^= state << 25;
            state ^= state >> 27;
            state.wrapping_mul(0x2545f4914f6cdd1d)
        };

        let mut store = GroupStore::new();
        for _ in 0..2000 {
            let op = next() % 3;
            match op {
                0 => {
                    let count = (next() % 3 + 1) as usize;
                    let ids: Vec<u32> = (0..count).map(|_| (next() % 40) as u32).collect();
                    _ = store.create_group(records(&ids), frame());
                }
                1 => {
                    let id = (next() % 40) as u32;
                    let group = store.groups().nth((next() % 4) as usize).map(|g| g.id());
                    if let Some(group) = group {
                        _ = store.add_window(record(id), group);
                    }
                }
                _ => {
                    let id = wid((next() % 40) as u32);
                    if let Some(group) = store.group_of(id) {
                        _ = store.release_window(id, group);
                    }
                }
            }

            let mut seen = HashSet::default();
            for group in store.groups() {
                for window in group.windows() {
                    assert!(
                        seen.insert(window.id),
                        "window {} is in two groups",
                        window.id
                    );
                    assert_eq!(store.group_of(window.id), Some(group.id()));
                }
            }
        }
    }
}
