//! Reconciles the window-server list and the per-process accessibility
//! trees into one canonical, deduplicated, z-ordered window list.

pub mod discriminator;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, trace, warn};

use crate::common::collections::{HashMap, HashSet};
use crate::common::config::{Config, DiscriminatorSettings, ResolverSettings};
use crate::model::window::{AxRef, WindowRecord};
use crate::resolver::discriminator::{WindowCandidate, is_actual_window};
use crate::sys::ax::{AccessibilityTree, AxWindowInfo, role, subrole};
use crate::sys::window_server::{
    AppInfo, ListScope, NORMAL_WINDOW_LEVEL, WindowServer, WindowServerId, WindowServerInfo, pid_t,
};

pub struct WindowResolver {
    server: Arc<dyn WindowServer>,
    tree: Arc<dyn AccessibilityTree>,
    resolver: ResolverSettings,
    discriminator: DiscriminatorSettings,
}

impl WindowResolver {
    pub fn new(
        server: Arc<dyn WindowServer>,
        tree: Arc<dyn AccessibilityTree>,
        config: &Config,
    ) -> Self {
        WindowResolver {
            server,
            tree,
            resolver: config.settings.resolver.clone(),
            discriminator: config.settings.discriminator.clone(),
        }
    }

    /// Runs one scan. A process that cannot be queried contributes zero
    /// windows; the scan itself never fails. There is no cancellation: a
    /// newer scan's result simply supersedes this one.
    pub async fn resolve(&self) -> Vec<WindowRecord> {
        let scope = if self.resolver.include_offscreen {
            ListScope::AllSpaces
        } else {
            ListScope::OnScreen
        };
        let own_pid = self.server.own_pid();
        let apps: HashMap<pid_t, AppInfo> = self
            .server
            .running_apps()
            .into_iter()
            .filter(|app| app.is_regular && app.pid != own_pid)
            .map(|app| (app.pid, app))
            .collect();

        // The server list's native order is the z-order, front-most first.
        // A row whose process disappeared mid-scan drops out here.
        let rows: Vec<WindowServerInfo> = self
            .server
            .list_windows(scope)
            .into_iter()
            .filter(|row| {
                row.layer == NORMAL_WINDOW_LEVEL
                    && row.pid != own_pid
                    && apps.contains_key(&row.pid)
            })
            .collect();

        let z_order: HashMap<WindowServerId, usize> =
            rows.iter().enumerate().map(|(z, row)| (row.id, z)).collect();

        let mut rows_by_pid: HashMap<pid_t, Vec<WindowServerInfo>> = HashMap::default();
        for row in rows {
            rows_by_pid.entry(row.pid).or_default().push(row);
        }

        let tree_results = self.query_trees(rows_by_pid.keys().copied()).await;

        let mut records = Vec::new();
        for (pid, rows) in &rows_by_pid {
            let app = &apps[pid];
            let tree_windows = match tree_results.get(pid) {
                Some(Ok(windows)) => windows.clone(),
                Some(Err(err)) => {
                    debug!("process {pid} contributed no windows this scan: {err}");
                    Vec::new()
                }
                None => Vec::new(),
            };
            self.merge_process(app, rows, tree_windows, &mut records);
        }

        // Stable sort: records without a z entry sort last, keeping their
        // relative order.
        records.sort_by_key(|record| z_order.get(&record.id).copied().unwrap_or(usize::MAX));
        records
    }

    /// Queries each process's accessibility tree in parallel, one task per
    /// process. Each task only returns its own output; there is no shared
    /// mutable state and no group state in reach.
    async fn query_trees(
        &self,
        pids: impl Iterator<Item = pid_t>,
    ) -> HashMap<pid_t, Result<Vec<AxWindowInfo>, crate::sys::ax::AxError>> {
        let timeout = Duration::from_millis(self.resolver.ax_timeout_ms);
        let mut tasks = JoinSet::new();
        for pid in pids {
            let tree = self.tree.clone();
            tasks.spawn_blocking(move || (pid, tree.app_windows(pid, timeout)));
        }
        let mut results = HashMap::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((pid, result)) => {
                    results.insert(pid, result);
                }
                Err(err) => warn!("accessibility query task failed: {err}"),
            }
        }
        results
    }

    fn merge_process(
        &self,
        app: &AppInfo,
        rows: &[WindowServerInfo],
        tree_windows: Vec<AxWindowInfo>,
        records: &mut Vec<WindowRecord>,
    ) {
        let mut by_id: HashMap<WindowServerId, AxWindowInfo> = tree_windows
            .into_iter()
            .filter_map(|info| info.window_server_id.map(|id| (id, info)))
            .collect();

        // Recover windows the default tree query cannot see (typically on
        // another virtual desktop) with a bounded per-id probe.
        let known: HashSet<WindowServerId> = by_id.keys().copied().collect();
        for row in rows {
            if !known.contains(&row.id)
                && let Some(info) = self.tree.probe_window(app.pid, row.id)
            {
                by_id.insert(row.id, info);
            }
        }

        for row in rows {
            let record = match by_id.remove(&row.id) {
                Some(info) => {
                    if info.minimized {
                        continue;
                    }
                    let candidate = WindowCandidate {
                        id: row.id,
                        role: &info.role,
                        subrole: &info.subrole,
                        title: &info.title,
                        size: info.frame.size,
                        layer: row.layer,
                        bundle_id: app.bundle_id.as_deref(),
                        app_name: &app.name,
                        executable_path: app.executable_path.as_deref(),
                    };
                    if !is_actual_window(&candidate, &self.discriminator) {
                        trace!("discriminator rejected window {}", row.id);
                        continue;
                    }
                    WindowRecord {
                        id: row.id,
                        pid: app.pid,
                        bundle_id: app.bundle_id.clone(),
                        title: info.title,
                        app_name: app.name.clone(),
                        icon: app.icon.clone(),
                        ax: AxRef::window(info.handle),
                        cached_bounds: Some(info.frame),
                    }
                }
                None if row.on_screen => {
                    // On screen but invisible to the tree: a companion or
                    // auxiliary rendering surface, not a user window.
                    trace!("dropping companion surface {}", row.id);
                    continue;
                }
                None => {
                    // Off screen (another desktop) with no tree handle:
                    // synthesize a placeholder from the app root, resolved
                    // to a concrete handle at focus time.
                    let Ok(root) = self.tree.application_root(app.pid) else {
                        continue;
                    };
                    let title = row.title.clone().unwrap_or_default();
                    let candidate = WindowCandidate {
                        id: row.id,
                        role: role::WINDOW,
                        subrole: subrole::STANDARD_WINDOW,
                        title: &title,
                        size: row.frame.size,
                        layer: row.layer,
                        bundle_id: app.bundle_id.as_deref(),
                        app_name: &app.name,
                        executable_path: app.executable_path.as_deref(),
                    };
                    if !is_actual_window(&candidate, &self.discriminator) {
                        continue;
                    }
                    WindowRecord {
                        id: row.id,
                        pid: app.pid,
                        bundle_id: app.bundle_id.clone(),
                        title,
                        app_name: app.name.clone(),
                        icon: app.icon.clone(),
                        ax: AxRef::placeholder(root),
                        cached_bounds: Some(row.frame),
                    }
                }
            };
            records.push(record);
        }
    }
}
