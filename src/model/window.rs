use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::sys::ax::AxHandle;
use crate::sys::geometry::Rect;
use crate::sys::window_server::{WindowServerId, pid_t};

/// Non-owning reference to a window's accessibility element.
#[derive(Clone, Copy, Debug)]
pub struct AxRef {
    pub handle: AxHandle,
    /// True when `handle` is the application root standing in for a window
    /// on another virtual desktop. Resolved to a concrete window handle
    /// lazily, at focus time.
    pub placeholder: bool,
}

impl AxRef {
    pub fn window(handle: AxHandle) -> Self {
        AxRef { handle, placeholder: false }
    }

    pub fn placeholder(handle: AxHandle) -> Self {
        AxRef { handle, placeholder: true }
    }
}

/// One canonical window. Identity is `id` alone; every other field is
/// display metadata and may change without affecting identity.
#[derive(Clone, Debug)]
pub struct WindowRecord {
    pub id: WindowServerId,
    pub pid: pid_t,
    pub bundle_id: Option<String>,
    pub title: String,
    pub app_name: String,
    pub icon: Option<Vec<u8>>,
    pub ax: AxRef,
    pub cached_bounds: Option<Rect>,
}

impl PartialEq for WindowRecord {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for WindowRecord {}

impl Hash for WindowRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Serializable snapshot of a window for the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowData {
    pub id: WindowServerId,
    pub pid: pid_t,
    pub title: String,
    pub app_name: String,
    pub bundle_id: Option<String>,
    pub frame: Option<Rect>,
}

impl From<&WindowRecord> for WindowData {
    fn from(record: &WindowRecord) -> Self {
        WindowData {
            id: record.id,
            pid: record.pid,
            title: record.title.clone(),
            app_name: record.app_name.clone(),
            bundle_id: record.bundle_id.clone(),
            frame: record.cached_bounds,
        }
    }
}
