//! The window-server view of the world: a flat, z-ordered list of on-screen
//! surfaces with numeric ids and no semantic attributes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::sys::geometry::Rect;

#[allow(non_camel_case_types)]
pub type pid_t = i32;

/// The window level of ordinary application windows. Anything outside this
/// band is system chrome unless whitelisted.
pub const NORMAL_WINDOW_LEVEL: i32 = 0;

/// Identifier the window server assigns to a surface. Process-unique and
/// externally owned; the server may reuse a value after the window closes,
/// but never while we hold a live record for it.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct WindowServerId(u32);

impl WindowServerId {
    pub fn new(id: u32) -> Self {
        WindowServerId(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for WindowServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One row of the window-server list.
#[derive(Clone, Debug, PartialEq)]
pub struct WindowServerInfo {
    pub id: WindowServerId,
    pub pid: pid_t,
    pub layer: i32,
    pub frame: Rect,
    /// The server-side title, when the owning process published one.
    pub title: Option<String>,
    /// False for windows on another virtual desktop.
    pub on_screen: bool,
}

/// Metadata for a running application, used to fill display fields on
/// window records and to filter scans to regular apps.
#[derive(Clone, Debug, PartialEq)]
pub struct AppInfo {
    pub pid: pid_t,
    pub bundle_id: Option<String>,
    pub name: String,
    pub executable_path: Option<String>,
    pub icon: Option<Vec<u8>>,
    /// Whether the app has a regular activation policy (shows up in the
    /// dock/switcher). Background agents never contribute windows.
    pub is_regular: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListScope {
    /// Only windows currently on screen.
    OnScreen,
    /// Windows on every virtual desktop.
    AllSpaces,
}

/// Read-only access to the window server. The returned list's native order
/// is the z-order, front-most first; it is ground truth and is never
/// re-sorted by any other key.
pub trait WindowServer: Send + Sync {
    fn list_windows(&self, scope: ListScope) -> Vec<WindowServerInfo>;
    fn running_apps(&self) -> Vec<AppInfo>;
    fn own_pid(&self) -> pid_t;
}
