//! The accessibility-tree view of the world: per-process element handles
//! with semantic attributes, incomplete cross-desktop coverage, and
//! per-process call latency.

use std::time::Duration;

use thiserror::Error;

use crate::sys::geometry::Rect;
use crate::sys::window_server::{WindowServerId, pid_t};

pub mod role {
    pub const WINDOW: &str = "AXWindow";
    pub const SHEET: &str = "AXSheet";
    pub const POPOVER: &str = "AXPopover";
}

pub mod subrole {
    pub const STANDARD_WINDOW: &str = "AXStandardWindow";
    pub const DIALOG: &str = "AXDialog";
    pub const SYSTEM_DIALOG: &str = "AXSystemDialog";
    pub const FLOATING_WINDOW: &str = "AXFloatingWindow";
    pub const UNKNOWN: &str = "AXUnknown";
}

/// Non-owning token for an accessibility element in another process. The
/// owning process can destroy the element at any time, so every consumer
/// treats "no longer resolves" as a normal condition, not a fault.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AxHandle {
    pid: pid_t,
    token: u64,
}

impl AxHandle {
    pub fn new(pid: pid_t, token: u64) -> Self {
        AxHandle { pid, token }
    }

    pub fn pid(&self) -> pid_t {
        self.pid
    }

    /// Stable hash usable as a cache key after the element itself has
    /// become invalid (destroy notifications arrive for dead elements).
    pub fn stable_hash(&self) -> u64 {
        (self.pid as u64) << 32 ^ self.token
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AxError {
    #[error("accessibility permission not granted")]
    PermissionDenied,
    #[error("request to process {0} timed out")]
    Timeout(pid_t),
    #[error("element is no longer valid")]
    StaleElement,
    #[error("process cannot be queried")]
    CannotComplete,
    #[error("no such window or attribute")]
    NotFound,
}

/// Attributes of one window element as reported by its owning process.
#[derive(Clone, Debug)]
pub struct AxWindowInfo {
    pub handle: AxHandle,
    /// The window-server id backing this element, when resolvable.
    pub window_server_id: Option<WindowServerId>,
    pub title: String,
    pub frame: Rect,
    pub minimized: bool,
    pub role: String,
    pub subrole: String,
}

/// Access to per-process accessibility trees. Mutating calls (`set_frame`,
/// `raise`) are best-effort: a failure means the window is gone or its
/// process is not responding, never a fault in this crate.
pub trait AccessibilityTree: Send + Sync {
    /// Whether the accessibility API is available to this process at all.
    fn is_trusted(&self) -> bool;

    /// Window elements of `pid`, subject to a messaging timeout so one hung
    /// process cannot stall a scan. Does not see windows on other desktops.
    fn app_windows(&self, pid: pid_t, timeout: Duration) -> Result<Vec<AxWindowInfo>, AxError>;

    /// Bounded brute-force probe for a window the default query cannot see
    /// (typically one on another virtual desktop).
    fn probe_window(&self, pid: pid_t, id: WindowServerId) -> Option<AxWindowInfo>;

    /// The application's root element, used as a placeholder handle for
    /// windows that cannot be resolved yet and as the focus-notification
    /// subscription target.
    fn application_root(&self, pid: pid_t) -> Result<AxHandle, AxError>;

    /// The currently focused window of `pid`.
    fn focused_window(&self, pid: pid_t) -> Result<AxHandle, AxError>;

    /// Resolves an element to its window-server id.
    fn window_id(&self, handle: AxHandle) -> Result<WindowServerId, AxError>;

    /// Whether the element is itself a window (as opposed to an application
    /// root or some other container).
    fn is_window(&self, handle: AxHandle) -> bool;

    fn window_title(&self, handle: AxHandle) -> Result<String, AxError>;

    fn window_frame(&self, handle: AxHandle) -> Result<Rect, AxError>;

    fn set_frame(&self, handle: AxHandle, frame: Rect) -> Result<(), AxError>;

    /// Raises the window and focuses it.
    fn raise(&self, handle: AxHandle) -> Result<(), AxError>;
}
