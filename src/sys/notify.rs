//! External per-window notification plumbing. Callbacks are delivered on a
//! thread owned by the notification mechanism; handlers must only enqueue.

use std::fmt;
use std::sync::Arc;

use strum::IntoEnumIterator;
use strum_macros::EnumIter;

use crate::sys::ax::{AxError, AxHandle};
use crate::sys::window_server::pid_t;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter)]
pub enum NotifyKind {
    Moved,
    Resized,
    Destroyed,
    TitleChanged,
    /// Process-level: the app's focused window changed. Subscribed on the
    /// application root, not on individual windows.
    FocusChanged,
}

impl NotifyKind {
    /// The kinds subscribed per grouped window.
    pub fn window_kinds() -> impl Iterator<Item = NotifyKind> {
        NotifyKind::iter().filter(|kind| *kind != NotifyKind::FocusChanged)
    }
}

impl fmt::Display for NotifyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// A raw notification exactly as delivered by the external mechanism. The
/// element may already be invalid by the time this is observed (destroy).
#[derive(Clone, Copy, Debug)]
pub struct RawNotification {
    pub pid: pid_t,
    pub kind: NotifyKind,
    pub element: AxHandle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverToken(pub u64);

/// Called on an arbitrary external thread for every delivered notification.
pub type RawHandler = Arc<dyn Fn(RawNotification) + Send + Sync>;

/// One observer per process; subscriptions are per (element, kind).
pub trait NotificationSource: Send + Sync {
    fn create_observer(&self, pid: pid_t, handler: RawHandler) -> Result<ObserverToken, AxError>;
    fn destroy_observer(&self, token: ObserverToken);
    fn subscribe(
        &self,
        token: ObserverToken,
        element: AxHandle,
        kind: NotifyKind,
    ) -> Result<(), AxError>;
    fn unsubscribe(&self, token: ObserverToken, element: AxHandle, kind: NotifyKind);
}
