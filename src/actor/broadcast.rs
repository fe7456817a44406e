//! Change notifications consumed by the presentation layer (menu bar,
//! switcher panel). This is the only outbound contract.

use serde::{Deserialize, Serialize};

use crate::model::store::GroupId;
use crate::model::window::WindowData;
use crate::sys::window_server::WindowServerId;

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "snake_case")]
#[serde(tag = "type")]
pub enum BroadcastEvent {
    /// The accessibility API is unavailable; prompt the user once.
    PermissionNeeded,
    GroupCreated {
        group: GroupId,
        windows: Vec<WindowServerId>,
    },
    GroupChanged {
        group: GroupId,
        windows: Vec<WindowServerId>,
        active: usize,
    },
    GroupDissolved {
        group: GroupId,
        windows: Vec<WindowServerId>,
    },
    ActiveTabChanged {
        group: GroupId,
        active: usize,
    },
    WindowTitleChanged {
        id: WindowServerId,
        title: String,
    },
    /// Result of a window scan, for the grouping picker UI.
    WindowsResolved {
        windows: Vec<WindowData>,
    },
}

pub type BroadcastSender = crate::actor::Sender<BroadcastEvent>;
pub type BroadcastReceiver = crate::actor::Receiver<BroadcastEvent>;
