pub mod group;
pub mod store;
pub mod window;

pub use group::TabGroup;
pub use store::{GroupId, GroupStore, ReleaseOutcome, StoreError};
pub use window::{AxRef, WindowRecord};
