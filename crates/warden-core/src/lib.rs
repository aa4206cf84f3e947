pub mod event;
pub mod model;

pub use event::{ConsumeStatus, ConsumedEvent, Event, PublishStatus, PublishedEvent};
pub use model::{Action, Condition, Group, Permission, PermissionCode, Resource, Role};
