pub mod config;
pub mod resource;

pub use config::{BackoffStrategy, RunSettings};
pub use resource::{Action, Notification, ResourceId, ResourceKind, Timing};
