pub mod launch;
pub mod window;

pub use launch::{LaunchNotification, PendingLaunch};
pub use window::{WindowNotification, WindowObservation};
