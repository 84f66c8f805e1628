//! Window sources: responsibility and boundaries
//!
//! This module and its submodules are responsible ONLY for noticing new windows
//! (id/class/pid/workspace depending on the backend) and turning them into
//! WindowObservation(s). They MUST NOT decide which launch a window belongs to:
//! all correlation decisions are made by WindowCorrelator / LaunchRegistry.

mod dry_run;
mod ipc_only;
mod sway;
mod r#trait;

pub use self::r#trait::create_window_source;
