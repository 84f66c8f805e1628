mod listener;
pub mod protocol;

pub use listener::LaunchListener;
