pub mod correlator;
pub mod ipc;
pub mod window_source;

pub use correlator::WindowCorrelator;
pub use ipc::LaunchListener;
pub use window_source::create_window_source;
