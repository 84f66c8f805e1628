use crate::config::Config;
use crate::error::Result;
use crate::services::WindowCorrelator;
use std::sync::Arc;

/// Trait for window sources that can run in different modes
#[async_trait::async_trait]
pub trait WindowSourceTrait {
    /// Run the window source until it fails or the task is aborted
    async fn run(self: Box<Self>) -> Result<()>;
}

/// Factory function to create a window source based on the config and the dry_run flag
pub fn create_window_source(
    config: Arc<Config>,
    correlator: Arc<WindowCorrelator>,
    dry_run: bool,
) -> Result<Box<dyn WindowSourceTrait + Send>> {
    if dry_run {
        return Ok(Box::new(super::dry_run::DryRunSource::new(correlator)));
    }

    match config.window.detection_mode.as_str() {
        "sway" => Ok(Box::new(super::sway::SwayWindowSource::new(correlator))),
        "ipc" => Ok(Box::new(super::ipc_only::IpcOnlySource)),
        other => Err(crate::error::CorrelatorError::Internal(format!(
            "Неизвестный режим детекции окон: {}",
            other
        ))),
    }
}
