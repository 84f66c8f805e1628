use crate::error::Result;
use tracing::info;

use super::r#trait::WindowSourceTrait;

/// Окна приходят только через метод notify_window сокета демона
pub struct IpcOnlySource;

#[async_trait::async_trait]
impl WindowSourceTrait for IpcOnlySource {
    async fn run(self: Box<Self>) -> Result<()> {
        info!("Источник окон: только IPC (notify_window)");
        std::future::pending::<()>().await;
        Ok(())
    }
}
