use crate::error::Result;
use crate::events::{LaunchNotification, WindowObservation};
use crate::services::WindowCorrelator;
use std::sync::Arc;
use tokio::time::{interval, sleep, Duration};
use tracing::{info, warn};

use super::r#trait::WindowSourceTrait;

/// (приложение, класс окна, проект)
const FAKE_LAUNCHES: [(&str, &str, &str); 4] = [
    ("vscode", "Code", "nixos"),
    ("alacritty", "Alacritty", "stacks"),
    ("firefox", "firefox", "personal"),
    ("vscode", "Code", "stacks"),
];

/// Эмулирует обе стороны: обёртку запуска и композитор
pub struct DryRunSource {
    correlator: Arc<WindowCorrelator>,
}

impl DryRunSource {
    pub fn new(correlator: Arc<WindowCorrelator>) -> Self {
        Self { correlator }
    }

    async fn run_impl(self) -> Result<()> {
        info!("Dry-run режим - источник окон работает в режиме эмуляции");

        let registry = Arc::clone(self.correlator.registry());
        let mut ticker = interval(Duration::from_secs(10));
        let mut window_id: u64 = 1;
        let mut step: usize = 0;

        loop {
            ticker.tick().await;

            let index = step % FAKE_LAUNCHES.len();
            step += 1;
            let (app, class, project) = FAKE_LAUNCHES[index];
            let workspace = index as i64 + 1;

            let notification = LaunchNotification {
                app_name: app.to_string(),
                project_name: project.to_string(),
                project_directory: std::env::temp_dir(),
                launcher_pid: i64::from(std::process::id()),
                workspace_number: workspace,
                timestamp: registry.now(),
                expected_class: class.to_string(),
            };

            info!("Dry-run: эмулируем запуск {} для проекта {}", app, project);
            if let Err(e) = registry.admit(notification) {
                warn!("Dry-run: запуск отклонён: {}", e);
                continue;
            }

            // окно появляется чуть позже запуска
            sleep(Duration::from_millis(300)).await;

            let observation = WindowObservation::new(window_id, class, workspace, registry.now())?;
            self.correlator.handle_window_event(&observation);
            window_id += 1;

            info!("Dry-run статистика: {}", registry.stats());
        }
    }
}

#[async_trait::async_trait]
impl WindowSourceTrait for DryRunSource {
    async fn run(self: Box<Self>) -> Result<()> {
        (*self).run_impl().await
    }
}
