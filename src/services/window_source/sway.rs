use crate::error::{CorrelatorError, Result};
use crate::events::WindowObservation;
use crate::services::WindowCorrelator;
use serde_json::Value;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

use super::r#trait::WindowSourceTrait;

const SUBSCRIBE_PAYLOAD: &str = r#"["window"]"#;
const RESTART_DELAY: Duration = Duration::from_secs(10);

/// Новое окно из события sway, до определения рабочего стола
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWindow {
    pub id: u64,
    pub pid: Option<u32>,
    pub class: String,
}

/// Разобрать строку `swaymsg -t subscribe -m '["window"]'`.
/// Возвращает None для всего, кроме `change == "new"`.
pub fn parse_window_event(line: &str) -> Option<NewWindow> {
    let event: Value = serde_json::from_str(line).ok()?;
    if event.get("change")?.as_str()? != "new" {
        return None;
    }

    let container = event.get("container")?;
    let id = container.get("id")?.as_u64()?;
    let pid = container
        .get("pid")
        .and_then(Value::as_u64)
        .and_then(|pid| u32::try_from(pid).ok())
        .filter(|pid| *pid > 0);

    // Wayland-окна несут app_id, XWayland-окна - window_properties.class
    let class = container
        .get("app_id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .or_else(|| {
            container
                .get("window_properties")
                .and_then(|props| props.get("class"))
                .and_then(Value::as_str)
        })?
        .to_string();

    Some(NewWindow { id, pid, class })
}

/// Найти номер рабочего стола, содержащего контейнер, в выводе `swaymsg -t get_tree`
pub fn find_workspace_number(tree: &Value, con_id: u64) -> Option<i64> {
    fn walk(node: &Value, con_id: u64, workspace: Option<i64>) -> Option<i64> {
        let workspace = if node.get("type").and_then(Value::as_str) == Some("workspace") {
            node.get("num").and_then(Value::as_i64)
        } else {
            workspace
        };

        if node.get("id").and_then(Value::as_u64) == Some(con_id) {
            return workspace;
        }

        ["nodes", "floating_nodes"]
            .iter()
            .filter_map(|key| node.get(*key).and_then(Value::as_array))
            .flatten()
            .find_map(|child| walk(child, con_id, workspace))
    }

    walk(tree, con_id, None)
}

pub struct SwayWindowSource {
    correlator: Arc<WindowCorrelator>,
}

impl SwayWindowSource {
    pub fn new(correlator: Arc<WindowCorrelator>) -> Self {
        Self { correlator }
    }

    pub async fn test(&self) -> Result<()> {
        let output = Command::new("swaymsg").args(["-t", "get_version"]).output().await?;
        if output.status.success() {
            Ok(())
        } else {
            CorrelatorError::service_unavailable("swaymsg -t get_version вернул ошибку")
        }
    }

    async fn get_tree(&self) -> Result<Value> {
        let output = Command::new("swaymsg")
            .args(["-t", "get_tree"])
            .output()
            .await
            .map_err(|e| CorrelatorError::ServiceUnavailable(format!("swaymsg не найден: {}", e)))?;

        if !output.status.success() {
            return Err(CorrelatorError::Internal("swaymsg get_tree вернул ошибку".to_string()));
        }

        Ok(serde_json::from_slice(&output.stdout)?)
    }

    async fn run_subscription(&self) -> Result<()> {
        let mut child = Command::new("swaymsg")
            .args(["-t", "subscribe", "-m", SUBSCRIBE_PAYLOAD])
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CorrelatorError::Internal("нет stdout у swaymsg".to_string()))?;
        let mut lines = BufReader::new(stdout).lines();

        info!("Подписка на события окон sway активна");

        while let Some(line) = lines.next_line().await? {
            let Some(window) = parse_window_event(&line) else {
                continue;
            };

            // время наблюдения - момент события, а не конец запроса дерева
            let observed_at = self.correlator.registry().now();
            if let Err(e) = self.observe(window, observed_at).await {
                warn!("Новое окно пропущено: {}", e);
            }
        }

        let status = child.wait().await?;
        Err(CorrelatorError::ServiceUnavailable(format!(
            "подписка swaymsg завершилась: {}",
            status
        )))
    }

    async fn observe(&self, window: NewWindow, observed_at: f64) -> Result<()> {
        let tree = self.get_tree().await?;
        let workspace = find_workspace_number(&tree, window.id).ok_or_else(|| {
            CorrelatorError::Internal(format!("рабочий стол окна #{} не найден", window.id))
        })?;

        let mut observation = WindowObservation::new(window.id, window.class, workspace, observed_at)?;
        if let Some(pid) = window.pid {
            observation = observation.with_pid(pid);
        }

        self.correlator.handle_window_event(&observation);
        Ok(())
    }

    pub async fn run(self) -> Result<()> {
        self.test().await?;
        info!("SwayWindowSource запущен");

        loop {
            match self.run_subscription().await {
                Ok(()) => debug!("Подписка sway завершена"),
                Err(e) => error!("Подписка sway прервана: {}. Переподключение через {:?}", e, RESTART_DELAY),
            }
            sleep(RESTART_DELAY).await;
        }
    }
}

impl Drop for SwayWindowSource {
    fn drop(&mut self) {
        info!("SwayWindowSource завершает работу");
    }
}

#[async_trait::async_trait]
impl WindowSourceTrait for SwayWindowSource {
    async fn run(self: Box<Self>) -> Result<()> {
        (*self).run().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_xwayland_new_window() {
        let line = json!({
            "change": "new",
            "container": {
                "id": 94,
                "type": "con",
                "pid": 31337,
                "app_id": null,
                "window_properties": {"class": "Code", "instance": "code"}
            }
        })
        .to_string();

        assert_eq!(
            parse_window_event(&line),
            Some(NewWindow { id: 94, pid: Some(31337), class: "Code".to_string() })
        );
    }

    #[test]
    fn test_parse_wayland_app_id_and_ignores_other_changes() {
        let line = r#"{"change":"new","container":{"id":5,"pid":0,"app_id":"foot"}}"#;
        assert_eq!(
            parse_window_event(line),
            Some(NewWindow { id: 5, pid: None, class: "foot".to_string() })
        );

        assert_eq!(parse_window_event(r#"{"change":"focus","container":{"id":5,"app_id":"foot"}}"#), None);
        assert_eq!(parse_window_event(r#"{"change":"new","container":{"id":5}}"#), None);
        assert_eq!(parse_window_event("garbage"), None);
    }

    #[test]
    fn test_find_workspace_number_walks_tiled_and_floating() {
        let tree = json!({
            "id": 1, "type": "root",
            "nodes": [{
                "id": 2, "type": "output",
                "nodes": [
                    {"id": 10, "type": "workspace", "num": 2,
                     "nodes": [{"id": 11, "type": "con", "nodes": [{"id": 94, "type": "con"}]}],
                     "floating_nodes": []},
                    {"id": 20, "type": "workspace", "num": 3,
                     "nodes": [],
                     "floating_nodes": [{"id": 95, "type": "floating_con"}]}
                ]
            }]
        });

        assert_eq!(find_workspace_number(&tree, 94), Some(2));
        assert_eq!(find_workspace_number(&tree, 95), Some(3));
        assert_eq!(find_workspace_number(&tree, 999), None);
    }
}
