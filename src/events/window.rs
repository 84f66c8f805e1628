use crate::error::ValidationError;
use crate::events::launch::validate_workspace;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Уведомление о новом окне от слушателя событий композитора.
///
/// Отсутствующая временная метка означает "наблюдено сейчас".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowNotification {
    pub window_id: u64,
    pub window_class: String,
    #[serde(default)]
    pub window_pid: Option<u32>,
    pub workspace_number: i64,
    #[serde(default)]
    pub timestamp: Option<f64>,
}

/// Наблюдение нового окна
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowObservation {
    pub window_id: u64,
    pub window_class: String,
    pub window_pid: Option<u32>,
    pub workspace_number: u32,
    pub timestamp: f64,
}

impl WindowObservation {
    pub fn new(
        window_id: u64,
        window_class: impl Into<String>,
        workspace_number: i64,
        timestamp: f64,
    ) -> Result<Self, ValidationError> {
        if !timestamp.is_finite() {
            return Err(ValidationError::InvalidTimestamp(timestamp));
        }

        Ok(Self {
            window_id,
            window_class: window_class.into(),
            window_pid: None,
            workspace_number: validate_workspace(workspace_number)?,
            timestamp,
        })
    }

    pub fn with_pid(mut self, pid: u32) -> Self {
        self.window_pid = Some(pid);
        self
    }

    pub fn from_notification(notification: WindowNotification, now: f64) -> Result<Self, ValidationError> {
        let observation = Self::new(
            notification.window_id,
            notification.window_class,
            notification.workspace_number,
            notification.timestamp.unwrap_or(now),
        )?;

        Ok(match notification.window_pid {
            Some(pid) => observation.with_pid(pid),
            None => observation,
        })
    }
}

impl fmt::Display for WindowObservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} ({}) ws{}", self.window_id, self.window_class, self.workspace_number)?;
        if let Some(pid) = self.window_pid {
            write!(f, " pid={}", pid)?;
        }
        Ok(())
    }
}
