use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Допустимый диапазон номеров рабочих столов
pub const WORKSPACE_MIN: i64 = 1;
pub const WORKSPACE_MAX: i64 = 70;

/// Допустимое опережение часов отправителя относительно часов демона (секунды)
pub const DEFAULT_CLOCK_SKEW_TOLERANCE_SECS: f64 = 1.0;

/// Уведомление о запуске в том виде, в каком его присылает обёртка запуска.
///
/// Числовые поля знаковые: отрицательный PID или рабочий стол должен
/// отклоняться как ошибка валидации, а не как ошибка декодирования.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchNotification {
    pub app_name: String,
    pub project_name: String,
    pub project_directory: PathBuf,
    pub launcher_pid: i64,
    pub workspace_number: i64,
    pub timestamp: f64,
    pub expected_class: String,
}

/// Запуск, ожидающий появления своего окна
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingLaunch {
    pub app_name: String,
    pub project_name: String,
    pub project_directory: PathBuf,
    pub launcher_pid: u32,
    pub workspace_number: u32,
    pub timestamp: f64,
    pub expected_class: String,
    pub(crate) matched: bool,
}

impl PendingLaunch {
    /// Валидирует уведомление с допуском рассинхронизации часов по умолчанию
    #[allow(dead_code)]
    pub fn new(notification: LaunchNotification, now: f64) -> Result<Self, ValidationError> {
        Self::with_skew_tolerance(notification, now, DEFAULT_CLOCK_SKEW_TOLERANCE_SECS)
    }

    pub fn with_skew_tolerance(
        notification: LaunchNotification,
        now: f64,
        tolerance: f64,
    ) -> Result<Self, ValidationError> {
        let LaunchNotification {
            app_name,
            project_name,
            project_directory,
            launcher_pid,
            workspace_number,
            timestamp,
            expected_class,
        } = notification;

        if app_name.is_empty() {
            return Err(ValidationError::EmptyField("app_name"));
        }
        if expected_class.is_empty() {
            return Err(ValidationError::EmptyField("expected_class"));
        }
        if !timestamp.is_finite() {
            return Err(ValidationError::InvalidTimestamp(timestamp));
        }

        let ahead = timestamp - now;
        if ahead > tolerance {
            return Err(ValidationError::FutureTimestamp {
                timestamp,
                ahead,
                tolerance,
            });
        }

        let workspace_number = validate_workspace(workspace_number)?;

        let launcher_pid = u32::try_from(launcher_pid)
            .ok()
            .filter(|pid| *pid > 0)
            .ok_or(ValidationError::InvalidPid(launcher_pid))?;

        let project_directory = canonical_project_directory(&project_directory)?;

        Ok(Self {
            app_name,
            project_name,
            project_directory,
            launcher_pid,
            workspace_number,
            timestamp,
            expected_class,
            matched: false,
        })
    }

    pub fn age(&self, now: f64) -> f64 {
        now - self.timestamp
    }

    /// Ровно на границе таймаута запуск ещё не считается просроченным
    pub fn is_expired(&self, now: f64, timeout: f64) -> bool {
        self.age(now) > timeout
    }

    #[allow(dead_code)]
    pub fn is_matched(&self) -> bool {
        self.matched
    }

    /// Единственная мутация записи: false -> true, без отката
    pub(crate) fn mark_matched(&mut self) {
        debug_assert!(!self.matched, "запуск уже сопоставлен");
        self.matched = true;
    }
}

impl fmt::Display for PendingLaunch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] -> ws{} ({})",
            self.app_name, self.project_name, self.workspace_number, self.expected_class
        )
    }
}

pub(crate) fn validate_workspace(workspace_number: i64) -> Result<u32, ValidationError> {
    if !(WORKSPACE_MIN..=WORKSPACE_MAX).contains(&workspace_number) {
        return Err(ValidationError::WorkspaceOutOfRange(workspace_number));
    }
    Ok(workspace_number as u32)
}

fn canonical_project_directory(path: &Path) -> Result<PathBuf, ValidationError> {
    if !path.is_absolute() {
        return Err(ValidationError::RelativeProjectDirectory(path.to_path_buf()));
    }

    path.canonicalize()
        .map_err(|e| ValidationError::UnresolvableProjectDirectory {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}
