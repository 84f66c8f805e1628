use std::path::PathBuf;
use thiserror::Error;

/// Ошибки валидации входящих записей (запуск / окно).
///
/// Возникают только на границе типов данных: запись с такой ошибкой
/// никогда не попадает в реестр.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Время запуска {timestamp:.3} опережает часы демона на {ahead:.3}с (допуск {tolerance:.3}с)")]
    FutureTimestamp {
        timestamp: f64,
        ahead: f64,
        tolerance: f64,
    },

    #[error("Номер рабочего стола {0} вне диапазона 1..=70")]
    WorkspaceOutOfRange(i64),

    #[error("Некорректный PID запускающего процесса: {0}")]
    InvalidPid(i64),

    #[error("Путь проекта не абсолютный: {0:?}")]
    RelativeProjectDirectory(PathBuf),

    #[error("Не удалось разрешить путь проекта {path:?}: {reason}")]
    UnresolvableProjectDirectory { path: PathBuf, reason: String },

    #[error("Пустое поле: {0}")]
    EmptyField(&'static str),

    #[error("Некорректная временная метка: {0}")]
    InvalidTimestamp(f64),
}

#[derive(Error, Debug)]
pub enum CorrelatorError {
    #[error("Ошибка ввода-вывода: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ошибка JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Ошибка валидации: {0}")]
    Validation(#[from] ValidationError),

    #[error("Сервис недоступен: {0}")]
    ServiceUnavailable(String),

    #[error("Внутренняя ошибка: {0}")]
    Internal(String),
}

impl CorrelatorError {
    pub fn service_unavailable<T>(msg: impl Into<String>) -> Result<T> {
        Err(CorrelatorError::ServiceUnavailable(msg.into()))
    }
}

pub type Result<T> = std::result::Result<T, CorrelatorError>;
