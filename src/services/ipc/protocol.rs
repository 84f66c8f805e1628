//! Wire protocol of the daemon socket: one JSON object per line.
//!
//! Malformed requests fail fast at this boundary and never reach the registry.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const MAX_REQUEST_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    Ping,
    NotifyLaunch,
    NotifyWindow,
    GetStats,
    GetPending,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Request {
    pub method: Method,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PendingParams {
    #[serde(default)]
    pub include_matched: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidJson,
    InvalidParams,
    ValidationFailed,
    RequestTooLarge,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidJson => "invalid_json",
            ErrorCode::InvalidParams => "invalid_params",
            ErrorCode::ValidationFailed => "validation_failed",
            ErrorCode::RequestTooLarge => "request_too_large",
            ErrorCode::Internal => "internal",
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl Response {
    pub fn ok(id: Option<String>, data: Value) -> Self {
        Self {
            ok: true,
            id,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(id: Option<String>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(ErrorInfo {
                code: code.as_str().to_string(),
                message: message.into(),
            }),
        }
    }

    /// Сериализация в одну строку с завершающим переводом строки
    pub fn to_line(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                r#"{{"ok":false,"error":{{"code":"internal","message":"{}"}}}}"#,
                e.to_string().replace('"', "'")
            )
        });
        line.push('\n');
        line
    }
}
