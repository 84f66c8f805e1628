use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::correlation::registry::DEFAULT_TIMEOUT_SECS;
use crate::events::launch::DEFAULT_CLOCK_SKEW_TOLERANCE_SECS;

pub const ENV_PREFIX: &str = "LAUNCH_CORRELATOR_";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub correlation: CorrelationConfig,
    pub ipc: IpcConfig,
    pub window: WindowConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub filter: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorrelationConfig {
    /// Время жизни ожидающего запуска, секунды
    pub timeout_secs: f64,
    /// Допустимое опережение часов обёртки запуска, секунды
    pub clock_skew_tolerance_secs: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IpcConfig {
    /// "auto" = $XDG_RUNTIME_DIR/launch-correlator/daemon.sock
    pub socket_path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WindowConfig {
    /// "sway" - подписка на события swaymsg, "ipc" - окна только через сокет
    pub detection_mode: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "full".to_string(),
                filter: "launch_correlator=info".to_string(),
            },
            correlation: CorrelationConfig {
                timeout_secs: DEFAULT_TIMEOUT_SECS,
                clock_skew_tolerance_secs: DEFAULT_CLOCK_SKEW_TOLERANCE_SECS,
            },
            ipc: IpcConfig {
                socket_path: "auto".to_string(),
            },
            window: WindowConfig {
                detection_mode: "sway".to_string(),
            },
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();

        let config: Config = Self::figment(config_path)
            .extract()
            .with_context(|| format!("Не удалось загрузить конфигурацию из {:?}", config_path))?;

        config.validate()?;

        Ok(config)
    }

    /// Значения по умолчанию, затем TOML файл (если есть), затем переменные окружения
    fn figment(config_path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn validate(&self) -> Result<()> {
        // Валидация настроек логирования
        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Неверный уровень логирования: {}", self.logging.level),
        }

        match self.logging.format.as_str() {
            "full" | "compact" => {}
            _ => anyhow::bail!("Неверный формат логирования: {}", self.logging.format),
        }

        // Валидация настроек сопоставления
        let timeout = self.correlation.timeout_secs;
        if !timeout.is_finite() || timeout <= 0.0 {
            anyhow::bail!("timeout_secs должно быть положительным числом, получено {}", timeout);
        }

        let tolerance = self.correlation.clock_skew_tolerance_secs;
        if !tolerance.is_finite() || tolerance < 0.0 {
            anyhow::bail!(
                "clock_skew_tolerance_secs не может быть отрицательным, получено {}",
                tolerance
            );
        }

        if self.ipc.socket_path.trim().is_empty() {
            anyhow::bail!("ipc.socket_path не может быть пустым");
        }

        match self.window.detection_mode.as_str() {
            "sway" | "ipc" => {}
            _ => anyhow::bail!(
                "Неверный режим детекции окон: {}",
                self.window.detection_mode
            ),
        }

        Ok(())
    }
}
