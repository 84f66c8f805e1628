use crate::error::{CorrelatorError, Result};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const APP_DIR: &str = "launch-correlator";
const SOCKET_NAME: &str = "daemon.sock";

/// Разрешить путь сокета: "auto" -> каталог рантайма пользователя
pub fn resolve_socket_path(configured: &str) -> PathBuf {
    if configured != "auto" {
        return PathBuf::from(configured);
    }

    let base = match std::env::var_os("XDG_RUNTIME_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir).join(APP_DIR),
        _ => {
            let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
            std::env::temp_dir().join(format!("{}-{}", APP_DIR, user))
        }
    };

    base.join(SOCKET_NAME)
}

/// Подготовить каталог сокета и удалить сокет от предыдущего запуска
pub fn prepare_socket_path(socket_path: &Path) -> Result<()> {
    let dir = socket_path.parent().ok_or_else(|| {
        CorrelatorError::Internal(format!("У пути сокета нет родительского каталога: {:?}", socket_path))
    })?;

    if !dir.exists() {
        fs::create_dir_all(dir)?;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
        info!("Создан каталог сокета {:?}", dir);
    } else {
        check_dir_permissions(dir)?;
    }

    remove_stale_socket(socket_path)
}

fn check_dir_permissions(dir: &Path) -> Result<()> {
    let mode = fs::metadata(dir)?.permissions().mode();

    // Чужие пользователи не должны иметь доступ к сокету
    if mode & 0o077 != 0 {
        warn!(
            "Каталог сокета {:?} доступен группе или всем (права {:o})",
            dir,
            mode & 0o777
        );
    }

    Ok(())
}

fn remove_stale_socket(socket_path: &Path) -> Result<()> {
    match fs::symlink_metadata(socket_path) {
        Ok(metadata) => {
            use std::os::unix::fs::FileTypeExt;
            if !metadata.file_type().is_socket() {
                return Err(CorrelatorError::Internal(format!(
                    "{:?} существует и не является сокетом",
                    socket_path
                )));
            }
            fs::remove_file(socket_path)?;
            info!("Удалён старый сокет {:?}", socket_path);
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
