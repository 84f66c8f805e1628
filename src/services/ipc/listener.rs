use super::protocol::{ErrorCode, Method, PendingParams, Request, Response, MAX_REQUEST_BYTES};
use crate::error::Result;
use crate::events::{LaunchNotification, WindowNotification, WindowObservation};
use crate::services::WindowCorrelator;
use crate::trace_if_enabled;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Разбор и выполнение одного запроса. Сокет здесь не нужен.
pub fn handle_request(line: &str, correlator: &WindowCorrelator) -> Response {
    let request: Request = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => return Response::error(None, ErrorCode::InvalidJson, e.to_string()),
    };

    let id = request.id;
    let registry = correlator.registry();

    match request.method {
        Method::Ping => Response::ok(id, json!({ "version": env!("CARGO_PKG_VERSION") })),

        Method::NotifyLaunch => {
            let notification: LaunchNotification = match parse_params(request.params) {
                Ok(n) => n,
                Err(message) => return Response::error(id, ErrorCode::InvalidParams, message),
            };

            let app_name = notification.app_name.clone();
            match registry.admit(notification) {
                Ok(launch_id) => Response::ok(id, json!({ "launch_id": launch_id })),
                Err(e) => {
                    warn!("Уведомление о запуске '{}' отклонено: {}", app_name, e);
                    Response::error(id, ErrorCode::ValidationFailed, e.to_string())
                }
            }
        }

        Method::NotifyWindow => {
            let notification: WindowNotification = match parse_params(request.params) {
                Ok(n) => n,
                Err(message) => return Response::error(id, ErrorCode::InvalidParams, message),
            };

            match WindowObservation::from_notification(notification, registry.now()) {
                Ok(observation) => data_response(id, &correlator.handle_window_event(&observation)),
                Err(e) => Response::error(id, ErrorCode::ValidationFailed, e.to_string()),
            }
        }

        Method::GetStats => data_response(id, &registry.stats()),

        Method::GetPending => {
            let params: PendingParams = match request.params {
                None | Some(Value::Null) => PendingParams::default(),
                Some(value) => match parse_params(Some(value)) {
                    Ok(params) => params,
                    Err(message) => return Response::error(id, ErrorCode::InvalidParams, message),
                },
            };
            data_response(id, &registry.pending(params.include_matched))
        }
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> std::result::Result<T, String> {
    let params = params.ok_or_else(|| "отсутствует params".to_string())?;
    serde_json::from_value(params).map_err(|e| e.to_string())
}

fn data_response<T: Serialize>(id: Option<String>, data: &T) -> Response {
    match serde_json::to_value(data) {
        Ok(value) => Response::ok(id, value),
        Err(e) => Response::error(id, ErrorCode::Internal, e.to_string()),
    }
}

/// Слушатель сокета демона: уведомления о запусках, окнах и диагностика
pub struct LaunchListener {
    listener: UnixListener,
    socket_path: PathBuf,
    correlator: Arc<WindowCorrelator>,
}

impl LaunchListener {
    /// Путь должен быть подготовлен заранее (см. utils::prepare_socket_path)
    pub fn bind(socket_path: &Path, correlator: Arc<WindowCorrelator>) -> Result<Self> {
        let listener = UnixListener::bind(socket_path)?;
        info!("Сокет демона слушает: {:?}", socket_path);

        Ok(Self {
            listener,
            socket_path: socket_path.to_path_buf(),
            correlator,
        })
    }

    pub async fn run(self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    let correlator = Arc::clone(&self.correlator);
                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(stream, correlator).await {
                            debug!("Соединение закрыто с ошибкой: {}", e);
                        }
                    });
                }
                Err(e) => {
                    // EMFILE и подобные не проходят сами, не крутимся вхолостую
                    warn!("Не удалось принять соединение: {}. Повтор через {:?}", e, ACCEPT_RETRY_DELAY);
                    sleep(ACCEPT_RETRY_DELAY).await;
                }
            }
        }
    }
}

impl Drop for LaunchListener {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.socket_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                error!("Не удалось удалить сокет {:?}: {}", self.socket_path, e);
            }
        }
    }
}

async fn serve_connection(stream: UnixStream, correlator: Arc<WindowCorrelator>) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let read = (&mut reader)
            .take(MAX_REQUEST_BYTES as u64 + 1)
            .read_until(b'\n', &mut buf)
            .await?;

        if read == 0 {
            return Ok(());
        }

        if buf.len() > MAX_REQUEST_BYTES && buf.last() != Some(&b'\n') {
            let response = Response::error(
                None,
                ErrorCode::RequestTooLarge,
                format!("запрос длиннее {} байт", MAX_REQUEST_BYTES),
            );
            write_half.write_all(response.to_line().as_bytes()).await?;
            return Ok(());
        }

        let request = match std::str::from_utf8(&buf) {
            Ok(text) => text.trim(),
            Err(e) => {
                let response = Response::error(None, ErrorCode::InvalidJson, e.to_string());
                write_half.write_all(response.to_line().as_bytes()).await?;
                continue;
            }
        };
        if request.is_empty() {
            continue;
        }

        trace_if_enabled!("IPC запрос: {}", request);
        let response = handle_request(request, &correlator);
        write_half.write_all(response.to_line().as_bytes()).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::{LaunchRegistry, ManualClock};
    use crate::events::launch::tests::BASE;

    fn correlator() -> WindowCorrelator {
        let clock = Arc::new(ManualClock::new(BASE));
        WindowCorrelator::new(Arc::new(LaunchRegistry::new(5.0, clock)))
    }

    fn launch_request(app: &str, workspace: i64, timestamp: f64) -> String {
        json!({
            "method": "notify_launch",
            "id": app,
            "params": {
                "app_name": app,
                "project_name": "nixos",
                "project_directory": std::env::temp_dir(),
                "launcher_pid": 4242,
                "workspace_number": workspace,
                "timestamp": timestamp,
                "expected_class": "Code",
            }
        })
        .to_string()
    }

    #[test]
    fn test_notify_launch_then_window() {
        let correlator = correlator();

        let response = handle_request(&launch_request("vscode", 2, BASE), &correlator);
        assert!(response.ok, "{:?}", response.error);
        assert_eq!(response.id.as_deref(), Some("vscode"));
        assert_eq!(response.data.unwrap()["launch_id"], 0);

        let window = json!({
            "method": "notify_window",
            "params": {"window_id": 77, "window_class": "Code", "workspace_number": 2}
        })
        .to_string();
        let response = handle_request(&window, &correlator);
        let data = response.data.unwrap();
        assert_eq!(data["outcome"], "matched");
        assert_eq!(data["confidence"], 1.0);
        assert_eq!(data["level"], "EXACT");
        assert_eq!(data["launch"]["project_name"], "nixos");

        let response = handle_request(&window, &correlator);
        assert_eq!(response.data.unwrap()["outcome"], "no_match");
    }

    #[test]
    fn test_validation_failure_is_reported() {
        let correlator = correlator();
        let response = handle_request(&launch_request("vscode", 71, BASE), &correlator);
        assert!(!response.ok);
        assert_eq!(response.error.unwrap().code, "validation_failed");

        let response = handle_request(&launch_request("vscode", 2, BASE + 30.0), &correlator);
        assert_eq!(response.error.unwrap().code, "validation_failed");

        assert_eq!(correlator.registry().stats().total_notifications, 0);
    }

    #[test]
    fn test_malformed_requests() {
        let correlator = correlator();
        let response = handle_request("{not json", &correlator);
        assert_eq!(response.error.unwrap().code, "invalid_json");

        let response = handle_request(r#"{"method":"notify_launch"}"#, &correlator);
        assert_eq!(response.error.unwrap().code, "invalid_params");

        let response = handle_request(r#"{"method":"notify_window","params":{"window_id":"x"}}"#, &correlator);
        assert_eq!(response.error.unwrap().code, "invalid_params");
    }

    #[test]
    fn test_stats_and_pending() {
        let correlator = correlator();
        handle_request(&launch_request("a", 1, BASE), &correlator);
        handle_request(&launch_request("b", 2, BASE), &correlator);

        let stats = handle_request(r#"{"method":"get_stats"}"#, &correlator).data.unwrap();
        assert_eq!(stats["total_notifications"], 2);
        assert_eq!(stats["unmatched_pending"], 2);

        let pending = handle_request(r#"{"method":"get_pending"}"#, &correlator).data.unwrap();
        assert_eq!(pending.as_array().unwrap().len(), 2);

        let pending = handle_request(
            r#"{"method":"get_pending","params":{"include_matched":true}}"#,
            &correlator,
        );
        assert!(pending.ok);
    }

    #[tokio::test]
    async fn test_socket_round_trip() {
        let dir = std::env::temp_dir().join(format!("launch-correlator-ipc-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let socket = dir.join("daemon.sock");

        let listener = LaunchListener::bind(&socket, Arc::new(correlator())).unwrap();
        let server = tokio::spawn(listener.run());

        let stream = UnixStream::connect(&socket).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        write_half.write_all(b"{\"method\":\"ping\",\"id\":\"p\"}\n").await.unwrap();
        let reply: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(reply["ok"], true);
        assert_eq!(reply["id"], "p");

        write_half
            .write_all(format!("{}\n", launch_request("vscode", 3, BASE)).as_bytes())
            .await
            .unwrap();
        let reply: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(reply["ok"], true);

        server.abort();
        let _ = server.await;
        let _ = std::fs::remove_dir_all(&dir);
    }

    async fn spawn_server(name: &str) -> (PathBuf, tokio::task::JoinHandle<Result<()>>) {
        let dir = std::env::temp_dir().join(format!("launch-correlator-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let socket = dir.join("daemon.sock");

        let listener = LaunchListener::bind(&socket, Arc::new(correlator())).unwrap();
        (dir, tokio::spawn(listener.run()))
    }

    #[tokio::test]
    async fn test_request_size_limit() {
        let (dir, server) = spawn_server("limit").await;
        let socket = dir.join("daemon.sock");

        // ровно MAX_REQUEST_BYTES плюс перевод строки ещё обрабатывается
        let ping = br#"{"method":"ping","id":"big"}"#;
        let mut exact = ping.to_vec();
        exact.resize(MAX_REQUEST_BYTES, b' ');
        exact.push(b'\n');

        let stream = UnixStream::connect(&socket).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();
        write_half.write_all(&exact).await.unwrap();
        let reply: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(reply["ok"], true);
        assert_eq!(reply["id"], "big");

        // длиннее лимита без перевода строки: ошибка и закрытие соединения
        let stream = UnixStream::connect(&socket).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let writer = tokio::spawn(async move {
            let oversized = vec![b'x'; MAX_REQUEST_BYTES + 4096];
            let _ = write_half.write_all(&oversized).await;
        });
        let mut lines = BufReader::new(read_half).lines();
        let reply: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(reply["ok"], false);
        assert_eq!(reply["error"]["code"], "request_too_large");
        assert!(lines.next_line().await.unwrap().is_none());

        let _ = writer.await;
        server.abort();
        let _ = server.await;
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_invalid_utf8_answered_and_connection_kept() {
        let (dir, server) = spawn_server("utf8").await;

        let stream = UnixStream::connect(dir.join("daemon.sock")).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        write_half.write_all(b"{\"method\":\"ping\xff\xfe\"}\n").await.unwrap();
        let reply: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(reply["ok"], false);
        assert_eq!(reply["error"]["code"], "invalid_json");

        write_half.write_all(b"{\"method\":\"ping\",\"id\":\"after\"}\n").await.unwrap();
        let reply: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(reply["ok"], true);
        assert_eq!(reply["id"], "after");

        server.abort();
        let _ = server.await;
        let _ = std::fs::remove_dir_all(&dir);
    }
}
