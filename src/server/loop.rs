// Server loop module
// Accepts connections until shutdown is requested

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Notify;

use super::connection::accept_connection;
use crate::config::AppState;
use crate::logger;

/// Upper bound on how long shutdown waits for open connections
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Run the accept loop on `listener`
///
/// Returns once `shutdown` is notified and in-flight connections have
/// finished or the drain timeout has passed.
pub async fn start_server_loop(
    listener: TcpListener,
    state: Arc<AppState>,
    active_connections: Arc<AtomicUsize>,
    shutdown: Arc<Notify>,
) {
    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => {
                        accept_connection(stream, peer_addr, &state, &active_connections);
                    }
                    Err(e) => {
                        logger::log_error(&format!("Failed to accept connection: {e}"));
                    }
                }
            }

            () = shutdown.notified() => {
                break;
            }
        }
    }

    drop(listener);
    drain_connections(&active_connections).await;
}

async fn drain_connections(active_connections: &AtomicUsize) {
    let deadline = tokio::time::Instant::now() + DRAIN_TIMEOUT;

    loop {
        let remaining = active_connections.load(Ordering::SeqCst);
        if remaining == 0 {
            logger::write_info("[SHUTDOWN] All connections closed");
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            logger::log_warning(&format!(
                "Shutdown drain timed out with {remaining} connection(s) still open"
            ));
            return;
        }
        tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::handler::static_files::{HOMEPAGE_SOURCE, HOMEPAGE_TEMPLATE};
    use crate::output::ViewResponder;
    use crate::server::create_reusable_listener;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_serves_range_then_shuts_down() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("data.bin");
        std::fs::write(&file, b"abcdefghij").unwrap();
        let config_path = dir.path().join("config.toml");
        std::fs::write(
            &config_path,
            format!(
                "[logging]\naccess_log = false\n\n[routes.files.\"/data\"]\ntype = \"file\"\npath = \"{}\"\n",
                file.display()
            ),
        )
        .unwrap();

        let cfg = Config::load_from(config_path.to_str().unwrap()).unwrap();
        let views = ViewResponder::from_templates([(HOMEPAGE_TEMPLATE, HOMEPAGE_SOURCE)]).unwrap();
        let state = Arc::new(AppState::new(&cfg, views));

        let listener = create_reusable_listener("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(Notify::new());

        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let server = tokio::task::spawn_local(start_server_loop(
                    listener,
                    state,
                    Arc::new(AtomicUsize::new(0)),
                    Arc::clone(&shutdown),
                ));

                let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
                stream
                    .write_all(
                        b"GET /data HTTP/1.1\r\nHost: test\r\nRange: bytes=2-4\r\nConnection: close\r\n\r\n",
                    )
                    .await
                    .unwrap();
                let mut raw = Vec::new();
                stream.read_to_end(&mut raw).await.unwrap();
                let text = String::from_utf8_lossy(&raw);

                assert!(text.starts_with("HTTP/1.1 206"));
                assert!(text.to_ascii_lowercase().contains("content-range: bytes 2-4/10"));
                assert!(text.ends_with("cde"));

                shutdown.notify_one();
                server.await.unwrap();
            })
            .await;
    }
}
