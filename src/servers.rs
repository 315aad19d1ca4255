//! Auxiliary HTTP servers that live for the duration of one build.
//!
//! Each server gets an unused local port and a dedicated thread running a
//! single-threaded runtime. Shutdown signals the server, waits for its thread
//! and releases the port; it also happens on drop.

use crate::{Config, Registry, ScreenshotError};
use axum::Router;
use std::collections::BTreeMap;
use std::net::TcpListener;
use std::path::Path;
use std::thread::JoinHandle;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

pub struct AuxServer {
    name: String,
    port: u16,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl AuxServer {
    pub fn start(name: &str, router: Router) -> Result<Self, ScreenshotError> {
        let listener = TcpListener::bind(("127.0.0.1", 0))?;
        listener.set_nonblocking(true)?;
        let port = listener.local_addr()?.port();

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<(), String>>();
        let server_name = name.to_string();

        let thread = std::thread::Builder::new()
            .name(format!("docshot-app-{name}"))
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };

                runtime.block_on(async move {
                    let listener = match tokio::net::TcpListener::from_std(listener) {
                        Ok(listener) => listener,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e.to_string()));
                            return;
                        }
                    };
                    let _ = ready_tx.send(Ok(()));

                    let served = axum::serve(listener, router)
                        .with_graceful_shutdown(async {
                            let _ = shutdown_rx.await;
                        })
                        .await;
                    if let Err(e) = served {
                        error!(app = %server_name, "Auxiliary server failed: {}", e);
                    }
                });
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(ScreenshotError::ServerError(format!("{name}: {e}")));
            }
            Err(_) => {
                let _ = thread.join();
                return Err(ScreenshotError::ServerError(format!(
                    "{name}: server thread exited before starting"
                )));
            }
        }

        info!(app = %name, port, "Started auxiliary server");
        Ok(Self {
            name: name.to_string(),
            port,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn url(&self) -> String {
        format!("http://localhost:{}", self.port)
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the server and join its thread. Idempotent.
    pub fn shutdown(&mut self) {
        if let Some(signal) = self.shutdown.take() {
            let _ = signal.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!(app = %self.name, "Auxiliary server thread panicked");
            } else {
                info!(app = %self.name, port = self.port, "Stopped auxiliary server");
            }
        }
    }
}

impl Drop for AuxServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// All auxiliary servers of one build.
#[derive(Default)]
pub struct ServerSet {
    servers: Vec<AuxServer>,
}

impl ServerSet {
    /// Start one server per configured app. Servers already started are
    /// stopped again if a later one fails.
    pub fn start(
        config: &Config,
        registry: &Registry,
        source_dir: &Path,
    ) -> Result<Self, ScreenshotError> {
        let mut set = Self::default();
        for (name, reference) in &config.apps {
            let factory = registry.app_factory(reference)?;
            let router = factory.router(source_dir)?;
            set.servers.push(AuxServer::start(name, router)?);
        }
        Ok(set)
    }

    /// `name` → base URL for every running server.
    pub fn substitutions(&self) -> BTreeMap<String, String> {
        self.servers
            .iter()
            .map(|server| (server.name().to_string(), server.url()))
            .collect()
    }

    pub fn servers(&self) -> &[AuxServer] {
        &self.servers
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn shutdown(&mut self) {
        for server in &mut self.servers {
            server.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpStream;

    fn hello(_: &Path) -> Result<Router, ScreenshotError> {
        Ok(Router::new().route("/", axum::routing::get(|| async { "hello" })))
    }

    #[tokio::test]
    async fn test_server_answers_then_releases_port() {
        let mut server = AuxServer::start("app", hello(Path::new(".")).unwrap()).unwrap();
        assert!(server.is_running());
        assert_eq!(server.url(), format!("http://localhost:{}", server.port()));

        let body = reqwest::get(format!("http://127.0.0.1:{}/", server.port()))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "hello");

        server.shutdown();
        assert!(!server.is_running());
        assert!(TcpStream::connect(("127.0.0.1", server.port())).is_err());

        server.shutdown();
    }

    #[test]
    fn test_server_set_publishes_substitutions() {
        let mut registry = Registry::default();
        registry.register_app("hello", hello);

        let mut config = Config::default();
        config.apps.insert("first".to_string(), "hello".to_string());
        config.apps.insert("second".to_string(), "hello".to_string());

        let mut set = ServerSet::start(&config, &registry, Path::new(".")).unwrap();
        let subs = set.substitutions();
        assert_eq!(set.len(), 2);
        assert!(subs["first"].starts_with("http://localhost:"));
        assert_ne!(subs["first"], subs["second"]);

        let ports: Vec<u16> = set.servers().iter().map(|s| s.port()).collect();
        set.shutdown();
        for port in ports {
            assert!(TcpStream::connect(("127.0.0.1", port)).is_err());
        }
    }

    #[test]
    fn test_unknown_app_fails_start() {
        let mut config = Config::default();
        config.apps.insert("x".to_string(), "missing".to_string());
        assert!(matches!(
            ServerSet::start(&config, &Registry::default(), Path::new(".")),
            Err(ScreenshotError::UnknownApp(_))
        ));
    }
}
