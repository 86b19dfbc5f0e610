use axum::{routing::get, Router};
use std::{
    io, mem,
    net::SocketAddr,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use tower_http::trace::TraceLayer;

use crate::{error::ListenerError, handlers, store::MappingStore};

/// How long in-flight requests may run after `stop` before they are aborted.
const STOP_GRACE: Duration = Duration::from_secs(2);

/// Observable lifecycle of the redirect listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerStatus {
    Stopped,
    Starting,
    Listening(SocketAddr),
}

enum State {
    Stopped,
    Starting,
    Listening(Running),
}

struct Running {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<io::Result<()>>,
}

/// Route tree served by the listener. Read-only against the store.
pub fn router(store: Arc<MappingStore>) -> Router {
    Router::new()
        .route("/", get(handlers::pages::landing))
        .route("/:code", get(handlers::redirect::redirect))
        .fallback(handlers::pages::fallback)
        .with_state(store)
        .layer(TraceLayer::new_for_http())
}

/// Embedded HTTP server answering short-code redirects.
///
/// `start` and `stop` are serialized, and `stop` only returns once the
/// listening socket has been released.
pub struct RedirectListener {
    store: Arc<MappingStore>,
    host: String,
    state: Mutex<State>,
    transition: tokio::sync::Mutex<()>,
}

impl RedirectListener {
    pub fn new(store: Arc<MappingStore>, host: impl Into<String>) -> Self {
        Self {
            store,
            host: host.into(),
            state: Mutex::new(State::Stopped),
            transition: tokio::sync::Mutex::new(()),
        }
    }

    pub fn status(&self) -> ListenerStatus {
        match &*self.state() {
            State::Stopped => ListenerStatus::Stopped,
            State::Starting => ListenerStatus::Starting,
            State::Listening(running) => ListenerStatus::Listening(running.addr),
        }
    }

    /// Bind `port` and begin serving, stopping any previous server first.
    ///
    /// If the port is taken the listener binds an OS-assigned port instead;
    /// the returned address carries the port actually in use.
    pub async fn start(&self, port: u16) -> Result<SocketAddr, ListenerError> {
        let _transition = self.transition.lock().await;
        self.shutdown_running().await;

        *self.state() = State::Starting;
        let listener = match self.bind(port).await {
            Ok(listener) => listener,
            Err(e) => {
                *self.state() = State::Stopped;
                return Err(e);
            }
        };

        let addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(source) => {
                *self.state() = State::Stopped;
                return Err(ListenerError::Bind {
                    addr: format!("{}:{}", self.host, port),
                    source,
                });
            }
        };

        let app = router(Arc::clone(&self.store));
        let (shutdown, signal) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async {
                    let _ = signal.await;
                })
                .await
        });

        *self.state() = State::Listening(Running {
            addr,
            shutdown,
            task,
        });
        tracing::info!("Redirect listener on http://{}", addr);
        Ok(addr)
    }

    /// Stop serving and release the socket. No-op when already stopped.
    pub async fn stop(&self) {
        let _transition = self.transition.lock().await;
        self.shutdown_running().await;
    }

    async fn bind(&self, port: u16) -> Result<TcpListener, ListenerError> {
        match TcpListener::bind((self.host.as_str(), port)).await {
            Ok(listener) => Ok(listener),
            Err(e)
                if port != 0
                    && matches!(
                        e.kind(),
                        io::ErrorKind::AddrInUse | io::ErrorKind::PermissionDenied
                    ) =>
            {
                tracing::warn!(
                    "Port {} unavailable ({}), falling back to an ephemeral port",
                    port,
                    e
                );
                TcpListener::bind((self.host.as_str(), 0))
                    .await
                    .map_err(|source| ListenerError::Bind {
                        addr: format!("{}:0", self.host),
                        source,
                    })
            }
            Err(source) => Err(ListenerError::Bind {
                addr: format!("{}:{}", self.host, port),
                source,
            }),
        }
    }

    async fn shutdown_running(&self) {
        let previous = mem::replace(&mut *self.state(), State::Stopped);
        let State::Listening(running) = previous else {
            return;
        };

        let Running {
            addr,
            shutdown,
            mut task,
        } = running;
        let _ = shutdown.send(());

        match tokio::time::timeout(STOP_GRACE, &mut task).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => {
                tracing::warn!("Redirect listener on {} exited with error: {}", addr, e)
            }
            Ok(Err(e)) => tracing::warn!("Redirect listener task on {} failed: {}", addr, e),
            Err(_) => {
                tracing::warn!(
                    "Redirect listener on {} did not drain within {:?}, aborting",
                    addr,
                    STOP_GRACE
                );
                task.abort();
                let _ = task.await;
            }
        }

        tracing::info!("Redirect listener on {} stopped", addr);
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
