/*!
 * @file server.rs
 * @brief Listener lifecycle: bind, accept, shut down
 */

use crate::autoresponder::{AutoresponderChain, ReplyAction, ResponderHandle};
use crate::config::{AutoIsMaster, ServerOptions};
use crate::connection::{run_connection, Transport};
use crate::error::{MockError, Result};
use crate::inbox::Inbox;
use crate::pattern::Pattern;
use crate::request::Request;
use bson::doc;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Listening,
    Running,
    Stopping,
    Stopped,
}

enum BoundListener {
    Tcp(TcpListener),
    Unix(UnixListener),
}

struct ServerInner {
    options: ServerOptions,
    tls: Option<Arc<rustls::ServerConfig>>,
    autoresponders: Arc<AutoresponderChain>,
    inbox: Arc<Inbox>,
    state: Mutex<ServerState>,
    address: Mutex<Option<String>>,
    shutdown_tx: broadcast::Sender<()>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    /// Live connection-worker handles, the §3 "set of live connection
    /// records" in join-able form. `stop()` drains and joins every one of
    /// them so it only returns once every worker has actually exited.
    connections: Mutex<Vec<JoinHandle<()>>>,
}

/// A programmable mock server for the MongoDB wire protocol.
///
/// Construct with [`ServerOptions`], call [`MockServer::run`] to start
/// listening, then drive the conversation with [`MockServer::receives`],
/// [`MockServer::autoresponds`], and the methods on each [`Request`].
pub struct MockServer {
    inner: Arc<ServerInner>,
}

impl MockServer {
    pub fn new(options: ServerOptions) -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);
        Self {
            inner: Arc::new(ServerInner {
                options,
                tls: None,
                autoresponders: Arc::new(AutoresponderChain::new()),
                inbox: Arc::new(Inbox::new()),
                state: Mutex::new(ServerState::Listening),
                address: Mutex::new(None),
                shutdown_tx,
                accept_task: Mutex::new(None),
                connections: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Wraps the listener in TLS using a caller-prepared server config.
    /// Must be called before `run()`.
    pub fn with_tls(mut self, config: Arc<rustls::ServerConfig>) -> Self {
        Arc::get_mut(&mut self.inner)
            .expect("with_tls must be called before the server is shared")
            .tls = Some(config);
        self
    }

    pub fn state(&self) -> ServerState {
        *self.inner.state.lock()
    }

    pub fn address(&self) -> Option<String> {
        self.inner.address.lock().clone()
    }

    pub fn uri(&self) -> Option<String> {
        self.address().map(|addr| format!("mongodb://{addr}"))
    }

    /// Binds the listener and starts accepting connections. Returns the
    /// bound address (`host:port` for TCP, the socket path for Unix).
    pub async fn run(&self) -> Result<String> {
        {
            let mut state = self.inner.state.lock();
            if *state != ServerState::Listening {
                return Err(MockError::BindFailure("server already running".to_string()));
            }
            *state = ServerState::Running;
        }

        self.register_auto_ismaster();

        let listener = self.bind().await?;
        let address = match &listener {
            BoundListener::Tcp(l) => l
                .local_addr()
                .map_err(|e| MockError::BindFailure(e.to_string()))?
                .to_string(),
            BoundListener::Unix(_) => self.inner.options.uds_path.clone().unwrap_or_default(),
        };
        *self.inner.address.lock() = Some(address.clone());

        let inner = self.inner.clone();
        let task = tokio::spawn(async move {
            accept_loop(inner, listener).await;
        });
        *self.inner.accept_task.lock() = Some(task);

        info!(address = %address, "mock server listening");
        Ok(address)
    }

    async fn bind(&self) -> Result<BoundListener> {
        if let Some(path) = &self.inner.options.uds_path {
            let _ = std::fs::remove_file(path);
            let listener =
                UnixListener::bind(path).map_err(|e| MockError::BindFailure(e.to_string()))?;
            return Ok(BoundListener::Unix(listener));
        }

        let bind_addr = format!(
            "{}:{}",
            self.inner.options.host,
            self.inner.options.port.unwrap_or(0)
        );
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| MockError::BindFailure(e.to_string()))?;
        Ok(BoundListener::Tcp(listener))
    }

    fn register_auto_ismaster(&self) {
        let doc = match &self.inner.options.auto_ismaster {
            AutoIsMaster::Disabled => return,
            AutoIsMaster::Enabled => doc! {
                "ok": 1,
                "ismaster": true,
                "minWireVersion": self.inner.options.min_wire_version,
                "maxWireVersion": self.inner.options.max_wire_version,
            },
            AutoIsMaster::Document(doc) => doc.clone(),
        };
        self.inner
            .autoresponders
            .autoresponds(Pattern::command_ci("ismaster"), doc.clone());
        self.inner
            .autoresponders
            .autoresponds(Pattern::command_ci("hello"), doc);
    }

    pub fn autoresponds(
        &self,
        pattern: Pattern,
        action: impl Into<ReplyAction>,
    ) -> ResponderHandle {
        self.inner.autoresponders.autoresponds(pattern, action)
    }

    pub fn append_responder(
        &self,
        pattern: Pattern,
        action: impl Into<ReplyAction>,
    ) -> ResponderHandle {
        self.inner.autoresponders.append_responder(pattern, action)
    }

    pub fn remove_responder(&self, handle: ResponderHandle) {
        self.inner.autoresponders.remove(handle);
    }

    /// Blocks the calling (test) thread until a request matching `pattern`
    /// arrives, or `timeout` elapses (default from
    /// [`ServerOptions::request_timeout_secs`]).
    pub async fn receives(
        &self,
        pattern: Option<Pattern>,
        timeout: Option<Duration>,
    ) -> Result<Request> {
        let timeout =
            timeout.unwrap_or(Duration::from_secs(self.inner.options.request_timeout_secs));
        self.inner.inbox.receive(pattern.as_ref(), timeout).await
    }

    /// Moves the server through `stopping` to `stopped`: closes the
    /// listener, disconnects every live connection, and drains the inbox.
    /// Idempotent.
    pub async fn stop(&self) {
        {
            let mut state = self.inner.state.lock();
            if *state == ServerState::Stopping || *state == ServerState::Stopped {
                return;
            }
            *state = ServerState::Stopping;
        }

        let _ = self.inner.shutdown_tx.send(());

        let task = self.inner.accept_task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }

        let connections: Vec<JoinHandle<()>> = std::mem::take(&mut *self.inner.connections.lock());
        for connection in connections {
            let _ = connection.await;
        }

        self.inner.inbox.close().await;

        *self.inner.state.lock() = ServerState::Stopped;
    }
}

async fn accept_loop(inner: Arc<ServerInner>, listener: BoundListener) {
    let mut shutdown = inner.shutdown_tx.subscribe();
    loop {
        let accepted = match &listener {
            BoundListener::Tcp(l) => tokio::select! {
                res = l.accept() => res.map(|(s, addr)| (Transport::Tcp(s), addr.to_string())),
                _ = shutdown.recv() => break,
            },
            BoundListener::Unix(l) => tokio::select! {
                res = l.accept() => res.map(|(s, addr)| (Transport::Unix(s), format!("{addr:?}"))),
                _ = shutdown.recv() => break,
            },
        };

        let (transport, peer_addr) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };

        let transport = match wrap_tls(&inner, transport).await {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "TLS handshake failed");
                continue;
            }
        };

        let autoresponders = inner.autoresponders.clone();
        let inbox = inner.inbox.clone();
        let verbose = inner.options.verbose;
        let worker_shutdown = inner.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            run_connection(
                transport,
                peer_addr,
                autoresponders,
                inbox,
                worker_shutdown,
                verbose,
            )
            .await;
        });
        inner.connections.lock().push(handle);
    }
}

async fn wrap_tls(inner: &Arc<ServerInner>, transport: Transport) -> Result<Transport> {
    match (&inner.tls, transport) {
        (Some(tls_config), Transport::Tcp(stream)) => {
            let acceptor = tokio_rustls::TlsAcceptor::from(tls_config.clone());
            let tls_stream = acceptor
                .accept(stream)
                .await
                .map_err(|e| MockError::Tls(e.to_string()))?;
            Ok(Transport::Tls(Box::new(tls_stream)))
        }
        (None, transport) => Ok(transport),
        (Some(_), transport) => Ok(transport),
    }
}
