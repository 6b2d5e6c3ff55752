/*!
 * @file connection.rs
 * @brief Per-connection transport and the connection worker loop
 */

use crate::autoresponder::AutoresponderChain;
use crate::error::{MockError, Result};
use crate::inbox::Inbox;
use crate::request::Request;
use crate::wire::decode::decode_body;
use crate::wire::frame::{read_message, write_message};
use crate::wire::header::Header;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpStream, UnixStream};
use tokio::sync::Mutex as AsyncMutex;
use tokio_rustls::server::TlsStream;
use tracing::{debug, warn};

/// The concrete socket kind behind a connection, unified so the worker loop
/// doesn't need to care whether it is plaintext TCP, a Unix-domain socket, or
/// TLS-wrapped TCP.
pub enum Transport {
    Tcp(TcpStream),
    Unix(UnixStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for Transport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Transport::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            Transport::Unix(s) => Pin::new(s).poll_read(cx, buf),
            Transport::Tls(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Transport::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            Transport::Unix(s) => Pin::new(s).poll_write(cx, buf),
            Transport::Tls(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Transport::Tcp(s) => Pin::new(s).poll_flush(cx),
            Transport::Unix(s) => Pin::new(s).poll_flush(cx),
            Transport::Tls(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Transport::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            Transport::Unix(s) => Pin::new(s).poll_shutdown(cx),
            Transport::Tls(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

static CONNECTION_COUNTER: AtomicU64 = AtomicU64::new(1);

/// A handle to one accepted connection's write side, shared between the
/// worker loop (which owns the read side) and any `Request` produced from
/// that loop, which may outlive the read that produced it.
pub struct ConnectionHandle {
    pub id: u64,
    pub peer_addr: String,
    write_half: AsyncMutex<Option<tokio::io::WriteHalf<Transport>>>,
    closed: AtomicBool,
}

impl ConnectionHandle {
    fn new(peer_addr: String, write_half: tokio::io::WriteHalf<Transport>) -> Arc<Self> {
        Arc::new(Self {
            id: CONNECTION_COUNTER.fetch_add(1, Ordering::SeqCst),
            peer_addr,
            write_half: AsyncMutex::new(Some(write_half)),
            closed: AtomicBool::new(false),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub(crate) fn dead_for_test() -> Arc<Self> {
        Arc::new(Self {
            id: 0,
            peer_addr: "test".to_string(),
            write_half: AsyncMutex::new(None),
            closed: AtomicBool::new(true),
        })
    }

    /// Encodes and writes a complete reply message. Synchronous from the
    /// caller's point of view: blocks on the connection's write lock.
    pub async fn send(&self, header: &Header, body: &[u8]) -> Result<()> {
        let mut guard = self.write_half.lock().await;
        let Some(writer) = guard.as_mut() else {
            return Err(MockError::ReplyToDeadConnection);
        };
        write_message(writer, header, body).await
    }

    /// Closes the socket without sending anything further. The client
    /// observes this as a connection reset.
    pub async fn hangup(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let mut guard = self.write_half.lock().await;
        if let Some(mut writer) = guard.take() {
            use tokio::io::AsyncWriteExt;
            let _ = writer.shutdown().await;
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let mut guard = self.write_half.lock().await;
        guard.take();
    }
}

/// Runs the read loop for one accepted connection until the peer
/// disconnects or the server requests shutdown.
pub async fn run_connection(
    transport: Transport,
    peer_addr: String,
    autoresponders: Arc<AutoresponderChain>,
    inbox: Arc<Inbox>,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
    verbose: bool,
) {
    let (mut read_half, write_half) = tokio::io::split(transport);
    let connection = ConnectionHandle::new(peer_addr.clone(), write_half);

    loop {
        let raw = tokio::select! {
            raw = read_message(&mut read_half) => raw,
            _ = shutdown.recv() => {
                debug!(connection = connection.id, "shutting down connection worker");
                break;
            }
        };

        let raw = match raw {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(connection = connection.id, "peer disconnected");
                break;
            }
            Err(e) => {
                warn!(connection = connection.id, error = %e, "decode error, closing connection");
                break;
            }
        };

        let body = match decode_body(raw.header.op_code, &raw.body) {
            Ok(body) => body,
            Err(e) => {
                warn!(connection = connection.id, error = %e, "decode error, closing connection");
                break;
            }
        };

        let request = Request::new(raw.header.request_id, body, connection.clone());

        if verbose {
            logging_log_request(&request);
        }

        match autoresponders.try_respond(&request) {
            Some(reply_doc) => {
                if let Err(e) = request.reply(reply_doc).await {
                    warn!(connection = connection.id, error = %e, "autoresponse failed to send");
                    break;
                }
            }
            None => {
                inbox.push(request);
            }
        }
    }

    connection.close().await;
}

fn logging_log_request(request: &Request) {
    tracing::info!(
        op_code = ?request.op_code,
        namespace = ?request.namespace,
        documents = ?request.documents,
        "received request"
    );
}
