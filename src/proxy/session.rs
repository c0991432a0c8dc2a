//! The per-connection proxy session: duplex copy plus half-close.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::monitor::Monitor;

use super::socket_control::SocketControl;

/// Buffer size for each copy direction.
const COPY_BUFFER_SIZE: usize = 16 * 1024;

/// Session lifecycle. Each copy-task completion is a single transition; the
/// session always terminates in [`SessionState::Closed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Both copy directions are live.
    Running,
    /// The client stopped sending first.
    ClientEofFirst,
    /// The backend stopped sending first.
    BackendEofFirst,
    /// Half-close executed; waiting for the remaining direction.
    Draining,
    /// Both directions done, sockets torn down.
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Running => write!(f, "running"),
            SessionState::ClientEofFirst => write!(f, "client-eof-first"),
            SessionState::BackendEofFirst => write!(f, "backend-eof-first"),
            SessionState::Draining => write!(f, "draining"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}

/// What a finished session looked like.
#[derive(Debug)]
pub struct SessionSummary {
    /// Terminal state (always [`SessionState::Closed`]).
    pub state: SessionState,
    /// Bytes shuttled from the client to the backend.
    pub client_to_backend: u64,
    /// Bytes shuttled from the backend to the client.
    pub backend_to_client: u64,
}

/// Result of one copy direction: the byte count plus the halves it owned,
/// handed back so the supervisor keeps both sockets open while it runs the
/// half-close.
struct CopyOutcome<R, W> {
    bytes: u64,
    _src: R,
    _dst: W,
}

/// One client⇄backend proxy exchange.
///
/// `run` blocks until both directions have finished and both sockets are
/// torn down; afterwards the container is ready to go back to the pool.
pub struct ProxySession {
    client_addr: SocketAddr,
    backend_addr: SocketAddr,
    monitor: Arc<dyn Monitor>,
}

impl ProxySession {
    /// Create a session for one accepted client and its assigned backend.
    #[must_use]
    pub fn new(
        client_addr: SocketAddr,
        backend_addr: SocketAddr,
        monitor: Arc<dyn Monitor>,
    ) -> Self {
        Self {
            client_addr,
            backend_addr,
            monitor,
        }
    }

    /// Shuttle bytes in both directions until each side has finished, with
    /// the half-close protocol in between.
    ///
    /// `client` is the accepted connection (TLS-wrapped in production, plain
    /// in tests); `client_ctl` must have been captured from the TCP socket
    /// beneath it before wrapping. `backend` is the freshly dialed backend
    /// circuit, owned by the session from here on.
    ///
    /// Copy errors are treated as EOF: they end the direction, never the
    /// process. Close errors are logged and ignored.
    pub async fn run<C>(
        self,
        client: C,
        client_ctl: SocketControl,
        backend: TcpStream,
    ) -> SessionSummary
    where
        C: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let backend_ctl = SocketControl::new(&backend);
        let (client_read, client_write) = tokio::io::split(client);
        let (backend_read, backend_write) = backend.into_split();

        let (c2b_tx, mut c2b_rx) = oneshot::channel();
        let (b2c_tx, mut b2c_rx) = oneshot::channel();

        let c2b_task = tokio::spawn(async move {
            let outcome = copy_until_eof(client_read, backend_write, "client->backend").await;
            let _ = c2b_tx.send(outcome);
        });
        let b2c_task = tokio::spawn(async move {
            let outcome = copy_until_eof(backend_read, client_write, "backend->client").await;
            let _ = b2c_tx.send(outcome);
        });

        let mut state = SessionState::Running;
        let mut c2b_done: Option<CopyOutcome<ReadHalf<C>, OwnedWriteHalf>> = None;
        let mut b2c_done: Option<CopyOutcome<OwnedReadHalf, WriteHalf<C>>> = None;

        tokio::select! {
            first = &mut c2b_rx => {
                // The client stopped sending. The backend may still have
                // bytes in flight for the client: stop reading the client
                // socket and arm linger-0 so the eventual close sends RST,
                // then let the other direction drain.
                state = SessionState::ClientEofFirst;
                debug!(client = %self.client_addr, state = %state, "client finished sending");
                if let Err(error) = client_ctl
                    .shutdown_read()
                    .and_then(|()| client_ctl.set_linger_zero())
                {
                    warn!(
                        client = %self.client_addr,
                        %error,
                        "client socket does not support half-close; it will be closed fully"
                    );
                }
                c2b_done = first.ok();
                state = SessionState::Draining;
                b2c_done = (&mut b2c_rx).await.ok();
            }
            first = &mut b2c_rx => {
                // The backend stopped sending. The backend is ours, so a
                // clean read shutdown is enough; no linger games.
                state = SessionState::BackendEofFirst;
                debug!(backend = %self.backend_addr, state = %state, "backend finished sending");
                if let Err(error) = backend_ctl.shutdown_read() {
                    warn!(
                        backend = %self.backend_addr,
                        %error,
                        "backend socket does not support half-close; it will be closed fully"
                    );
                }
                b2c_done = first.ok();
                state = SessionState::Draining;
                c2b_done = (&mut c2b_rx).await.ok();
            }
        }

        // Both directions have signalled; reap the tasks.
        let _ = tokio::join!(c2b_task, b2c_task);

        let client_to_backend = c2b_done.as_ref().map_or(0, |outcome| outcome.bytes);
        let backend_to_client = b2c_done.as_ref().map_or(0, |outcome| outcome.bytes);

        self.monitor.bytes_copied(
            false,
            client_to_backend,
            self.backend_addr,
            self.client_addr,
        );
        self.monitor.bytes_copied(
            true,
            backend_to_client,
            self.client_addr,
            self.backend_addr,
        );

        // Dropping the halves closes both sockets. With linger-0 armed the
        // client close goes out as RST, discarding buffered inbound data.
        drop(c2b_done);
        drop(b2c_done);
        state = SessionState::Closed;

        debug!(
            client = %self.client_addr,
            backend = %self.backend_addr,
            state = %state,
            client_to_backend,
            backend_to_client,
            "session closed"
        );

        SessionSummary {
            state,
            client_to_backend,
            backend_to_client,
        }
    }
}

/// Copy `src` into `dst` until EOF or error, then pass the EOF on by
/// shutting down the write side of `dst`. Errors end the direction and are
/// logged, nothing more.
async fn copy_until_eof<R, W>(mut src: R, mut dst: W, direction: &'static str) -> CopyOutcome<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    let mut bytes = 0u64;
    loop {
        match src.read(&mut buffer).await {
            Ok(0) => break,
            Ok(n) => {
                if let Err(error) = dst.write_all(&buffer[..n]).await {
                    warn!(direction, %error, "copy ended by write error");
                    break;
                }
                bytes += n as u64;
            }
            Err(error) => {
                warn!(direction, %error, "copy ended by read error");
                break;
            }
        }
    }

    if let Err(error) = dst.shutdown().await {
        debug!(direction, %error, "write shutdown after copy failed");
    }

    CopyOutcome {
        bytes,
        _src: src,
        _dst: dst,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::NoopMonitor;
    use tokio::net::TcpListener;

    /// A connected loopback TCP pair.
    async fn tcp_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connect = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });
        let (accepted, _) = listener.accept().await.unwrap();
        (connect.await.unwrap(), accepted)
    }

    fn session(client: &TcpStream, backend: &TcpStream) -> ProxySession {
        ProxySession::new(
            client.peer_addr().unwrap(),
            backend.peer_addr().unwrap(),
            Arc::new(NoopMonitor),
        )
    }

    #[tokio::test]
    async fn test_client_closes_first_late_backend_bytes_delivered() {
        let (mut test_client, session_client_end) = tcp_pair().await;
        let (session_backend_end, mut test_backend) = tcp_pair().await;

        let ctl = SocketControl::new(&session_client_end);
        let run = tokio::spawn(
            session(&session_client_end, &session_backend_end).run(
                session_client_end,
                ctl,
                session_backend_end,
            ),
        );

        let request = vec![0x41u8; 4096];
        let response = vec![0x42u8; 64 * 1024];

        // Client sends its request and half-closes.
        test_client.write_all(&request).await.unwrap();
        test_client.shutdown().await.unwrap();

        // Backend drains the request and keeps talking after the client's
        // half-close.
        let mut received = vec![0u8; request.len()];
        test_backend.read_exact(&mut received).await.unwrap();
        assert_eq!(received, request);
        test_backend.write_all(&response).await.unwrap();

        // Every late backend byte must still reach the client.
        let mut delivered = vec![0u8; response.len()];
        test_client.read_exact(&mut delivered).await.unwrap();
        assert_eq!(delivered, response);

        // Only now does the backend close, ending the session.
        drop(test_backend);

        // After the payload the session tears the socket down; EOF or a
        // reset are both acceptable here, truncation above is not.
        let mut rest = [0u8; 16];
        let _ = test_client.read(&mut rest).await;

        let summary = run.await.unwrap();
        assert_eq!(summary.state, SessionState::Closed);
        assert_eq!(summary.client_to_backend, request.len() as u64);
        assert_eq!(summary.backend_to_client, response.len() as u64);
    }

    #[tokio::test]
    async fn test_backend_closes_first_client_bytes_flushed() {
        let (mut test_client, session_client_end) = tcp_pair().await;
        let (session_backend_end, mut test_backend) = tcp_pair().await;

        let ctl = SocketControl::new(&session_client_end);
        let run = tokio::spawn(
            session(&session_client_end, &session_backend_end).run(
                session_client_end,
                ctl,
                session_backend_end,
            ),
        );

        // Backend half-closes immediately without sending anything.
        test_backend.shutdown().await.unwrap();

        // The client sees EOF for the backend direction.
        let mut buf = [0u8; 16];
        let n = test_client.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);

        // In-flight client bytes must still be flushed through to the
        // backend.
        let payload = vec![0x5au8; 8192];
        test_client.write_all(&payload).await.unwrap();
        test_client.shutdown().await.unwrap();

        let mut received = vec![0u8; payload.len()];
        test_backend.read_exact(&mut received).await.unwrap();
        assert_eq!(received, payload);

        let summary = run.await.unwrap();
        assert_eq!(summary.state, SessionState::Closed);
        assert_eq!(summary.client_to_backend, payload.len() as u64);
        assert_eq!(summary.backend_to_client, 0);
    }

    #[tokio::test]
    async fn test_bidirectional_echo_traffic() {
        let (mut test_client, session_client_end) = tcp_pair().await;
        let (session_backend_end, mut test_backend) = tcp_pair().await;

        let ctl = SocketControl::new(&session_client_end);
        let run = tokio::spawn(
            session(&session_client_end, &session_backend_end).run(
                session_client_end,
                ctl,
                session_backend_end,
            ),
        );

        // The backend echoes whatever arrives.
        let echo = tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            loop {
                let n = test_backend.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                test_backend.write_all(&buf[..n]).await.unwrap();
            }
            test_backend.shutdown().await.unwrap();
            // Hold the socket until the peer is done reading.
            let _ = test_backend.read(&mut buf).await;
        });

        for round in 0..10u8 {
            let message = vec![round; 512];
            test_client.write_all(&message).await.unwrap();
            let mut reply = vec![0u8; message.len()];
            test_client.read_exact(&mut reply).await.unwrap();
            assert_eq!(reply, message);
        }
        test_client.shutdown().await.unwrap();

        let summary = run.await.unwrap();
        echo.await.unwrap();
        assert_eq!(summary.state, SessionState::Closed);
        assert_eq!(summary.client_to_backend, 10 * 512);
        assert_eq!(summary.backend_to_client, 10 * 512);
    }
}
