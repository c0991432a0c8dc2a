//! The accept loop and per-connection association flow.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

use crate::manager::ContainerManager;
use crate::monitor::Monitor;
use crate::pool::ContainerPool;
use crate::proxy::{ProxySession, SocketControl};

use super::certificate::load_server_config;
use super::config::ListenerConfig;
use super::error::{ListenerError, ListenerResult};

/// The TLS listener: accepts clients and multiplexes each one onto an idle
/// pooled container.
pub struct ProxyListener<M> {
    config: ListenerConfig,
    pool: Arc<ContainerPool<M>>,
    monitor: Arc<dyn Monitor>,
}

impl<M: ContainerManager> ProxyListener<M> {
    /// Create a listener over the given pool.
    #[must_use]
    pub fn new(
        config: ListenerConfig,
        pool: Arc<ContainerPool<M>>,
        monitor: Arc<dyn Monitor>,
    ) -> Self {
        Self {
            config,
            pool,
            monitor,
        }
    }

    /// Bind and accept until a fatal accept error occurs.
    ///
    /// Each accepted connection runs on its own task; a failing connection
    /// never takes the listener down.
    ///
    /// # Errors
    ///
    /// Returns an error when binding fails, the TLS identity cannot be
    /// loaded, or accepting fails fatally.
    pub async fn run(&self) -> ListenerResult<()> {
        let tls_config = load_server_config(&self.config)?;
        let acceptor = TlsAcceptor::from(tls_config);

        let address = self.config.socket_addr();
        let listener =
            TcpListener::bind(address)
                .await
                .map_err(|source| ListenerError::BindError {
                    address,
                    source,
                })?;

        let bound = listener
            .local_addr()
            .map_err(|source| ListenerError::BindError { address, source })?;
        info!(address = %bound, "TLS listener bound");

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    if self.config.tcp_nodelay {
                        if let Err(error) = stream.set_nodelay(true) {
                            warn!(peer = %peer, %error, "failed to set nodelay");
                        }
                    }

                    let acceptor = acceptor.clone();
                    let pool = Arc::clone(&self.pool);
                    let monitor = Arc::clone(&self.monitor);
                    let handshake_timeout = self.config.handshake_timeout();

                    tokio::spawn(async move {
                        handle_client(stream, peer, acceptor, pool, monitor, handshake_timeout)
                            .await;
                    });
                }
                Err(error) => {
                    if is_fatal_accept_error(&error) {
                        error!(%error, "fatal accept error");
                        return Err(ListenerError::AcceptError(error));
                    }
                    warn!(%error, "transient accept error");
                }
            }
        }
    }
}

/// Drive one accepted connection through its full lifecycle.
async fn handle_client<M: ContainerManager>(
    stream: TcpStream,
    peer: SocketAddr,
    acceptor: TlsAcceptor,
    pool: Arc<ContainerPool<M>>,
    monitor: Arc<dyn Monitor>,
    handshake_timeout: Duration,
) {
    // The raw TCP socket is captured before the TLS wrapper hides it; the
    // session needs it for the half-close protocol.
    let client_ctl = SocketControl::new(&stream);

    let tls_stream = match timeout(handshake_timeout, acceptor.accept(stream)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(error)) => {
            warn!(peer = %peer, %error, "TLS handshake failed");
            return;
        }
        Err(_) => {
            warn!(peer = %peer, "TLS handshake timeout");
            return;
        }
    };

    let container = match pool.associate(peer).await {
        Ok(container) => container,
        Err(error) => {
            // Dropping the TLS stream closes the client socket; the pool has
            // already notified the monitor of the rejection.
            warn!(peer = %peer, %error, "cannot assign a container");
            return;
        }
    };

    let backend = match pool.connect_to_backend(&container).await {
        Ok(backend) => backend,
        Err(error) => {
            error!(
                peer = %peer,
                container_id = container.external_id(),
                %error,
                "backend dial failed"
            );
            drop(tls_stream);
            pool.dissociate(peer, &container).await;
            return;
        }
    };

    let session = ProxySession::new(peer, container.socket_addr(), monitor);
    let summary = session.run(tls_stream, client_ctl, backend).await;
    debug!(
        peer = %peer,
        container_id = container.external_id(),
        state = %summary.state,
        client_to_backend = summary.client_to_backend,
        backend_to_client = summary.backend_to_client,
        "proxy exchange finished"
    );

    pool.dissociate(peer, &container).await;
}

/// Whether an accept error is unrecoverable.
fn is_fatal_accept_error(error: &std::io::Error) -> bool {
    use std::io::ErrorKind;

    matches!(
        error.kind(),
        ErrorKind::InvalidInput | ErrorKind::InvalidData | ErrorKind::NotFound
    )
}
