//! The statistics HTTP server.

use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::manager::ContainerManager;
use crate::pool::ContainerPool;

use super::config::StatsConfig;
use super::error::{StatsError, StatsResult};

/// HTTP server exposing the pool snapshot at `GET /monitor`.
pub struct StatsServer<M> {
    config: StatsConfig,
    pool: Arc<ContainerPool<M>>,
}

impl<M: ContainerManager> StatsServer<M> {
    /// Create a statistics server over the given pool.
    #[must_use]
    pub fn new(config: StatsConfig, pool: Arc<ContainerPool<M>>) -> Self {
        Self { config, pool }
    }

    /// Bind and serve until the task is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error when binding fails; per-connection failures are
    /// logged and ignored.
    pub async fn run(self) -> StatsResult<()> {
        let address = self.config.socket_addr();
        let listener =
            TcpListener::bind(address)
                .await
                .map_err(|source| StatsError::BindError { address, source })?;

        info!(address = %address, "statistics endpoint listening");

        loop {
            let (stream, remote) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(error) => {
                    warn!(%error, "statistics accept error");
                    continue;
                }
            };
            debug!(remote = %remote, "statistics connection");

            let pool = Arc::clone(&self.pool);
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |request| {
                    let pool = Arc::clone(&pool);
                    async move { handle_request(&request, &pool) }
                });

                if let Err(error) = http1::Builder::new().serve_connection(io, service).await {
                    debug!(%error, "statistics connection error");
                }
            });
        }
    }
}

/// Route a single request.
fn handle_request<M: ContainerManager>(
    request: &Request<Incoming>,
    pool: &ContainerPool<M>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    if request.method() == Method::GET && request.uri().path() == "/monitor" {
        let snapshot = pool.snapshot();
        match serde_json::to_vec(&snapshot) {
            Ok(body) => Ok(json_response(StatusCode::OK, body)),
            Err(error) => {
                error!(%error, "cannot encode pool snapshot");
                Ok(empty_response(StatusCode::INTERNAL_SERVER_ERROR))
            }
        }
    } else {
        Ok(empty_response(StatusCode::NOT_FOUND))
    }
}

fn json_response(status: StatusCode, body: Vec<u8>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| empty_response(StatusCode::INTERNAL_SERVER_ERROR))
}

fn empty_response(status: StatusCode) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::StaticBackendManager;
    use crate::monitor::NoopMonitor;
    use crate::pool::PoolSettings;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn endpoints(count: u16) -> Vec<SocketAddr> {
        (0..count)
            .map(|i| SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9200 + i))
            .collect()
    }

    async fn start_server() -> (SocketAddr, Arc<ContainerPool<StaticBackendManager>>) {
        let manager = Arc::new(StaticBackendManager::new(endpoints(4)));
        let settings = PoolSettings {
            initial_size: 2,
            maximum_size: 4,
            target_free_size: 2,
        };
        let pool =
            Arc::new(ContainerPool::new(manager, settings, Arc::new(NoopMonitor)).unwrap());
        pool.initialise().await;

        // Bind on an ephemeral port, then hand the config to the server.
        let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = probe.local_addr().unwrap();
        drop(probe);

        let config = StatsConfig {
            enabled: true,
            address: addr.ip(),
            port: addr.port(),
        };
        let server = StatsServer::new(config, Arc::clone(&pool));
        tokio::spawn(async move {
            let _ = server.run().await;
        });

        // Give the server a beat to bind.
        for _ in 0..50 {
            if TcpStream::connect(addr).await.is_ok() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        (addr, pool)
    }

    async fn http_get(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        String::from_utf8(response).unwrap()
    }

    #[tokio::test]
    async fn test_monitor_endpoint_serves_snapshot() {
        let (addr, _pool) = start_server().await;

        let response = http_get(addr, "/monitor").await;
        assert!(response.starts_with("HTTP/1.1 200"));

        let body = response.split("\r\n\r\n").nth(1).unwrap();
        let snapshot: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(snapshot["used"], 0);
        assert_eq!(snapshot["unused"], 2);
        assert_eq!(snapshot["containers"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_path_is_not_found() {
        let (addr, _pool) = start_server().await;

        let response = http_get(addr, "/nope").await;
        assert!(response.starts_with("HTTP/1.1 404"));
    }
}
