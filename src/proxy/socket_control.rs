//! Socket-level control of a TCP connection that may be hidden behind a
//! TLS wrapper or split into I/O halves.

use std::net::Shutdown;
use std::os::fd::{AsRawFd, BorrowedFd, RawFd};
use std::time::Duration;

use socket2::SockRef;
use tokio::net::TcpStream;

/// Handle to the raw TCP socket beneath a (possibly TLS-wrapped, possibly
/// split) connection.
///
/// Captured before the stream is wrapped or split, this is what lets the
/// session reach the transport layer for the half-close protocol: shutting
/// down the read direction and arming `SO_LINGER 0` so the final close goes
/// out as an RST.
///
/// The handle does not own the descriptor. The session that creates it must
/// keep at least one half of the socket alive for as long as the handle is
/// used.
#[derive(Debug, Clone, Copy)]
pub struct SocketControl {
    fd: RawFd,
}

impl SocketControl {
    /// Capture the raw socket of `stream`.
    #[must_use]
    pub fn new(stream: &TcpStream) -> Self {
        Self {
            fd: stream.as_raw_fd(),
        }
    }

    /// Shut down the read direction of the socket.
    ///
    /// # Errors
    ///
    /// Returns the underlying socket error; callers treat a failure as "this
    /// socket cannot half-close" and fall back to a full close.
    pub fn shutdown_read(&self) -> std::io::Result<()> {
        // SAFETY: the owning session holds at least one I/O half of this
        // socket while the handle is in use, so the descriptor is open.
        let fd = unsafe { BorrowedFd::borrow_raw(self.fd) };
        SockRef::from(&fd).shutdown(Shutdown::Read)
    }

    /// Arm `SO_LINGER 0`: the eventual full close will send RST and discard
    /// any buffered inbound data.
    ///
    /// # Errors
    ///
    /// Returns the underlying socket error.
    pub fn set_linger_zero(&self) -> std::io::Result<()> {
        // SAFETY: as above; the descriptor outlives the handle's use.
        let fd = unsafe { BorrowedFd::borrow_raw(self.fd) };
        SockRef::from(&fd).set_linger(Some(Duration::ZERO))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_shutdown_read_unblocks_reader() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut client = TcpStream::connect(addr).await.unwrap();
        let (_server, _) = listener.accept().await.unwrap();

        let ctl = SocketControl::new(&client);
        ctl.shutdown_read().unwrap();

        // The local read side is gone: reads return EOF immediately even
        // though the peer never wrote anything.
        let mut buf = [0u8; 8];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_set_linger_zero_succeeds_on_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = TcpStream::connect(addr).await.unwrap();
        let (_server, _) = listener.accept().await.unwrap();

        let ctl = SocketControl::new(&client);
        ctl.set_linger_zero().unwrap();
    }
}
