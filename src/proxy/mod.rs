//! # Proxy Session
//!
//! Bidirectional byte shuttling between an accepted client connection and
//! its assigned backend container, including the TCP half-close protocol
//! that lets the slower direction drain before the sockets are torn down.

mod session;
mod socket_control;

pub use session::{ProxySession, SessionState, SessionSummary};
pub use socket_control::SocketControl;
