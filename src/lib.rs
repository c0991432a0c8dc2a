//! # Poolgate
//!
//! A TLS-terminating TCP reverse proxy that multiplexes inbound client
//! connections onto a dynamically managed pool of backend containers.
//!
//! ## How it works
//!
//! The [`listener`] accepts a TLS connection and asks the [`pool`] for an
//! idle container. The pool binds the client to the container, dials the
//! backend, and the [`proxy`] session shuttles bytes in both directions
//! until one side closes, finishing with a TCP half-close so the slower
//! direction can drain. On completion the container returns to the idle
//! set. The pool scales opportunistically: up when free capacity drops
//! below the configured target, down when idle containers are oversupplied.
//!
//! Containers are provisioned and destroyed through the [`manager`]
//! capability; connection and occupancy events flow to a best-effort
//! [`monitor`] sink; the [`stats`] endpoint serves a consistent JSON view
//! of the pool.

pub mod config;
pub mod listener;
pub mod manager;
pub mod monitor;
pub mod pool;
pub mod proxy;
pub mod stats;
