//! WebSocket tunnel control protocol
//!
//! The remote gateway runs [`TunnelServer`] on every upgraded connection; the
//! local gateway uses [`TunnelConnector`] to open one tunnel per destination.

mod client;
mod server;

pub use client::{TunnelConnector, TunnelStream};
pub use server::TunnelServer;
