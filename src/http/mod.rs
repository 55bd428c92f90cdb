//! HTTP CONNECT front door
//!
//! An alternative to SOCKS for applications that only speak HTTP proxies.
//! Only CONNECT tunneling is served; there is no forwarding of plain HTTP
//! requests.

mod connect;
mod request;

pub use connect::{send_status, ConnectRequest, HttpConnect, HttpStatus};
pub use request::{read_head, RequestHead, MAX_HEAD_LEN};
