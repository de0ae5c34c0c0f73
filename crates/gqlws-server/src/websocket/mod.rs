//! Socket-backed graphql-ws connections.
//!
//! - [`connection`]: [`WsConnection`], the per-socket state and send queue
//! - [`dispatch`]: decodes client frames and drives the hooks
//! - [`session`]: reader and writer tasks for one upgraded socket

pub mod connection;
pub mod dispatch;
pub mod session;

pub use connection::WsConnection;
pub use dispatch::Dispatcher;
pub use session::run_connection;
