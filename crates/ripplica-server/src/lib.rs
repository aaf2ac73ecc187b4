//! HTTP and WebSocket transport for the ripplica query pipeline
//!
//! JSON endpoints for the full pipeline and each of its stages, plus a
//! per-session progress socket that `POST /query/stream/:ws_id` reports to.

pub mod handlers;
pub mod protocol;
pub mod server;
pub mod ws;

pub use protocol::ErrorBody;
pub use server::{router, start, AppState};
