//! Streaming search
//!
//! Clients connect with a query and an optional filter and receive a single
//! deduplicated stream: the ranked bulk results from the document index
//! followed by live results as workers index new documents.
//!
//! - [`session`] - per-connection merge of bulk and live results
//! - [`filter`] - per-session exact-match result filter
//! - [`messages`] - wire format
//! - [`manager`] - registry of active sessions
//! - [`server`] / [`api`] - axum server, WebSocket endpoint and HTTP API

pub mod api;
pub mod filter;
pub mod manager;
pub mod messages;
pub mod server;
pub mod session;

pub use self::filter::{FilterFields, ResultFilter};
pub use self::manager::{SessionInfo, SessionManager};
pub use self::messages::{ClientMessage, ResultSource, ServerMessage, StreamResult};
pub use self::server::{AppState, StreamServer};
pub use self::session::{
    ClientChannel, ClientFrame, MpscClient, MpscClientHandle, SearchSession, SessionState,
    SessionSummary,
};
