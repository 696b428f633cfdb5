//! Federation monitor service
//!
//! Logs in to a Matrix homeserver, sweeps every joined room for the
//! reachability of its members' servers and serves the resulting tree.
//!
//! # Components
//!
//! - **Matrix**: client-server API client implementing `federation::ChatClient`
//! - **Server**: startup wiring and task supervision
//! - **HTTP**: `/tree` JSON, the tree page and `/metrics`

pub mod config;
pub mod http_server;
pub mod matrix;
pub mod server;

pub use config::{Config, ConfigError};
pub use http_server::TreeServer;
pub use matrix::{MatrixClient, parse_user_id};
pub use server::MonitorServer;
