// src/api/mod.rs

pub mod broadcast;
pub mod handlers;
pub mod registry;
pub mod server;
pub mod server_config; // Server configuration constants
pub mod stream;
pub mod types;

pub use broadcast::{BroadcastHub, BroadcastReport};
pub use registry::{ClientConnection, ClientRegistry, ClientSession, ConnectionGate, Rejection};
pub use server::StreamServer;
pub use types::{StreamError, StreamMessage, TransactionPayload};
