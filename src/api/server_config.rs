//! Server configuration constants

use std::time::Duration;

/// Default streaming port
pub const DEFAULT_PORT: u16 = 8765;

/// Concurrent session limit
pub const MAX_CONNECTIONS: usize = 100;

/// Interval between server pings
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);

/// Time allowed for a pong, and for any single outbound send
pub const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(10);

/// Largest inbound WebSocket message
pub const MAX_MESSAGE_SIZE: usize = 10_000_000;

/// Request body limit for plain HTTP routes
pub const MAX_BODY_SIZE: usize = 64 * 1024; // 64KB

/// Wait before the single bind retry when the port is in use
pub const BIND_RETRY_DELAY: Duration = Duration::from_secs(2);
