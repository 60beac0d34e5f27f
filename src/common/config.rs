use std::path::PathBuf;
use std::time::Duration;

/// Size of a cache frame in bytes (8 KB)
pub const FRAME_SIZE: usize = 8192;

/// Maximum size of a single request in bytes
pub const MAX_REQUEST_BYTES: usize = 8192;

/// Size of the fixed response-header buffer
pub const MAX_HEADER_BYTES: usize = 4096;

/// Default K value for LRU-K replacement policy
pub const DEFAULT_LRUK_K: usize = 2;

/// Default listening port
pub const DEFAULT_PORT: u16 = 8080;

/// Default cache memory budget (8 MB)
pub const DEFAULT_CACHE_BYTES: usize = 8 * 1024 * 1024;

/// Default number of cache frames
pub const DEFAULT_FRAME_COUNT: usize = DEFAULT_CACHE_BYTES / FRAME_SIZE;

/// Maximum connections accepted per readiness notification
pub const ACCEPT_BATCH: usize = 16;

/// Capacity of the readiness event buffer
pub const EVENT_CAPACITY: usize = 1024;

/// Listen backlog
pub const LISTEN_BACKLOG: i32 = 1024;

/// Send/receive buffer size on the listening socket (64 KB)
pub const SOCKET_BUFFER_BYTES: usize = 64 * 1024;

/// TCP keepalive: idle time before the first probe
pub const KEEPALIVE_IDLE: Duration = Duration::from_secs(60);

/// TCP keepalive: interval between probes
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);

/// TCP keepalive: probes before the peer is declared gone
pub const KEEPALIVE_RETRIES: u32 = 3;

/// Idle limit for a registered connection before the acceptor reaps it;
/// matches the advertised `Keep-Alive: timeout=5`
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(5);

/// How often the acceptor wakes to sweep idle connections
pub const IDLE_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Back-off sleep for half-written responses and spurious wakeups
pub const EAGAIN_BACKOFF: Duration = Duration::from_millis(1);

/// Server identifier sent in the `Server` response header
pub const SERVER_NAME: &str = "kiln/0.1";

/// Runtime configuration for a [`Server`](crate::server::Server).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listening port (0 picks an ephemeral port)
    pub port: u16,
    /// Number of worker threads
    pub workers: usize,
    /// Number of cache frames
    pub frame_count: usize,
    /// K value for the LRU-K replacer
    pub k: usize,
    /// Document root served to clients
    pub doc_root: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2);
        Self {
            port: DEFAULT_PORT,
            workers: cores * 2,
            frame_count: DEFAULT_FRAME_COUNT,
            k: DEFAULT_LRUK_K,
            doc_root: PathBuf::from("./www"),
        }
    }
}
