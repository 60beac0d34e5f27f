//! Kiln - a static-content HTTP/1.1 server with an LRU-K response cache
//!
//! This crate implements a single-host web server that answers GET requests
//! for files under a document root. Responses are cached in a fixed pool of
//! fixed-size frames governed by the LRU-K replacement policy, so hot paths
//! are served from memory and the filesystem is touched only on miss.
//!
//! # Architecture
//!
//! The system is organized into several layers:
//!
//! - **Cache** (`cache`): the in-memory response cache
//!   - `FramePool`/`Frame`: fixed byte-buffer slots allocated once at startup
//!   - `LruKReplacer`: LRU-K replacement policy over cached frames
//!   - `ResponseCache`: key table, free list and fill/evict coordination
//!   - `FrameView`: read guard over a frame's bytes for the duration of a hit
//!
//! - **HTTP** (`http`): wire handling
//!   - `RequestParser`: streaming byte-oriented request state machine
//!   - `build_response`/`error_response`: HTTP/1.1 response assembly
//!   - `mime_of`: extension-based content types
//!
//! - **Server** (`server`): concurrency and I/O
//!   - `Server`: acceptor owning the listening socket and readiness loop
//!   - `WorkerPool`: fixed thread pool consuming connection tasks
//!   - `Origin`: document-root resolution and file reads on miss
//!   - `ServerStats`: request/error/hit/miss counters
//!
//! # Example
//!
//! ```rust,no_run
//! use kiln::common::ServerConfig;
//! use kiln::server::Server;
//!
//! let config = ServerConfig {
//!     port: 8080,
//!     doc_root: "./www".into(),
//!     ..ServerConfig::default()
//! };
//!
//! let mut server = Server::bind(config).unwrap();
//! server.run().unwrap();
//! ```

pub mod cache;
pub mod common;
pub mod http;
pub mod server;

// Re-export commonly used types at the crate root
pub use common::{CacheKey, FrameId, Result, ServerConfig, ServerError};
pub use server::Server;
