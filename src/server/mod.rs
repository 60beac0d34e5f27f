mod acceptor;
mod conn;
mod origin;
mod stats;
mod worker_pool;

pub use acceptor::*;
pub use origin::*;
pub use stats::*;
pub use worker_pool::*;
