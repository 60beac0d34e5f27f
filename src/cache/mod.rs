mod frame;
mod frame_view;
mod lru_k_replacer;
mod response_cache;

pub use frame::*;
pub use frame_view::*;
pub use lru_k_replacer::*;
pub use response_cache::*;
