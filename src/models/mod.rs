//! Data models for chunked blob transfers.

mod account;
mod blob;
mod block;
mod entity;
mod mode;
mod page;
mod snapshot;

pub use account::*;
pub use blob::*;
pub use block::*;
pub use entity::*;
pub use mode::*;
pub use page::*;
pub use snapshot::*;
