//! Transfer operations over a [`BlobClient`](crate::client::BlobClient).
//!
//! Each engine module speaks one blob protocol and is stateless per call.
//! The container registry is the only state shared between concurrent
//! workers.

pub mod append_blob;
pub mod blob;
pub mod block_blob;
pub mod container;
mod engine;
pub mod page_blob;

pub use blob::{
    check_if_single_blob, delete_blob, get_blob_properties, get_blob_range, list_all_blobs,
    list_blobs, set_blob_metadata, set_blob_properties,
};
pub use container::{ensure_container, ContainerRegistry};
pub use engine::*;
