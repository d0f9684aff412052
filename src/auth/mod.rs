//! Request signing and SAS generation for Azure Storage.

mod sas;
mod shared_key;

pub use sas::*;
pub use shared_key::*;
