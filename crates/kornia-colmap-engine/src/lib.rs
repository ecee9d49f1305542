#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

mod engine;
pub use engine::*;

mod error;
pub use error::*;

// columnar indices over the binary model buffers
mod index;
