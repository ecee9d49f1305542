#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Reconstruction builder choosing the decoding tier.
mod builder;
pub use builder::*;

/// Loading configuration.
mod config;
pub use config::*;

/// Error and warning types.
mod error;
pub use error::*;

/// Model file contents handed to the builder.
mod files;
pub use files::*;

/// The reconstruction aggregate.
mod reconstruction;
pub use reconstruction::*;

/// Model directory resolution.
mod resolver;
pub use resolver::*;

/// Session owning the live reconstruction.
mod session;
pub use session::*;

/// Statistics and covisibility indices.
mod stats;
pub use stats::*;
