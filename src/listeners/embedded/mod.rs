//! # Embedded listeners shipped with the engine.

#[cfg(feature = "logging")]
mod log;

#[cfg(feature = "logging")]
pub use log::LogListener;
