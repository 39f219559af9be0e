//! Hookrelay service.
//!
//! Loads configuration, selects the backing store and runs the webhook
//! manager from `hookrelay-delivery` until the process is told to stop.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;

pub use config::{Config, StoreBackend};
