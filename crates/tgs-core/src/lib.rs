//! Core of the Telegram story fetcher.
//!
//! Framework-agnostic: MTProto, HTTP and the file host live behind ports
//! (traits) implemented in adapter crates.

pub mod acquire;
pub mod config;
pub mod domain;
pub mod errors;
pub mod fetcher;
pub mod locator;
pub mod logging;
pub mod media;
pub mod parser;
pub mod ports;
pub mod resolver;
pub mod response;
pub mod session;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use errors::{Error, Result};
