//! Click driver library: portable drivers for mikroBUS Click boards.
//!
//! Each driver wraps one peripheral IC behind the same small pattern: a
//! `Config` struct, `new`, `init` (identity check and power-up),
//! `default_cfg` (write the default configuration) and a handful of
//! register accessors. Drivers are generic over `embedded-hal` 1.0 and
//! `embedded-io` traits, so they run on any HAL and are testable on the
//! host with `cargo test`. The demo firmware (`src/main.rs`) is a thin
//! consumer that polls the boards and streams readings as NDJSON.
//!
//! The library is organized in two layers:
//! - **Plumbing**: `error`, `bus`, `comm`, `protocol`, `board`: shared
//!   framing, error type, wire messages and pin maps.
//! - **Drivers**: `drivers::*`: one module per Click board, each with its
//!   own register table.

#![cfg_attr(not(test), no_std)]

pub mod board;
pub mod bus;
pub mod comm;
pub mod drivers;
pub mod error;
pub mod protocol;

#[cfg(test)]
pub(crate) mod testing;

pub use error::Error;
