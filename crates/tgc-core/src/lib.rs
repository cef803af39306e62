//! Core domain + application logic for the Telegram channel cloner.
//!
//! This crate is intentionally framework-agnostic. The MTProto session gateway and
//! the HTTP control surface live in adapter crates; the core only sees the
//! `ChannelTransport` / `TransportProvider` ports.

pub mod config;
pub mod domain;
pub mod errors;
pub mod job;
pub mod logging;
pub mod pipeline;
pub mod registry;
pub mod transport;
pub mod utils;

pub use errors::{Error, Result, TransportError};
