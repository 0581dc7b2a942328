//! LND backend.
//!
//! This module provides the LND implementation of
//! [`LightningBackend`](crate::LightningBackend) and the REST/websocket
//! transport it talks through.

mod backend;
mod client;
mod types;

pub use backend::Lnd;
pub use client::RestTransport;
pub use types::*;
