//! Lightning node client - Core Library
//!
//! Drives the lifecycle of Lightning invoices and payments against a node
//! backend without tying the caller to that node's wire format.
//!
//! The [`LightningBackend`] trait is the only thing callers depend on. It covers
//! invoice creation, watching, settlement and cancellation, outbound payments
//! and routing fee estimation. [`Lnd`] implements it over the LND REST API.
//!
//! # Example
//!
//! ```rust,ignore
//! use lnc_core::{LightningBackend, Lnd, LndConfig, PaymentParameters};
//!
//! let config = LndConfig::from_files("https://127.0.0.1:8080", "admin.macaroon", Some("tls.cert".as_ref()))?;
//! let ln = Lnd::from_config(&config)?;
//!
//! let invoice = ln.decode_invoice(bolt11).await?;
//! let estimate = ln.estimate_routing_fee(&invoice, 0).await?;
//!
//! match ln.pay_invoice(params).await {
//!     Ok(preimage) => { /* paid */ }
//!     Err(e) if e.is_payment_failed() => { /* safe to retry */ }
//!     Err(e) => { /* outcome unknown, reconcile before retrying */ }
//! }
//! ```

pub mod config;
pub mod error;
pub mod fee;
pub mod ln;
pub mod lnd;
pub mod payment;
pub mod transport;
pub mod types;
pub mod watcher;

pub use config::LndConfig;
pub use error::{Error, Result};
pub use fee::{RouteFeeSource, RouteLowerBound, RoutingFeeEstimate};
pub use ln::{LightningBackend, LnFuture, pay_invoice_within, watch_invoice_within};
pub use lnd::{Lnd, RestTransport};
pub use transport::{MessageStream, StreamMethod, Transport, TransportFuture};
pub use types::{
    DecodedInvoice, Feature, HoldSecret, HopHint, InvoiceParameters, InvoiceState,
    PaymentParameters, PaymentStatus, RouteHint,
};
