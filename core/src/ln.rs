//! The backend-agnostic Lightning interface.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::fee::RoutingFeeEstimate;
use crate::transport::TransportFuture;
use crate::types::{DecodedInvoice, InvoiceParameters, PaymentParameters};

/// Type alias for futures returned by [`LightningBackend`].
pub type LnFuture<'a, T> = TransportFuture<'a, T>;

/// Invoice and payment lifecycle operations against a Lightning node.
///
/// Callers depend on this trait only, so any node implementation can be
/// swapped in. [`Lnd`](crate::lnd::Lnd) is the implementation shipped here.
///
/// None of the operations retry. Blocking operations have no deadline of
/// their own, see [`watch_invoice_within`] and [`pay_invoice_within`].
pub trait LightningBackend: Send + Sync {
    /// Decode an encoded payment request.
    fn decode_invoice<'a>(&'a self, invoice: &'a str) -> LnFuture<'a, DecodedInvoice>;

    /// Create an invoice and return its encoded payment request.
    ///
    /// Fails with [`Error::PaymentHashExists`] if the node already has an
    /// invoice for `params.hash`.
    fn add_invoice(&self, params: InvoiceParameters) -> LnFuture<'_, String>;

    /// Wait until the invoice with `payment_hash` is accepted and return the
    /// amount paid.
    fn watch_invoice<'a>(&'a self, payment_hash: &'a [u8]) -> LnFuture<'a, u64>;

    fn cancel_invoice<'a>(&'a self, payment_hash: &'a [u8]) -> LnFuture<'a, ()>;

    /// Pay an invoice and return the payment preimage.
    ///
    /// If the result is `Err(Error::PaymentFailed { .. })` the payment
    /// failed, any other error leaves the payment status unknown.
    fn pay_invoice(&self, params: PaymentParameters) -> LnFuture<'_, Vec<u8>>;

    /// Settle a hold invoice by revealing its preimage.
    fn settle_invoice<'a>(&'a self, preimage: &'a [u8]) -> LnFuture<'a, ()>;

    /// Lower-bound routing fee and CLTV delta to pay the invoice.
    fn estimate_routing_fee<'a>(
        &'a self,
        invoice: &'a DecodedInvoice,
        amount_msat: u64,
    ) -> LnFuture<'a, RoutingFeeEstimate>;
}

/// [`LightningBackend::watch_invoice`] with a deadline.
///
/// On expiry the subscription is dropped, which tears down its stream, and
/// [`Error::Timeout`] is returned.
pub async fn watch_invoice_within<L>(ln: &L, payment_hash: &[u8], timeout: Duration) -> Result<u64>
where
    L: LightningBackend + ?Sized,
{
    tokio::time::timeout(timeout, ln.watch_invoice(payment_hash))
        .await
        .map_err(|_| Error::Timeout(timeout))?
}

/// [`LightningBackend::pay_invoice`] with a deadline.
///
/// The attempt may still complete on the node after we stop listening, so
/// expiry is reported as [`Error::PaymentOutcomeUnknown`], never as a failed
/// payment.
pub async fn pay_invoice_within<L>(
    ln: &L,
    params: PaymentParameters,
    timeout: Duration,
) -> Result<Vec<u8>>
where
    L: LightningBackend + ?Sized,
{
    tokio::time::timeout(timeout, ln.pay_invoice(params))
        .await
        .map_err(|_| {
            log::warn!("No terminal payment status within {:?}", timeout);
            Error::PaymentOutcomeUnknown(format!("no terminal status within {:?}", timeout))
        })?
}
