//! [`LightningBackend`] implementation for LND.

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::client::RestTransport;
use super::types::*;
use crate::config::{DEFAULT_POLL_INTERVAL_MS, LndConfig};
use crate::error::{Error, Result};
use crate::fee::{self, RouteFeeSource, RouteLowerBound, RoutingFeeEstimate};
use crate::ln::{LightningBackend, LnFuture};
use crate::transport::{StreamMethod, Transport, TransportFuture, release};
use crate::types::{DecodedInvoice, InvoiceParameters, PaymentParameters};
use crate::{payment, watcher};

const DECODE_INVOICE: &str = "v1/payreq";
const ADD_INVOICE: &str = "v1/invoices";
const ADD_HOLD_INVOICE: &str = "v2/invoices/hodl";
const SUBSCRIBE_INVOICE: &str = "v2/invoices/subscribe";
const CANCEL_INVOICE: &str = "v2/invoices/cancel";
const SETTLE_INVOICE: &str = "v2/invoices/settle";
const SEND_PAYMENT: &str = "v2/router/send";
const ESTIMATE_FEE: &str = "v2/router/route/estimatefee";
const BEST_BLOCK: &str = "v2/chainkit/bestblock";

/// LND node client.
///
/// Generic over the [`Transport`] so the lifecycle logic can run against
/// anything that speaks the LND REST API.
pub struct Lnd<T: Transport = RestTransport> {
    transport: T,
    poll_interval: Duration,
}

impl Lnd<RestTransport> {
    /// Create a client for the node described by `config`.
    pub fn from_config(config: &LndConfig) -> Result<Self> {
        let transport = RestTransport::new(config)?;
        Ok(Self::new(transport).with_poll_interval(config.poll_interval()))
    }
}

impl<T: Transport> Lnd<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }

    /// Set the delay between receives while an invoice or payment is pending.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    // Helper methods

    async fn get_json<R: DeserializeOwned>(&self, path: &str) -> Result<R> {
        let value = self.transport.get(path).await?;
        parse(path, value)
    }

    async fn post_json<R: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<R> {
        let value = self.transport.post(path, serde_json::to_value(body)?).await?;
        parse(path, value)
    }

    /// POST for calls that answer with an empty object on success.
    async fn post_empty<B: Serialize>(&self, path: &str, body: &B) -> Result<()> {
        let value = self.transport.post(path, serde_json::to_value(body)?).await?;
        match &value {
            Value::Object(map) if map.is_empty() => Ok(()),
            _ => Err(Error::UnhandledResponse {
                endpoint: path.to_string(),
                body: value.to_string(),
            }),
        }
    }
}

fn parse<R: DeserializeOwned>(path: &str, value: Value) -> Result<R> {
    <R as serde::Deserialize>::deserialize(&value).map_err(|e| {
        Error::Parse(format!(
            "Failed to parse {} response: {}. Body: {}",
            path, e, value
        ))
    })
}

impl<T: Transport> LightningBackend for Lnd<T> {
    fn decode_invoice<'a>(&'a self, invoice: &'a str) -> LnFuture<'a, DecodedInvoice> {
        Box::pin(async move {
            let path = format!("{}/{}", DECODE_INVOICE, invoice);
            self.get_json(&path).await
        })
    }

    fn add_invoice(&self, params: InvoiceParameters) -> LnFuture<'_, String> {
        Box::pin(async move {
            let path = if params.is_hold() {
                ADD_HOLD_INVOICE
            } else {
                ADD_INVOICE
            };

            match self.post_json::<AddInvoiceResponse, _>(path, &params).await {
                Ok(response) => Ok(response.payment_request),
                Err(Error::Api { message, .. }) if message == PAYMENT_HASH_EXISTS_MESSAGE => {
                    Err(Error::PaymentHashExists)
                }
                Err(e) => Err(e),
            }
        })
    }

    fn watch_invoice<'a>(&'a self, payment_hash: &'a [u8]) -> LnFuture<'a, u64> {
        Box::pin(async move {
            let path = format!("{}/{}", SUBSCRIBE_INVOICE, URL_SAFE.encode(payment_hash));
            let mut stream = self.transport.open_stream(&path, StreamMethod::Get).await?;

            let result = watcher::await_acceptance(&mut *stream, self.poll_interval).await;
            release(&mut *stream, SUBSCRIBE_INVOICE).await;

            match &result {
                Ok(amt_paid_msat) => log::info!(
                    "Invoice {} accepted with {} msat",
                    hex::encode(payment_hash),
                    amt_paid_msat
                ),
                Err(e) => log::info!(
                    "Stopped watching invoice {}: {}",
                    hex::encode(payment_hash),
                    e
                ),
            }
            result
        })
    }

    fn cancel_invoice<'a>(&'a self, payment_hash: &'a [u8]) -> LnFuture<'a, ()> {
        Box::pin(async move {
            self.post_empty(CANCEL_INVOICE, &CancelInvoiceRequest { payment_hash })
                .await
        })
    }

    fn pay_invoice(&self, params: PaymentParameters) -> LnFuture<'_, Vec<u8>> {
        Box::pin(async move {
            let mut stream = self
                .transport
                .open_stream(SEND_PAYMENT, StreamMethod::Post)
                .await?;

            let result = payment::execute(&mut *stream, &params, self.poll_interval).await;
            release(&mut *stream, SEND_PAYMENT).await;

            match &result {
                Ok(_) => log::info!("Payment succeeded"),
                Err(e) if e.is_payment_failed() => log::info!("{}", e),
                Err(e) => log::warn!("Payment needs reconciliation: {}", e),
            }
            result
        })
    }

    fn settle_invoice<'a>(&'a self, preimage: &'a [u8]) -> LnFuture<'a, ()> {
        Box::pin(async move {
            self.post_empty(SETTLE_INVOICE, &SettleInvoiceRequest { preimage })
                .await
        })
    }

    fn estimate_routing_fee<'a>(
        &'a self,
        invoice: &'a DecodedInvoice,
        amount_msat: u64,
    ) -> LnFuture<'a, RoutingFeeEstimate> {
        Box::pin(fee::estimate_routing_fee(self, invoice, amount_msat))
    }
}

impl<T: Transport> RouteFeeSource for Lnd<T> {
    fn block_height(&self) -> TransportFuture<'_, u64> {
        Box::pin(async move {
            let best: BestBlockResponse = self.get_json(BEST_BLOCK).await?;
            Ok(best.block_height)
        })
    }

    fn lower_bound<'a>(
        &'a self,
        destination: &'a str,
        amount_msat: u64,
    ) -> TransportFuture<'a, RouteLowerBound> {
        Box::pin(async move {
            let request = EstimateFeeRequest {
                dest: hex::decode(destination)?,
                amt_sat: amount_msat.div_ceil(1000),
            };
            let estimate: EstimateFeeResponse = self.post_json(ESTIMATE_FEE, &request).await?;

            Ok(RouteLowerBound {
                fee_msat: estimate.routing_fee_msat,
                time_lock: estimate.time_lock_delay,
            })
        })
    }
}
