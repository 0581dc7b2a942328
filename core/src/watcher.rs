//! Invoice watcher.
//!
//! Turns the node's invoice state notifications into a single result: the
//! amount paid once the invoice is accepted, or the reason it never will be.
//!
//! ```text
//! OPEN ──> ACCEPTED              Ok(amt_paid_msat)
//!   └────> SETTLED | CANCELED    Err(InvoiceResolvedBeforeAcceptance)
//! ```
//!
//! `SETTLED` is a failure here: callers wait for funds to be locked in,
//! settling is their own next step.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::error::{Error, Result};
use crate::transport::MessageStream;
use crate::types::{InvoiceState, string_u64};

const ENDPOINT: &str = "invoice subscription";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InvoiceUpdate {
    result: InvoiceUpdateResult,
    error: StreamError,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InvoiceUpdateResult {
    state: String,
    #[serde(with = "string_u64")]
    amt_paid_msat: u64,
}

/// Error object embedded in stream frames.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct StreamError {
    pub message: String,
}

/// Subscribe on `stream` and wait until the invoice leaves the `OPEN` state.
///
/// `poll_interval` is slept between `OPEN` notifications so keep-alive frames
/// do not spin the loop. The stream is left open, closing it is up to the
/// caller.
pub async fn await_acceptance(
    stream: &mut dyn MessageStream,
    poll_interval: Duration,
) -> Result<u64> {
    stream.send(json!({})).await?;

    loop {
        let Some(frame) = stream.receive().await? else {
            return Err(Error::StreamClosed);
        };
        log::debug!("{} frame: {}", ENDPOINT, frame);

        let update: InvoiceUpdate = serde_json::from_value(frame)?;
        if !update.error.message.is_empty() {
            return Err(Error::Backend {
                endpoint: ENDPOINT.to_string(),
                message: update.error.message,
            });
        }

        let amt_paid_msat = update.result.amt_paid_msat;
        match update.result.state.parse::<InvoiceState>()? {
            InvoiceState::Open => {
                log::trace!("Invoice still open, polling again in {:?}", poll_interval);
                tokio::time::sleep(poll_interval).await;
            }
            InvoiceState::Accepted => return Ok(amt_paid_msat),
            state @ (InvoiceState::Settled | InvoiceState::Canceled) => {
                return Err(Error::InvoiceResolvedBeforeAcceptance {
                    state,
                    amt_paid_msat,
                });
            }
        }
    }
}
