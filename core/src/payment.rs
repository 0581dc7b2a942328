//! Payment executor.
//!
//! Sends one payment attempt on a stream and waits for a terminal status.
//! There are three outcomes and callers must keep them apart:
//!
//! - `Ok(preimage)`: the payment succeeded
//! - `Err(Error::PaymentFailed)`: the node gave up, nothing was paid
//! - any other error: the outcome is unknown, retrying may pay twice

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::transport::MessageStream;
use crate::types::{PaymentParameters, PaymentStatus};
use crate::watcher::StreamError;

const ENDPOINT: &str = "payment stream";

/// Weight of speed over cost when the node picks routes (1.0 = fastest).
pub const PAYMENT_TIME_PREFERENCE: f64 = 0.9;

/// Payment parameters plus the execution flags the executor always sets.
#[derive(Debug, Serialize)]
struct SendPaymentRequest<'a> {
    #[serde(flatten)]
    params: &'a PaymentParameters,
    no_inflight_updates: bool,
    amp: bool,
    time_pref: f64,
}

impl<'a> From<&'a PaymentParameters> for SendPaymentRequest<'a> {
    fn from(params: &'a PaymentParameters) -> Self {
        Self {
            params,
            no_inflight_updates: true,
            amp: false,
            time_pref: PAYMENT_TIME_PREFERENCE,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PaymentUpdate {
    result: PaymentUpdateResult,
    error: StreamError,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PaymentUpdateResult {
    status: String,
    payment_preimage: String,
    failure_reason: String,
}

/// Send `params` on `stream` and wait for the payment to resolve.
///
/// Returns the payment preimage on success. Once the request is sent, a
/// stream that closes or breaks before a terminal status is reported as
/// [`Error::PaymentOutcomeUnknown`], as is a frame that does not decode. The
/// stream is left open.
pub async fn execute(
    stream: &mut dyn MessageStream,
    params: &PaymentParameters,
    poll_interval: Duration,
) -> Result<Vec<u8>> {
    let request = serde_json::to_value(SendPaymentRequest::from(params))?;
    stream.send(request).await?;

    loop {
        let frame = match stream.receive().await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                return Err(Error::PaymentOutcomeUnknown(
                    "stream closed before a terminal status".to_string(),
                ));
            }
            Err(e) => {
                return Err(Error::PaymentOutcomeUnknown(format!(
                    "stream broke before a terminal status: {}",
                    e
                )));
            }
        };
        log::debug!("{} frame: {}", ENDPOINT, frame);

        let update: PaymentUpdate = serde_json::from_value(frame).map_err(|e| {
            Error::PaymentOutcomeUnknown(format!("unreadable {} frame: {}", ENDPOINT, e))
        })?;
        if !update.error.message.is_empty() {
            return Err(Error::Backend {
                endpoint: ENDPOINT.to_string(),
                message: update.error.message,
            });
        }

        match update.result.status.parse::<PaymentStatus>()? {
            PaymentStatus::Unknown | PaymentStatus::InFlight => {
                log::trace!("Payment in flight, polling again in {:?}", poll_interval);
                tokio::time::sleep(poll_interval).await;
            }
            PaymentStatus::Failed => {
                return Err(Error::PaymentFailed {
                    reason: update.result.failure_reason,
                });
            }
            PaymentStatus::Succeeded => {
                return hex::decode(&update.result.payment_preimage).map_err(|e| {
                    Error::Parse(format!("Failed to decode payment preimage: {}", e))
                });
            }
        }
    }
}
