//! Error types for the Lightning node client.

use std::time::Duration;

use thiserror::Error;

use crate::types::InvoiceState;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving invoices and payments against a node.
///
/// Payment errors fall in two classes that callers must keep apart:
/// [`Error::PaymentFailed`] is definite (funds reserved for the attempt may be
/// released), while every other error returned by a payment attempt leaves the
/// outcome unknown and needs reconciliation before retrying.
#[derive(Error, Debug)]
pub enum Error {
    /// The node already knows an invoice for this payment hash.
    #[error("invoice with that payment hash already exists")]
    PaymentHashExists,

    /// The node reported the payment as failed. Safe to retry.
    #[error("payment failed: {reason}")]
    PaymentFailed { reason: String },

    /// The payment attempt ended without a terminal status.
    #[error("payment outcome unknown: {0}")]
    PaymentOutcomeUnknown(String),

    /// Neither the invoice nor the caller supplied an amount.
    #[error("need a non-zero amount to estimate fee")]
    AmountRequired,

    /// No fee candidate produced an estimate.
    #[error("could not find route{}", join_errors(.errors))]
    NoRouteFound { errors: Vec<Error> },

    /// A route hint without any hop hints.
    #[error("zero hops in route hint {index}")]
    EmptyRouteHint { index: usize },

    /// The invoice was settled or canceled while we waited for acceptance.
    #[error("invoice {state} before payment")]
    InvoiceResolvedBeforeAcceptance {
        state: InvoiceState,
        amt_paid_msat: u64,
    },

    /// The notification stream closed before the invoice was accepted.
    #[error("invoice subscription closed before acceptance")]
    StreamClosed,

    /// The node reported an invoice state we do not model.
    #[error("unhandled invoice state: {0}")]
    UnhandledState(String),

    /// The node reported a payment status we do not model.
    #[error("unhandled payment status: {0}")]
    UnhandledStatus(String),

    /// A success response whose body we do not expect.
    #[error("{endpoint} unhandled response: {body}")]
    UnhandledResponse { endpoint: String, body: String },

    /// Error message carried inside a stream frame.
    #[error("{endpoint} response: {message}")]
    Backend { endpoint: String, message: String },

    /// Non-success HTTP status.
    #[error("{endpoint} response ({status}): {message}")]
    Api {
        endpoint: String,
        status: u16,
        message: String,
    },

    /// Network/HTTP/websocket error.
    #[error("Network error: {0}")]
    Network(String),

    /// Parse error.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// The node quoted a route time lock below the current block height.
    #[error("time lock {time_lock} below block height {height}")]
    TimeLockBelowHeight { time_lock: u64, height: u64 },

    /// A caller-supplied deadline expired.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Invalid client configuration.
    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    /// The node definitively failed the payment.
    pub fn is_payment_failed(&self) -> bool {
        matches!(self, Error::PaymentFailed { .. })
    }

    /// For a payment attempt: the payment may or may not have gone through.
    ///
    /// Anything short of [`Error::PaymentFailed`] counts, including
    /// [`Error::Backend`] and [`Error::UnhandledStatus`] frames, since the node
    /// may already be routing by the time they arrive.
    pub fn is_outcome_unknown(&self) -> bool {
        !self.is_payment_failed()
    }
}

impl From<hex::FromHexError> for Error {
    fn from(err: hex::FromHexError) -> Self {
        Error::Parse(format!("invalid hex: {}", err))
    }
}

fn join_errors(errors: &[Error]) -> String {
    errors.iter().map(|e| format!("\n{}", e)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_route_lists_every_candidate_error() {
        let err = Error::NoRouteFound {
            errors: vec![
                Error::EmptyRouteHint { index: 0 },
                Error::Parse("invalid hex: Odd number of digits".to_string()),
            ],
        };

        assert_eq!(
            err.to_string(),
            "could not find route\nzero hops in route hint 0\nParse error: invalid hex: Odd number of digits"
        );
    }

    #[test]
    fn payment_error_classes() {
        let failed = Error::PaymentFailed {
            reason: "FAILURE_REASON_NO_ROUTE".to_string(),
        };
        let unknown = Error::PaymentOutcomeUnknown("stream closed".to_string());

        assert!(failed.is_payment_failed());
        assert!(!failed.is_outcome_unknown());
        assert!(unknown.is_outcome_unknown());
        assert!(!unknown.is_payment_failed());
        assert!(!Error::StreamClosed.is_payment_failed());
        assert!(
            Error::Backend {
                endpoint: "payment stream".to_string(),
                message: "rpc error: code = Unavailable".to_string(),
            }
            .is_outcome_unknown()
        );
        assert!(Error::UnhandledStatus("INITIATED".to_string()).is_outcome_unknown());
    }
}
