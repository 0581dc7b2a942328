//! Request and response bodies of the LND REST API.
//!
//! Byte fields are base64 on the wire, 64-bit integers decimal strings.

use serde::{Deserialize, Serialize, Serializer};

use crate::types::string_u64;

/// Message LND returns when an invoice for the hash already exists.
pub const PAYMENT_HASH_EXISTS_MESSAGE: &str = "invoice with payment hash already exists";

fn base64_bytes<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    use base64::Engine as _;
    serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
}

/// Response of `v1/invoices` and `v2/invoices/hodl`.
#[derive(Debug, Clone, Deserialize)]
pub struct AddInvoiceResponse {
    pub payment_request: String,
}

/// Body of `v2/invoices/cancel`.
#[derive(Debug, Clone, Serialize)]
pub struct CancelInvoiceRequest<'a> {
    #[serde(serialize_with = "base64_bytes")]
    pub payment_hash: &'a [u8],
}

/// Body of `v2/invoices/settle`.
#[derive(Debug, Clone, Serialize)]
pub struct SettleInvoiceRequest<'a> {
    #[serde(serialize_with = "base64_bytes")]
    pub preimage: &'a [u8],
}

/// Body of `v2/router/route/estimatefee`.
#[derive(Debug, Clone, Serialize)]
pub struct EstimateFeeRequest {
    /// Raw destination public key.
    #[serde(serialize_with = "base64_bytes")]
    pub dest: Vec<u8>,
    #[serde(with = "string_u64")]
    pub amt_sat: u64,
}

/// Response of `v2/router/route/estimatefee`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EstimateFeeResponse {
    #[serde(with = "string_u64")]
    pub routing_fee_msat: u64,
    /// Absolute block height.
    #[serde(with = "string_u64")]
    pub time_lock_delay: u64,
}

/// Response of `v2/chainkit/bestblock`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BestBlockResponse {
    pub block_hash: String,
    #[serde(with = "string_u64")]
    pub block_height: u64,
}

/// Error body of a non-success response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ApiError {
    pub code: i64,
    pub message: String,
}
