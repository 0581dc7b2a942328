//! Shared types for invoices and payments.
//!
//! Amounts are millisatoshis held as `u64`. On the wire they travel as decimal
//! strings, see [`string_u64`].

use std::collections::BTreeMap;
use std::fmt;

use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

use crate::error::{Error, Result};

/// Serde module for `u64` quantities encoded as decimal strings.
///
/// Decoding also accepts plain JSON numbers, the node emits both depending on
/// the underlying field width.
pub(crate) mod string_u64 {
    use super::*;
    use serde::de::{self, Visitor};

    pub fn serialize<S>(value: &u64, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(U64Visitor)
    }

    struct U64Visitor;

    impl Visitor<'_> for U64Visitor {
        type Value = u64;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "an unsigned integer or a decimal string")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<u64, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<u64, E> {
            u64::try_from(v).map_err(|_| E::custom(format!("negative amount: {}", v)))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<u64, E> {
            if v.is_empty() {
                return Ok(0);
            }
            v.parse().map_err(E::custom)
        }
    }
}

/// Like [`string_u64`] for optional fields.
pub(crate) mod option_string_u64 {
    use super::*;

    #[derive(Deserialize)]
    struct Wrapper(#[serde(with = "string_u64")] u64);

    pub fn serialize<S>(value: &Option<u64>, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(v) => serializer.collect_str(v),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|w| w.0))
    }
}

/// Serde module for optional byte fields, base64 encoded like every `bytes`
/// field of the node's JSON API.
pub(crate) mod option_base64 {
    use super::*;
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;

    pub fn serialize<S>(
        value: &Option<Vec<u8>>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(s) if !s.is_empty() => STANDARD
                .decode(&s)
                .map(Some)
                .map_err(serde::de::Error::custom),
            _ => Ok(None),
        }
    }
}

/// A decoded payment request, as reported by the node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodedInvoice {
    /// Payment hash (hex).
    pub payment_hash: String,
    /// Creation time (Unix seconds).
    #[serde(with = "string_u64")]
    pub timestamp: u64,
    /// Expiry in seconds after `timestamp`.
    #[serde(with = "string_u64")]
    pub expiry: u64,
    pub description: String,
    /// Description hash (hex), empty when the invoice carries a description.
    pub description_hash: String,
    /// Requested amount. Zero for amount-less invoices.
    #[serde(with = "string_u64")]
    pub num_msat: u64,
    /// Final CLTV expiry delta required by the payee.
    #[serde(with = "string_u64")]
    pub cltv_expiry: u64,
    /// Feature bits keyed by bit number.
    pub features: BTreeMap<u32, Feature>,
    /// Payee node public key (hex).
    pub destination: String,
    pub route_hints: Vec<RouteHint>,
}

impl DecodedInvoice {
    /// Raw payment hash bytes.
    pub fn payment_hash_bytes(&self) -> Result<Vec<u8>> {
        Ok(hex::decode(&self.payment_hash)?)
    }

    /// Whether the payer has to choose the amount.
    pub fn is_amountless(&self) -> bool {
        self.num_msat == 0
    }

    /// Point in time after which the invoice can no longer be paid.
    pub fn expires_at(&self) -> Result<OffsetDateTime> {
        let expires = self
            .timestamp
            .checked_add(self.expiry)
            .and_then(|t| i64::try_from(t).ok())
            .ok_or_else(|| Error::Parse(format!("invoice expiry out of range: {}", self.expiry)))?;
        OffsetDateTime::from_unix_timestamp(expires)
            .map_err(|e| Error::Parse(format!("invalid invoice timestamp: {}", e)))
    }

    pub fn is_expired_at(&self, now: OffsetDateTime) -> Result<bool> {
        Ok(now >= self.expires_at()?)
    }
}

/// One supported feature bit of an invoice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Feature {
    pub name: String,
    pub is_required: bool,
    pub is_known: bool,
}

/// A private path to the destination. Usable only with at least one hop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteHint {
    pub hop_hints: Vec<HopHint>,
}

/// Routing policy of one hop in a [`RouteHint`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HopHint {
    /// Public key (hex) of the node at the start of the channel.
    pub node_id: String,
    #[serde(rename = "chan_id", with = "string_u64")]
    pub channel_id: u64,
    #[serde(deserialize_with = "string_u64::deserialize")]
    pub fee_base_msat: u64,
    #[serde(
        rename = "fee_proportional_millionths",
        deserialize_with = "string_u64::deserialize"
    )]
    pub fee_ppm: u64,
    #[serde(deserialize_with = "string_u64::deserialize")]
    pub cltv_expiry_delta: u64,
}

impl HopHint {
    /// Fee this hop charges for forwarding `amount_msat`.
    pub fn fee_msat(&self, amount_msat: u64) -> u64 {
        let proportional = u128::from(amount_msat) * u128::from(self.fee_ppm) / 1_000_000;
        self.fee_base_msat
            .saturating_add(u64::try_from(proportional).unwrap_or(u64::MAX))
    }
}

/// Invoice creation request.
///
/// When `hash` is set the invoice is a hold invoice: the node accepts the
/// HTLC but waits for [`settle_invoice`](crate::LightningBackend::settle_invoice)
/// to reveal the preimage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceParameters {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub memo: String,
    #[serde(default, with = "option_base64", skip_serializing_if = "Option::is_none")]
    pub hash: Option<Vec<u8>>,
    #[serde(with = "string_u64")]
    pub value_msat: u64,
    #[serde(default, with = "option_base64", skip_serializing_if = "Option::is_none")]
    pub description_hash: Option<Vec<u8>>,
    #[serde(with = "string_u64")]
    pub expiry: u64,
    #[serde(with = "string_u64")]
    pub cltv_expiry: u64,
}

impl InvoiceParameters {
    /// Hold invoice locked to the hash of `secret`.
    pub fn hold(secret: &HoldSecret, value_msat: u64, memo: impl Into<String>) -> Self {
        Self {
            memo: memo.into(),
            hash: Some(secret.payment_hash.to_vec()),
            value_msat,
            ..Default::default()
        }
    }

    pub fn is_hold(&self) -> bool {
        self.hash.is_some()
    }
}

impl TryFrom<&DecodedInvoice> for InvoiceParameters {
    type Error = Error;

    fn try_from(invoice: &DecodedInvoice) -> Result<Self> {
        let description_hash = if invoice.description_hash.is_empty() {
            None
        } else {
            Some(hex::decode(&invoice.description_hash)?)
        };

        Ok(Self {
            memo: invoice.description.clone(),
            hash: Some(invoice.payment_hash_bytes()?),
            value_msat: invoice.num_msat,
            description_hash,
            expiry: invoice.expiry,
            cltv_expiry: invoice.cltv_expiry,
        })
    }
}

/// Outbound payment request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentParameters {
    /// Encoded payment request.
    #[serde(rename = "payment_request")]
    pub invoice: String,
    /// Amount to pay. Only used for amount-less invoices.
    #[serde(default, with = "option_string_u64", skip_serializing_if = "Option::is_none")]
    pub amt_msat: Option<u64>,
    pub timeout_seconds: u64,
    #[serde(with = "string_u64")]
    pub fee_limit_msat: u64,
    pub cltv_limit: u64,
}

/// Preimage and payment hash for a hold invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoldSecret {
    pub preimage: [u8; 32],
    pub payment_hash: [u8; 32],
}

impl HoldSecret {
    /// Fresh random preimage.
    pub fn generate() -> Self {
        let mut preimage = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut preimage);
        Self::from_preimage(preimage)
    }

    pub fn from_preimage(preimage: [u8; 32]) -> Self {
        let payment_hash = Sha256::digest(preimage).into();
        Self {
            preimage,
            payment_hash,
        }
    }
}

/// Invoice state as reported by the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceState {
    Open,
    Accepted,
    Settled,
    Canceled,
}

impl std::str::FromStr for InvoiceState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "OPEN" => Ok(InvoiceState::Open),
            "ACCEPTED" => Ok(InvoiceState::Accepted),
            "SETTLED" => Ok(InvoiceState::Settled),
            "CANCELED" => Ok(InvoiceState::Canceled),
            _ => Err(Error::UnhandledState(s.to_string())),
        }
    }
}

impl fmt::Display for InvoiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvoiceState::Open => write!(f, "OPEN"),
            InvoiceState::Accepted => write!(f, "ACCEPTED"),
            InvoiceState::Settled => write!(f, "SETTLED"),
            InvoiceState::Canceled => write!(f, "CANCELED"),
        }
    }
}

/// Payment status as reported by the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Unknown,
    InFlight,
    Succeeded,
    Failed,
}

impl std::str::FromStr for PaymentStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            // zero value, omitted from JSON
            "" | "UNKNOWN" => Ok(PaymentStatus::Unknown),
            "IN_FLIGHT" => Ok(PaymentStatus::InFlight),
            "SUCCEEDED" => Ok(PaymentStatus::Succeeded),
            "FAILED" => Ok(PaymentStatus::Failed),
            _ => Err(Error::UnhandledStatus(s.to_string())),
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentStatus::Unknown => write!(f, "UNKNOWN"),
            PaymentStatus::InFlight => write!(f, "IN_FLIGHT"),
            PaymentStatus::Succeeded => write!(f, "SUCCEEDED"),
            PaymentStatus::Failed => write!(f, "FAILED"),
        }
    }
}
