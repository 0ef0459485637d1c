use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize, Serializer};

use super::address::DomainAddress;
use super::error::TransferDomainError;

/// Number of base units in one whole token (8 fractional digits).
pub const COIN: i64 = 100_000_000;

/// Largest amount the node accepts in any single field.
pub const MAX_MONEY: i64 = 1_200_000_000 * COIN;

/// Token id of the native DFI token.
pub const DFI_TOKEN_ID: u32 = 0;

/// Represents a transaction ID from the blockchain (64 hex characters).
pub type TransactionId = String;

/// The ledger a balance lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Domain {
    #[serde(rename = "DVM")]
    Dvm,
    #[serde(rename = "EVM")]
    Evm,
}

impl Domain {
    /// Wire tag of the domain inside a transfer-domain payload.
    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            Domain::Dvm => 2,
            Domain::Evm => 3,
        }
    }

    #[must_use]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            2 => Some(Domain::Dvm),
            3 => Some(Domain::Evm),
            _ => None,
        }
    }

    /// Human description of the address formats this domain accepts.
    #[must_use]
    pub const fn address_requirement(self) -> &'static str {
        match self {
            Domain::Dvm => "a legacy or Bech32 address",
            Domain::Evm => "an ERC55 address",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Domain::Dvm => f.write_str("DVM"),
            Domain::Evm => f.write_str("EVM"),
        }
    }
}

/// A non-negative fixed-point quantity with 8 fractional digits, stored in base units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    /// Builds an amount from base units, rejecting negatives and values above `MAX_MONEY`.
    pub fn from_units(units: i64) -> Result<Self, TransferDomainError> {
        if !(0..=MAX_MONEY).contains(&units) {
            return Err(TransferDomainError::AmountOutOfRange {
                value: Decimal::new(units, 8).to_string(),
            });
        }
        Ok(Amount(units))
    }

    /// Converts a decimal quantity into base units.
    ///
    /// Fractions finer than one base unit cannot be represented and are
    /// reported as out of range rather than silently rounded.
    pub fn from_decimal(value: Decimal) -> Result<Self, TransferDomainError> {
        let out_of_range = || TransferDomainError::AmountOutOfRange {
            value: value.to_string(),
        };
        if value.is_sign_negative() && !value.is_zero() {
            return Err(out_of_range());
        }
        let scaled = value
            .checked_mul(Decimal::from(COIN))
            .ok_or_else(out_of_range)?;
        if !scaled.fract().is_zero() {
            return Err(out_of_range());
        }
        let units = scaled.to_i64().ok_or_else(out_of_range)?;
        Self::from_units(units).map_err(|_| out_of_range())
    }

    #[must_use]
    pub const fn units(self) -> i64 {
        self.0
    }

    #[must_use]
    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, 8)
    }

    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0
            .checked_add(other.0)
            .filter(|units| *units <= MAX_MONEY)
            .map(Amount)
    }

    #[must_use]
    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).filter(|u| *u >= 0).map(Amount)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

impl FromStr for Amount {
    type Err = TransferDomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str_exact(s.trim()).map_err(|_| {
            TransferDomainError::AmountOutOfRange {
                value: s.to_string(),
            }
        })?;
        Amount::from_decimal(value)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A quantity of one token. The quantity is always at least one base unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenAmount {
    pub token_id: u32,
    pub amount: Amount,
}

impl TokenAmount {
    pub fn new(token_id: u32, amount: Amount) -> Result<Self, TransferDomainError> {
        if amount.is_zero() {
            return Err(TransferDomainError::AmountOutOfRange {
                value: amount.to_string(),
            });
        }
        Ok(Self { token_id, amount })
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.amount, self.token_id)
    }
}

/// Parses `<decimal>@<token>`, where token is a numeric id or the `DFI` alias.
impl FromStr for TokenAmount {
    type Err = TransferDomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (amount, token) = s.split_once('@').ok_or_else(|| {
            TransferDomainError::malformed(format!("expected <amount>@<token>, got '{s}'"))
        })?;
        let token_id = match token.trim() {
            t if t.eq_ignore_ascii_case("DFI") => DFI_TOKEN_ID,
            t => t.parse::<u32>().map_err(|_| {
                TransferDomainError::UnsupportedToken { token_id: None }
            })?,
        };
        TokenAmount::new(token_id, amount.parse()?)
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One endpoint of a domain transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferLeg {
    pub address: DomainAddress,
    pub amount: TokenAmount,
    pub domain: Domain,
    /// Opaque extension bytes, carried through byte for byte.
    pub data: Vec<u8>,
}

impl TransferLeg {
    #[must_use]
    pub fn new(address: DomainAddress, amount: TokenAmount, domain: Domain) -> Self {
        Self {
            address,
            amount,
            domain,
            data: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }
}

/// A single src -> dst movement of a token balance between domains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferItem {
    pub src: TransferLeg,
    pub dst: TransferLeg,
}

impl TransferItem {
    #[must_use]
    pub fn new(src: TransferLeg, dst: TransferLeg) -> Self {
        Self { src, dst }
    }
}

/// Ordered, non-empty list of transfer items. Order is part of the encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferDomainPayload {
    items: Vec<TransferItem>,
}

impl TransferDomainPayload {
    pub fn new(items: Vec<TransferItem>) -> Result<Self, TransferDomainError> {
        if items.is_empty() {
            return Err(TransferDomainError::malformed(
                "transfer domain payload must contain at least one item",
            ));
        }
        Ok(Self { items })
    }

    #[must_use]
    pub fn single(item: TransferItem) -> Self {
        Self { items: vec![item] }
    }

    #[must_use]
    pub fn items(&self) -> &[TransferItem] {
        &self.items
    }

    #[must_use]
    pub fn into_items(self) -> Vec<TransferItem> {
        self.items
    }
}

/// Locking script of the zero-value marker output: `OP_RETURN <push "DfTx" '8' payload>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EncodedScript(Vec<u8>);

impl EncodedScript {
    pub(crate) fn from_raw(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

/// Token metadata needed to decide whether a token may cross domains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub id: u32,
    pub symbol: String,
    pub is_dat: bool,
    pub is_lps: bool,
}

impl TokenInfo {
    /// Only DAT tokens that are not liquidity pool shares may be transferred.
    #[must_use]
    pub fn is_transferable(&self) -> bool {
        self.is_dat && !self.is_lps
    }
}

/// A token balance line as reported by aggregate balance queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenBalance {
    pub token_id: u32,
    pub amount: Amount,
}

/// Health check status for services.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Health check response for the application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub node: HealthStatus,
    pub block_height: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

impl HealthResponse {
    pub fn new(node: HealthStatus, block_height: Option<u64>) -> Self {
        Self {
            status: node.clone(),
            node,
            block_height,
            timestamp: Utc::now(),
        }
    }
}

/// Error body returned by the HTTP API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub r#type: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitResponse {
    pub error: ErrorDetail,
    pub retry_after: u64,
}
