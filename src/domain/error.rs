//! Application error types with proper error chaining.
//!
//! [`TransferDomainError`] is the typed taxonomy shared by client-side checks
//! and by rejections mapped back from the node. Its messages reuse the node's
//! consensus wording so a local failure and a network failure read the same.

use serde_json::{Map, Value, json};
use thiserror::Error;

use super::types::{Amount, Domain};

/// Failure kinds of a domain transfer, whether detected locally or reported by the node.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferDomainError {
    #[error("recipient ({address}) does not refer to any valid address")]
    InvalidAddress { address: String },

    #[error("Amount out of range{}", value_suffix(.value))]
    AmountOutOfRange { value: String },

    #[error("Cannot transfer inside same domain")]
    SameDomainTransfer { domain: Option<Domain> },

    #[error("Source token and destination token must be the same")]
    TokenMismatch { src: Option<u32>, dst: Option<u32> },

    #[error("Source amount must be equal to destination amount")]
    AmountMismatch {
        src: Option<Amount>,
        dst: Option<Amount>,
    },

    #[error("Non-DAT or LP tokens are not supported for transferdomain")]
    UnsupportedToken { token_id: Option<u32> },

    #[error("Src address must be {} in case of \"{expected}\" domain", .expected.address_requirement())]
    SrcDomainAddressMismatch { expected: Domain },

    #[error("Dst address must be {} in case of \"{expected}\" domain", .expected.address_requirement())]
    DstDomainAddressMismatch { expected: Domain },

    #[error("tx must have at least one input from account owner")]
    NotOwner { address: Option<String> },

    #[error("{}", insufficient_balance_message(.domain, .address, .required, .available))]
    InsufficientBalance {
        domain: Domain,
        address: Option<String>,
        required: Option<Amount>,
        available: Option<Amount>,
    },

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Unknown {field} tag: 0x{tag:02x}")]
    UnknownTag { field: &'static str, tag: u8 },

    #[error("Network rejected transaction: {message}")]
    NetworkRejected { code: Option<i64>, message: String },
}

fn value_suffix(value: &str) -> String {
    if value.is_empty() {
        String::new()
    } else {
        format!(": {value}")
    }
}

fn insufficient_balance_message(
    domain: &Domain,
    address: &Option<String>,
    required: &Option<Amount>,
    available: &Option<Amount>,
) -> String {
    match (required, available, address) {
        (Some(required), Some(available), _) => {
            format!("amount {available} is less than {required}")
        }
        (_, _, Some(address)) => {
            format!("Not enough balance in {address} to cover \"{domain}\" domain transfer")
        }
        _ => format!("Not enough balance to cover \"{domain}\" domain transfer"),
    }
}

impl TransferDomainError {
    /// Stable snake_case identifier, used for metrics labels and API error types.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidAddress { .. } => "invalid_address",
            Self::AmountOutOfRange { .. } => "amount_out_of_range",
            Self::SameDomainTransfer { .. } => "same_domain_transfer",
            Self::TokenMismatch { .. } => "token_mismatch",
            Self::AmountMismatch { .. } => "amount_mismatch",
            Self::UnsupportedToken { .. } => "unsupported_token",
            Self::SrcDomainAddressMismatch { .. } => "src_domain_address_mismatch",
            Self::DstDomainAddressMismatch { .. } => "dst_domain_address_mismatch",
            Self::NotOwner { .. } => "not_owner",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::MalformedPayload(_) => "malformed_payload",
            Self::UnknownTag { .. } => "unknown_tag",
            Self::NetworkRejected { .. } => "network_rejected",
        }
    }

    /// Structured fields of the error, for callers that should not parse messages.
    ///
    /// Returns `None` when the variant carries nothing beyond its message.
    #[must_use]
    pub fn details(&self) -> Option<Value> {
        let mut fields = Map::new();
        let mut put = |key: &str, value: Option<Value>| {
            if let Some(value) = value {
                fields.insert(key.to_string(), value);
            }
        };
        match self {
            Self::InvalidAddress { address } => put("address", Some(json!(address))),
            Self::AmountOutOfRange { value } => {
                put("value", (!value.is_empty()).then(|| json!(value)));
            }
            Self::SameDomainTransfer { domain } => put("domain", domain.map(|d| json!(d))),
            Self::TokenMismatch { src, dst } => {
                put("src", src.map(|id| json!(id)));
                put("dst", dst.map(|id| json!(id)));
            }
            Self::AmountMismatch { src, dst } => {
                put("src", src.map(|amount| json!(amount)));
                put("dst", dst.map(|amount| json!(amount)));
            }
            Self::UnsupportedToken { token_id } => put("token_id", token_id.map(|id| json!(id))),
            Self::SrcDomainAddressMismatch { expected }
            | Self::DstDomainAddressMismatch { expected } => {
                put("expected", Some(json!(expected)));
            }
            Self::NotOwner { address } => put("address", address.as_ref().map(|a| json!(a))),
            Self::InsufficientBalance {
                domain,
                address,
                required,
                available,
            } => {
                put("domain", Some(json!(domain)));
                put("address", address.as_ref().map(|a| json!(a)));
                put("required", required.map(|amount| json!(amount)));
                put("available", available.map(|amount| json!(amount)));
            }
            Self::MalformedPayload(_) => {}
            Self::UnknownTag { field, tag } => {
                put("field", Some(json!(field)));
                put("tag", Some(json!(tag)));
            }
            Self::NetworkRejected { code, .. } => put("code", code.map(|c| json!(c))),
        }
        (!fields.is_empty()).then_some(Value::Object(fields))
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedPayload(message.into())
    }
}

/// A transaction the node refused, with the rejection mapped onto the taxonomy.
///
/// `raw` keeps the node's text untouched so nothing is lost in the mapping.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("rejected by network: {raw}")]
pub struct SubmissionError {
    pub kind: TransferDomainError,
    pub code: Option<i64>,
    pub raw: String,
}

#[derive(Error, Debug, Clone)]
pub enum BlockchainError {
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("RPC call failed: {0}")]
    RpcError(String),
    #[error("Transaction rejected ({code}): {message}")]
    Rejected { code: i64, message: String },
    #[error("Signing failed: {0}")]
    SigningFailed(String),
    #[error("Insufficient funds for transaction: need {required}, have {available}")]
    InsufficientFunds { required: Amount, available: Amount },
    #[error("Timeout: {0}")]
    Timeout(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("Unexpected end of data: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },
    #[error("Trailing {0} bytes after transaction")]
    TrailingBytes(usize),
    #[error("Invalid transaction: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
    #[error("Parse error: {0}")]
    ParseError(String),
}

impl From<&str> for ConfigError {
    fn from(s: &str) -> Self {
        ConfigError::ParseError(s.to_string())
    }
}

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },
    #[error("Missing required field: {0}")]
    MissingField(String),
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
    #[error("Validation failed: {0}")]
    Multiple(String),
}

impl From<&str> for ValidationError {
    fn from(s: &str) -> Self {
        ValidationError::InvalidFormat(s.to_string())
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    TransferDomain(#[from] TransferDomainError),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error(transparent)]
    Blockchain(#[from] BlockchainError),
    #[error(transparent)]
    Transaction(#[from] TransactionError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Authentication failed: {0}")]
    Authentication(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Operation not supported: {0}")]
    NotSupported(String),
    #[error("Rate limit exceeded")]
    RateLimited,
}

impl AppError {
    /// The taxonomy entry behind this error, whether raised locally or by the node.
    #[must_use]
    pub fn transfer_domain_kind(&self) -> Option<&TransferDomainError> {
        match self {
            AppError::TransferDomain(kind) => Some(kind),
            AppError::Submission(submission) => Some(&submission.kind),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(ValidationError::Multiple(err.to_string()))
    }
}
