//! Domain layer containing core business types, codecs, traits, and error definitions.

pub mod address;
pub mod codec;
pub mod encoding;
pub mod error;
pub mod rejection;
pub mod traits;
pub mod transaction;
pub mod types;

pub use address::{AddressFormat, DomainAddress, Network, erc55_checksum};
pub use codec::{decode, decode_transfer_domain, encode, encode_transfer_domain};
pub use error::{
    AppError, BlockchainError, ConfigError, SubmissionError, TransactionError,
    TransferDomainError, ValidationError,
};
pub use rejection::{map_rejection, to_submission_error};
pub use traits::{AccountLookup, FundingProvider, NetworkSubmitter, TransactionSigner};
pub use transaction::{
    OutPoint, SignedTransaction, Transaction, TxIn, TxOut, UnsignedTransaction, UnspentOutput,
};
pub use types::{
    Amount, COIN, DFI_TOKEN_ID, Domain, EncodedScript, ErrorDetail, ErrorResponse,
    HealthResponse, HealthStatus, MAX_MONEY, RateLimitResponse, TokenAmount, TokenBalance,
    TokenInfo, TransactionId, TransferDomainPayload, TransferItem, TransferLeg,
};
