//! Domain traits defining contracts for external systems.
//!
//! Balances, coins, keys and the network all live outside this crate.
//! Each is reached through one of the traits below so the service can be
//! wired to a real node or to in-memory mocks.

use async_trait::async_trait;

use super::address::DomainAddress;
use super::error::AppError;
use super::transaction::{SignedTransaction, UnsignedTransaction, UnspentOutput};
use super::types::{Amount, Domain, TokenBalance, TokenInfo, TransactionId, TransferDomainPayload};

/// Balance and ownership queries
#[async_trait]
pub trait AccountLookup: Send + Sync {
    /// Balance of `token_id` held by `address` inside `domain`
    async fn balance_of(
        &self,
        address: &DomainAddress,
        domain: Domain,
        token_id: u32,
    ) -> Result<Amount, AppError>;

    /// Whether the local wallet controls `address`
    async fn owns_address(&self, address: &DomainAddress) -> Result<bool, AppError>;

    /// Token metadata, `None` when the token does not exist
    async fn get_token(&self, token_id: u32) -> Result<Option<TokenInfo>, AppError>;

    /// Aggregate wallet balances, optionally including EVM-held balances
    async fn token_balances(&self, include_evm: bool) -> Result<Vec<TokenBalance>, AppError> {
        let _ = include_evm;
        Err(AppError::NotSupported(
            "token_balances not implemented".to_string(),
        ))
    }
}

/// Coin selection and fee policy
#[async_trait]
pub trait FundingProvider: Send + Sync {
    /// Coins worth at least `required` for a transaction touching `domain`.
    ///
    /// `owners` lists addresses whose coins should be preferred, so the
    /// owner of a DVM source can authorize the transfer with an input.
    async fn select_inputs(
        &self,
        required: Amount,
        domain: Domain,
        owners: &[DomainAddress],
    ) -> Result<Vec<UnspentOutput>, AppError>;

    /// Fee rate in base units per virtual kilobyte
    async fn fee_rate(&self) -> Result<Amount, AppError>;
}

/// Key holder that signs every input of a transaction
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    async fn sign(&self, unsigned: UnsignedTransaction) -> Result<SignedTransaction, AppError>;
}

/// Network access
#[async_trait]
pub trait NetworkSubmitter: Send + Sync {
    /// Broadcast a serialized transaction
    async fn submit_raw(&self, raw: &[u8]) -> Result<TransactionId, AppError>;

    /// Check node connectivity
    async fn health_check(&self) -> Result<(), AppError>;

    /// Get current block height
    async fn get_block_height(&self) -> Result<u64, AppError> {
        Err(AppError::NotSupported(
            "get_block_height not implemented".to_string(),
        ))
    }

    /// Have the node build, fund, sign and broadcast the transfer itself
    async fn send_transfer_domain(
        &self,
        payload: &TransferDomainPayload,
    ) -> Result<TransactionId, AppError> {
        let _ = payload;
        Err(AppError::NotSupported(
            "send_transfer_domain not implemented".to_string(),
        ))
    }
}
