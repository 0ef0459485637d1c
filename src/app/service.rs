//! Application service layer.
//!
//! [`TransferDomainService`] is the entry point for every transfer-domain
//! use case: encoding, decoding, validation, assembly and submission. It
//! holds only trait objects, so the same code runs against a node or
//! against in-memory mocks.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::domain::{
    AccountLookup, AppError, BlockchainError, Domain, DomainAddress, EncodedScript,
    FundingProvider, HealthResponse, HealthStatus, Network, NetworkSubmitter, SignedTransaction,
    TokenBalance, Transaction, TransactionId, TransactionSigner, TransferDomainPayload, Amount,
    codec, rejection,
};

use super::assembler::TransactionAssembler;
use super::validator::PreconditionValidator;

/// Runs `fut` with a deadline; an elapsed deadline becomes `BlockchainError::Timeout`.
pub(crate) async fn with_timeout<T>(
    limit: Duration,
    operation: &'static str,
    fut: impl Future<Output = Result<T, AppError>>,
) -> Result<T, AppError> {
    tokio::time::timeout(limit, fut).await.map_err(|_| {
        AppError::Blockchain(BlockchainError::Timeout(format!(
            "{operation} did not complete within {}s",
            limit.as_secs_f64()
        )))
    })?
}

/// Tunables for [`TransferDomainService`].
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub network: Network,
    /// Deadline for one submission attempt
    pub submit_timeout: Duration,
    /// Deadline for each balance/ownership/token lookup
    pub lookup_timeout: Duration,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            network: Network::Mainnet,
            submit_timeout: Duration::from_secs(30),
            lookup_timeout: Duration::from_secs(10),
        }
    }
}

/// Result of a built and (optionally) broadcast transfer.
#[derive(Debug, Clone, Serialize)]
pub struct TransferReceipt {
    pub txid: TransactionId,
    pub hex: String,
    pub fee: Amount,
}

impl From<&SignedTransaction> for TransferReceipt {
    fn from(signed: &SignedTransaction) -> Self {
        Self {
            txid: signed.txid(),
            hex: signed.to_hex(),
            fee: signed.fee,
        }
    }
}

/// Orchestrates validation, assembly and submission of domain transfers.
///
/// # Example
///
/// ```ignore
/// let node = Arc::new(DefidClient::new(rpc, Network::Mainnet));
/// let service = TransferDomainService::new(
///     node.clone(), node.clone(), node.clone(), node, ServiceSettings::default(),
/// );
/// let receipt = service.transfer_domain(&payload, None).await?;
/// ```
pub struct TransferDomainService {
    lookup: Arc<dyn AccountLookup>,
    submitter: Arc<dyn NetworkSubmitter>,
    validator: PreconditionValidator,
    assembler: TransactionAssembler,
    settings: ServiceSettings,
}

impl TransferDomainService {
    #[must_use]
    pub fn new(
        lookup: Arc<dyn AccountLookup>,
        funding: Arc<dyn FundingProvider>,
        signer: Arc<dyn TransactionSigner>,
        submitter: Arc<dyn NetworkSubmitter>,
        settings: ServiceSettings,
    ) -> Self {
        let validator = PreconditionValidator::new(
            Arc::clone(&lookup),
            settings.network,
            settings.lookup_timeout,
        );
        let assembler = TransactionAssembler::new(funding, signer, settings.network);
        Self {
            lookup,
            submitter,
            validator,
            assembler,
            settings,
        }
    }

    #[must_use]
    pub fn network(&self) -> Network {
        self.settings.network
    }

    #[must_use]
    pub fn encode(&self, payload: &TransferDomainPayload) -> EncodedScript {
        codec::encode(payload)
    }

    /// Hex of the marker output's locking script.
    #[must_use]
    pub fn encode_transfer_domain(&self, payload: &TransferDomainPayload) -> String {
        codec::encode_transfer_domain(payload)
    }

    pub fn decode_transfer_domain(&self, script_hex: &str) -> Result<TransferDomainPayload, AppError> {
        Ok(codec::decode_transfer_domain(script_hex)?)
    }

    /// Runs the client-side preconditions; failures are counted by kind.
    #[instrument(skip_all, fields(items = payload.items().len()))]
    pub async fn validate(&self, payload: &TransferDomainPayload) -> Result<(), AppError> {
        self.validator
            .validate(payload)
            .await
            .inspect_err(record_rejection)
    }

    /// Validates and assembles a signed transaction without broadcasting it.
    ///
    /// Change goes to `change_address`, or to the first DVM address among
    /// the legs when none is given.
    #[instrument(skip_all, fields(items = payload.items().len()))]
    pub async fn build_transfer_domain(
        &self,
        payload: &TransferDomainPayload,
        change_address: Option<DomainAddress>,
    ) -> Result<SignedTransaction, AppError> {
        self.validate(payload).await?;

        let change = change_address
            .or_else(|| default_change_address(payload))
            .ok_or_else(|| {
                AppError::Validation(crate::domain::ValidationError::MissingField(
                    "change_address".to_string(),
                ))
            })?;
        let signed = self
            .assembler
            .build(payload, &change)
            .await
            .inspect_err(record_rejection)?;

        metrics::counter!("transfer_domain_built_total").increment(1);
        Ok(signed)
    }

    /// Broadcasts a signed transaction once.
    ///
    /// Rejections are mapped onto the error taxonomy with the node's text
    /// preserved. Submission is never retried here: a repeated broadcast of
    /// an accepted transfer is not idempotent.
    #[instrument(skip_all, fields(txid = %signed.txid()))]
    pub async fn submit(&self, signed: &SignedTransaction) -> Result<TransactionId, AppError> {
        self.submit_transaction(&signed.tx).await
    }

    /// Parses and broadcasts a raw transaction given as hex.
    pub async fn submit_raw_hex(&self, raw_hex: &str) -> Result<TransactionId, AppError> {
        let tx = Transaction::from_hex(raw_hex)?;
        self.submit_transaction(&tx).await
    }

    async fn submit_transaction(&self, tx: &Transaction) -> Result<TransactionId, AppError> {
        let result = with_timeout(
            self.settings.submit_timeout,
            "submit_raw",
            self.submitter.submit_raw(&tx.to_bytes()),
        )
        .await;
        let txid = map_submission(result).inspect_err(record_rejection)?;

        metrics::counter!("transfer_domain_submitted_total").increment(1);
        info!(txid = %txid, "Transfer domain transaction accepted");
        Ok(txid)
    }

    /// Validates, builds, signs and broadcasts in one step.
    #[instrument(skip_all, fields(items = payload.items().len()))]
    pub async fn transfer_domain(
        &self,
        payload: &TransferDomainPayload,
        change_address: Option<DomainAddress>,
    ) -> Result<TransferReceipt, AppError> {
        let signed = self.build_transfer_domain(payload, change_address).await?;
        let mut receipt = TransferReceipt::from(&signed);
        receipt.txid = self.submit(&signed).await?;
        Ok(receipt)
    }

    /// Validates locally, then lets the node construct and broadcast the transfer.
    #[instrument(skip_all, fields(items = payload.items().len()))]
    pub async fn transfer_domain_via_node(
        &self,
        payload: &TransferDomainPayload,
    ) -> Result<TransactionId, AppError> {
        self.validate(payload).await?;
        let result = with_timeout(
            self.settings.submit_timeout,
            "send_transfer_domain",
            self.submitter.send_transfer_domain(payload),
        )
        .await;
        let txid = map_submission(result).inspect_err(record_rejection)?;
        metrics::counter!("transfer_domain_submitted_total").increment(1);
        info!(txid = %txid, "Node accepted transfer domain");
        Ok(txid)
    }

    /// Balance of one address in one domain.
    pub async fn balance_of(
        &self,
        address: &DomainAddress,
        domain: Domain,
        token_id: u32,
    ) -> Result<Amount, AppError> {
        with_timeout(
            self.settings.lookup_timeout,
            "balance_of",
            self.lookup.balance_of(address, domain, token_id),
        )
        .await
    }

    /// Wallet-wide balances, with EVM-held amounts folded in on request.
    pub async fn balances(&self, include_evm: bool) -> Result<Vec<TokenBalance>, AppError> {
        with_timeout(
            self.settings.lookup_timeout,
            "token_balances",
            self.lookup.token_balances(include_evm),
        )
        .await
    }

    /// Performs a health check on the node connection.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> HealthResponse {
        let node = match self.submitter.health_check().await {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => {
                warn!(error = ?e, "Node health check failed");
                return HealthResponse::new(HealthStatus::Unhealthy, None);
            }
        };
        match self.submitter.get_block_height().await {
            Ok(height) => HealthResponse::new(node, Some(height)),
            Err(e) => {
                warn!(error = ?e, "Block height unavailable");
                HealthResponse::new(HealthStatus::Degraded, None)
            }
        }
    }
}

/// First DVM-side address of the payload, where change can be returned.
fn default_change_address(payload: &TransferDomainPayload) -> Option<DomainAddress> {
    payload.items().iter().find_map(|item| {
        [&item.src, &item.dst]
            .into_iter()
            .find(|leg| leg.domain == Domain::Dvm && leg.address.compatible_with(Domain::Dvm))
            .map(|leg| leg.address)
    })
}

/// Turns a node rejection into a `SubmissionError`; other errors pass through.
fn map_submission(result: Result<TransactionId, AppError>) -> Result<TransactionId, AppError> {
    result.map_err(|err| match err {
        AppError::Blockchain(BlockchainError::Rejected { code, message }) => {
            let mapped = rejection::to_submission_error(Some(code), &message);
            warn!(kind = mapped.kind.kind(), code, "Node rejected transaction");
            AppError::Submission(mapped)
        }
        other => other,
    })
}

fn record_rejection(err: &AppError) {
    if let Some(kind) = err.transfer_domain_kind() {
        metrics::counter!("transfer_domain_rejected_total", "kind" => kind.kind()).increment(1);
    }
}
