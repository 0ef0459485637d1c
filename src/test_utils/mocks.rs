//! Mock implementations for testing.
//!
//! [`MockLedger`] is a small in-memory stand-in for the node: it keeps
//! account balances per domain, a UTXO set and a wallet, and applies
//! accepted transfer-domain transactions the way the chain would. It
//! implements every collaborator trait, so a service can be wired to a
//! single shared ledger.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::domain::{
    AccountLookup, Amount, AppError, BlockchainError, Domain, DomainAddress, FundingProvider,
    NetworkSubmitter, OutPoint, SignedTransaction, TokenBalance, TokenInfo, Transaction,
    TransactionId, TransactionSigner, TransferDomainPayload, TxIn, TxOut, UnsignedTransaction,
    UnspentOutput, codec,
};

/// Configuration for mock behavior.
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// If true, every operation fails with a connection error.
    pub should_fail: bool,
    /// Custom error message for failures.
    pub error_message: Option<String>,
    /// Simulated latency in milliseconds.
    pub latency_ms: Option<u64>,
    /// Reject every submission with this code and message.
    pub rejection: Option<(i64, String)>,
}

impl MockConfig {
    /// Creates a config that always succeeds.
    #[must_use]
    pub fn success() -> Self {
        Self::default()
    }

    /// Creates a config that always fails.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            should_fail: true,
            error_message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Creates a config whose submissions are refused by the "node".
    #[must_use]
    pub fn rejecting(code: i64, message: impl Into<String>) -> Self {
        Self {
            rejection: Some((code, message.into())),
            ..Self::default()
        }
    }

    /// Adds simulated latency.
    #[must_use]
    pub fn with_latency(mut self, ms: u64) -> Self {
        self.latency_ms = Some(ms);
        self
    }
}

#[derive(Default)]
struct LedgerState {
    balances: HashMap<(DomainAddress, Domain, u32), Amount>,
    wallet: HashSet<DomainAddress>,
    tokens: HashMap<u32, TokenInfo>,
    utxos: BTreeMap<OutPoint, UnspentOutput>,
    submitted: Vec<Transaction>,
    height: u64,
    funding_nonce: u64,
}

/// In-memory node used by unit and integration tests.
///
/// # Example
///
/// ```
/// use transfer_domain::domain::{Amount, COIN, Domain, DomainAddress};
/// use transfer_domain::test_utils::MockLedger;
///
/// let owner = DomainAddress::Legacy { pubkey_hash: [1; 20] };
/// let ledger = MockLedger::new();
/// ledger.add_wallet_address(owner);
/// ledger.credit(owner, Domain::Dvm, 0, Amount::from_units(100 * COIN).unwrap());
/// ledger.fund(owner, Amount::from_units(COIN).unwrap());
/// ```
pub struct MockLedger {
    state: Mutex<LedgerState>,
    config: MockConfig,
    fee_rate: Amount,
    call_count: AtomicU64,
    is_healthy: AtomicBool,
}

impl MockLedger {
    /// Creates a new ledger that knows the DFI token only.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(MockConfig::success())
    }

    #[must_use]
    pub fn with_config(config: MockConfig) -> Self {
        let ledger = Self {
            state: Mutex::new(LedgerState::default()),
            config,
            fee_rate: Amount::from_units(10_000).unwrap(),
            call_count: AtomicU64::new(0),
            is_healthy: AtomicBool::new(true),
        };
        ledger.add_token(TokenInfo {
            id: 0,
            symbol: "DFI".to_string(),
            is_dat: true,
            is_lps: false,
        });
        ledger
    }

    /// Creates a ledger whose every call fails.
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_config(MockConfig::failure(message))
    }

    pub fn add_token(&self, info: TokenInfo) {
        self.state.lock().unwrap().tokens.insert(info.id, info);
    }

    /// Marks `address` as controlled by the wallet.
    pub fn add_wallet_address(&self, address: DomainAddress) {
        self.state.lock().unwrap().wallet.insert(address);
    }

    /// Adds to an account balance.
    pub fn credit(&self, address: DomainAddress, domain: Domain, token_id: u32, amount: Amount) {
        let mut state = self.state.lock().unwrap();
        let entry = state
            .balances
            .entry((address, domain, token_id))
            .or_insert(Amount::ZERO);
        *entry = entry.checked_add(amount).unwrap();
    }

    /// Creates a spendable coin locked to `address`.
    pub fn fund(&self, address: DomainAddress, value: Amount) -> OutPoint {
        let mut state = self.state.lock().unwrap();
        state.funding_nonce += 1;
        let mut txid = [0u8; 32];
        txid[..8].copy_from_slice(&state.funding_nonce.to_le_bytes());
        let outpoint = OutPoint { txid, vout: 0 };
        state.utxos.insert(
            outpoint,
            UnspentOutput {
                outpoint,
                value,
                script_pubkey: address.script(),
            },
        );
        outpoint
    }

    pub fn balance(&self, address: &DomainAddress, domain: Domain, token_id: u32) -> Amount {
        self.state
            .lock()
            .unwrap()
            .balances
            .get(&(*address, domain, token_id))
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    /// Transactions accepted so far, in order.
    pub fn submitted_transactions(&self) -> Vec<Transaction> {
        self.state.lock().unwrap().submitted.clone()
    }

    pub fn utxo_count(&self) -> usize {
        self.state.lock().unwrap().utxos.len()
    }

    /// Gets the number of times any trait method was called.
    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Sets the health status.
    pub fn set_healthy(&self, healthy: bool) {
        self.is_healthy.store(healthy, Ordering::Relaxed);
    }

    async fn enter(&self) -> Result<(), AppError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        if let Some(ms) = self.config.latency_ms {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        if self.config.should_fail {
            let msg = self
                .config
                .error_message
                .clone()
                .unwrap_or_else(|| "Mock ledger error".to_string());
            return Err(AppError::Blockchain(BlockchainError::Connection(msg)));
        }
        Ok(())
    }

    /// Consensus checks the node applies to a transfer-domain transaction.
    fn check_transfer(
        state: &LedgerState,
        tx: &Transaction,
        payload: &TransferDomainPayload,
    ) -> Result<(), BlockchainError> {
        let reject = |message: String| BlockchainError::Rejected {
            code: -26,
            message: format!("TransferDomainTx: {message} (code 16)"),
        };
        for item in payload.items() {
            let (src, dst) = (&item.src, &item.dst);
            if src.domain == dst.domain {
                return Err(reject("Cannot transfer inside same domain".to_string()));
            }
            if src.amount.token_id != dst.amount.token_id {
                return Err(reject(
                    "Source token and destination token must be the same".to_string(),
                ));
            }
            if src.amount.amount != dst.amount.amount {
                return Err(reject(
                    "Source amount must be equal to destination amount".to_string(),
                ));
            }
            if !state
                .tokens
                .get(&src.amount.token_id)
                .is_some_and(TokenInfo::is_transferable)
            {
                return Err(reject(
                    "Non-DAT or LP tokens are not supported for transferdomain".to_string(),
                ));
            }
            if !src.address.compatible_with(src.domain) {
                return Err(reject(format!(
                    "Src address must be {} in case of \"{}\" domain",
                    src.domain.address_requirement(),
                    src.domain
                )));
            }
            if !dst.address.compatible_with(dst.domain) {
                return Err(reject(format!(
                    "Dst address must be {} in case of \"{}\" domain",
                    dst.domain.address_requirement(),
                    dst.domain
                )));
            }
            if src.domain == Domain::Dvm {
                let src_script = src.address.script();
                let authorized = tx.inputs.iter().any(|input| {
                    state
                        .utxos
                        .get(&input.previous_output)
                        .is_some_and(|coin| coin.script_pubkey == src_script)
                });
                if !authorized {
                    return Err(reject(
                        "tx must have at least one input from account owner".to_string(),
                    ));
                }
            }
            let available = state
                .balances
                .get(&(src.address, src.domain, src.amount.token_id))
                .copied()
                .unwrap_or(Amount::ZERO);
            if available < src.amount.amount {
                return Err(reject(format!(
                    "amount {available} is less than {}",
                    src.amount.amount
                )));
            }
        }
        Ok(())
    }

    fn apply_transfer(state: &mut LedgerState, payload: &TransferDomainPayload) {
        for item in payload.items() {
            let token = item.src.amount.token_id;
            let amount = item.src.amount.amount;
            let src = state
                .balances
                .entry((item.src.address, item.src.domain, token))
                .or_insert(Amount::ZERO);
            *src = src.checked_sub(amount).unwrap_or(Amount::ZERO);
            let dst = state
                .balances
                .entry((item.dst.address, item.dst.domain, token))
                .or_insert(Amount::ZERO);
            *dst = dst.checked_add(amount).unwrap_or(*dst);
        }
    }
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccountLookup for MockLedger {
    async fn balance_of(
        &self,
        address: &DomainAddress,
        domain: Domain,
        token_id: u32,
    ) -> Result<Amount, AppError> {
        self.enter().await?;
        Ok(self.balance(address, domain, token_id))
    }

    async fn owns_address(&self, address: &DomainAddress) -> Result<bool, AppError> {
        self.enter().await?;
        Ok(self.state.lock().unwrap().wallet.contains(address))
    }

    async fn get_token(&self, token_id: u32) -> Result<Option<TokenInfo>, AppError> {
        self.enter().await?;
        Ok(self.state.lock().unwrap().tokens.get(&token_id).cloned())
    }

    async fn token_balances(&self, include_evm: bool) -> Result<Vec<TokenBalance>, AppError> {
        self.enter().await?;
        let state = self.state.lock().unwrap();
        let mut totals: BTreeMap<u32, Amount> = BTreeMap::new();
        for ((address, domain, token_id), amount) in &state.balances {
            if !state.wallet.contains(address) || (*domain == Domain::Evm && !include_evm) {
                continue;
            }
            let total = totals.entry(*token_id).or_insert(Amount::ZERO);
            *total = total.checked_add(*amount).unwrap_or(*total);
        }
        Ok(totals
            .into_iter()
            .map(|(token_id, amount)| TokenBalance { token_id, amount })
            .collect())
    }
}

#[async_trait]
impl FundingProvider for MockLedger {
    async fn select_inputs(
        &self,
        required: Amount,
        _domain: Domain,
        owners: &[DomainAddress],
    ) -> Result<Vec<UnspentOutput>, AppError> {
        self.enter().await?;
        let state = self.state.lock().unwrap();
        let owner_scripts: Vec<Vec<u8>> = owners.iter().map(DomainAddress::script).collect();

        let mut coins: Vec<&UnspentOutput> = state
            .utxos
            .values()
            .filter(|coin| {
                DomainAddress::from_script(&coin.script_pubkey)
                    .is_some_and(|address| state.wallet.contains(&address))
            })
            .collect();
        // owner coins first
        coins.sort_by_key(|coin| !owner_scripts.contains(&coin.script_pubkey));

        let mut selected = Vec::new();
        let mut total = Amount::ZERO;
        for coin in coins {
            if total >= required && !selected.is_empty() {
                break;
            }
            total = total.checked_add(coin.value).unwrap_or(total);
            selected.push(coin.clone());
        }
        if total < required || selected.is_empty() {
            return Err(AppError::Blockchain(BlockchainError::InsufficientFunds {
                required,
                available: total,
            }));
        }
        Ok(selected)
    }

    async fn fee_rate(&self) -> Result<Amount, AppError> {
        self.enter().await?;
        Ok(self.fee_rate)
    }
}

#[async_trait]
impl TransactionSigner for MockLedger {
    async fn sign(&self, unsigned: UnsignedTransaction) -> Result<SignedTransaction, AppError> {
        self.enter().await?;
        let mut tx = unsigned.tx.clone();
        {
            let state = self.state.lock().unwrap();
            for (input, coin) in tx.inputs.iter_mut().zip(&unsigned.prevouts) {
                let owner = DomainAddress::from_script(&coin.script_pubkey)
                    .filter(|address| state.wallet.contains(address))
                    .ok_or_else(|| {
                        BlockchainError::SigningFailed(format!(
                            "no key for input {}",
                            coin.outpoint
                        ))
                    })?;
                match owner {
                    DomainAddress::Segwit { .. } => {
                        input.witness = vec![vec![0x30; 72], vec![0x02; 33]];
                    }
                    _ => {
                        input.script_sig =
                            [vec![0x48], vec![0x30; 72], vec![0x21], vec![0x02; 33]].concat();
                    }
                }
            }
        }
        Ok(unsigned.into_signed(tx)?)
    }
}

#[async_trait]
impl NetworkSubmitter for MockLedger {
    async fn submit_raw(&self, raw: &[u8]) -> Result<TransactionId, AppError> {
        self.enter().await?;
        if let Some((code, message)) = &self.config.rejection {
            return Err(AppError::Blockchain(BlockchainError::Rejected {
                code: *code,
                message: message.clone(),
            }));
        }

        let tx = Transaction::from_bytes(raw)?;
        let mut state = self.state.lock().unwrap();
        for input in &tx.inputs {
            if !state.utxos.contains_key(&input.previous_output) {
                return Err(AppError::Blockchain(BlockchainError::Rejected {
                    code: -25,
                    message: "bad-txns-inputs-missingorspent".to_string(),
                }));
            }
            if input.witness.is_empty() && input.script_sig.is_empty() {
                return Err(AppError::Blockchain(BlockchainError::Rejected {
                    code: -26,
                    message: "mandatory-script-verify-flag-failed (Operation not valid with the current stack size) (code 16)".to_string(),
                }));
            }
        }

        let payload = tx
            .outputs
            .first()
            .and_then(|marker| codec::decode(&marker.script_pubkey).ok());
        if let Some(payload) = &payload {
            Self::check_transfer(&state, &tx, payload).map_err(AppError::Blockchain)?;
            Self::apply_transfer(&mut state, payload);
        }

        let txid = tx.txid();
        for input in &tx.inputs {
            state.utxos.remove(&input.previous_output);
        }
        for (vout, output) in tx.outputs.iter().enumerate() {
            if output.script_pubkey.first() == Some(&codec::OP_RETURN) {
                continue;
            }
            let outpoint = OutPoint::from_display_hex(&txid, vout as u32)?;
            state.utxos.insert(
                outpoint,
                UnspentOutput {
                    outpoint,
                    value: output.value,
                    script_pubkey: output.script_pubkey.clone(),
                },
            );
        }
        state.height += 1;
        state.submitted.push(tx);
        Ok(txid)
    }

    async fn health_check(&self) -> Result<(), AppError> {
        self.enter().await?;
        if !self.is_healthy.load(Ordering::Relaxed) {
            return Err(AppError::Blockchain(BlockchainError::Connection(
                "Mock node unhealthy".to_string(),
            )));
        }
        Ok(())
    }

    async fn get_block_height(&self) -> Result<u64, AppError> {
        self.enter().await?;
        Ok(self.state.lock().unwrap().height)
    }

    async fn send_transfer_domain(
        &self,
        payload: &TransferDomainPayload,
    ) -> Result<TransactionId, AppError> {
        self.enter().await?;
        if let Some((code, message)) = &self.config.rejection {
            return Err(AppError::Blockchain(BlockchainError::Rejected {
                code: *code,
                message: message.clone(),
            }));
        }
        let mut state = self.state.lock().unwrap();
        // node-side construction spends an owner coin of its own choosing
        let owner_input = payload
            .items()
            .iter()
            .filter(|item| item.src.domain == Domain::Dvm)
            .map(|item| item.src.address.script())
            .find_map(|script| {
                state
                    .utxos
                    .values()
                    .find(|coin| coin.script_pubkey == script)
                    .map(|coin| coin.outpoint)
            });
        let mut inputs = Vec::new();
        if let Some(outpoint) = owner_input {
            inputs.push(TxIn::unsigned(outpoint));
        }
        let tx = Transaction::new(
            inputs,
            vec![TxOut {
                value: Amount::ZERO,
                script_pubkey: codec::encode(payload).into_bytes(),
                token_id: 0,
            }],
        );
        Self::check_transfer(&state, &tx, payload).map_err(AppError::Blockchain)?;
        Self::apply_transfer(&mut state, payload);
        state.height += 1;
        let txid = tx.txid();
        state.submitted.push(tx);
        Ok(txid)
    }
}
