//! Wraps an encoded payload into a funded, signed transaction.
//!
//! Output layout is fixed: output 0 is the zero-value marker carrying the
//! payload, output 1 returns the change. Coins come from the
//! [`FundingProvider`] and signatures from the [`TransactionSigner`]; the
//! assembler only arranges them and checks the result.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::domain::{
    AppError, Amount, BlockchainError, Domain, DomainAddress, FundingProvider, Network,
    SignedTransaction, Transaction, TransactionSigner, TransferDomainError, TransferDomainPayload,
    TxIn, TxOut, UnsignedTransaction, UnspentOutput, ValidationError, codec,
};

/// Smallest amount requested from the funding provider (0.001 DFI).
pub const MIN_FUNDING: i64 = 100_000;

// signature + pubkey, discounted as witness data, plus the segwit marker
const P2WPKH_WITNESS_VBYTES: usize = 28;
const P2PKH_SCRIPT_SIG_BYTES: usize = 107;

pub struct TransactionAssembler {
    funding: Arc<dyn FundingProvider>,
    signer: Arc<dyn TransactionSigner>,
    network: Network,
}

impl TransactionAssembler {
    #[must_use]
    pub fn new(
        funding: Arc<dyn FundingProvider>,
        signer: Arc<dyn TransactionSigner>,
        network: Network,
    ) -> Self {
        Self {
            funding,
            signer,
            network,
        }
    }

    /// Builds and signs the transfer transaction.
    ///
    /// # Errors
    ///
    /// - `ValidationError` if `change_address` is not a DVM address
    /// - `TransferDomainError::NotOwner` if no selected coin belongs to a DVM source
    /// - `BlockchainError::InsufficientFunds` if the coins cannot cover the fee
    /// - any error from the funding or signing collaborators
    #[instrument(skip_all, fields(items = payload.items().len()))]
    pub async fn build(
        &self,
        payload: &TransferDomainPayload,
        change_address: &DomainAddress,
    ) -> Result<SignedTransaction, AppError> {
        if !change_address.compatible_with(Domain::Dvm) {
            return Err(ValidationError::InvalidField {
                field: "change_address".to_string(),
                message: format!(
                    "{} is not {}",
                    change_address.render(self.network),
                    Domain::Dvm.address_requirement()
                ),
            }
            .into());
        }

        let marker = TxOut {
            value: Amount::ZERO,
            script_pubkey: codec::encode(payload).into_bytes(),
            token_id: 0,
        };
        let owners = dvm_sources(payload);
        let fee_rate = self.funding.fee_rate().await?;

        let mut required = Amount::from_units(MIN_FUNDING)?;
        let mut available = Amount::ZERO;
        for _ in 0..2 {
            let coins = self
                .funding
                .select_inputs(required, Domain::Dvm, &owners)
                .await?;
            self.check_owner_inputs(&owners, &coins)?;

            available = coins
                .iter()
                .try_fold(Amount::ZERO, |acc, coin| acc.checked_add(coin.value))
                .ok_or_else(|| AppError::Internal("selected coin value overflows".to_string()))?;
            let mut tx = Transaction::new(
                coins.iter().map(|coin| TxIn::unsigned(coin.outpoint)).collect(),
                vec![
                    marker.clone(),
                    TxOut {
                        value: Amount::ZERO,
                        script_pubkey: change_address.script(),
                        token_id: 0,
                    },
                ],
            );
            let fee = estimate_fee(&tx, &coins, fee_rate)?;
            debug!(%fee, %available, inputs = coins.len(), "Estimated fee");

            let Some(change) = available.checked_sub(fee) else {
                required = fee;
                continue;
            };
            tx.outputs[1].value = change;
            let expected_outputs = tx.outputs.clone();

            let signed = self
                .signer
                .sign(UnsignedTransaction { tx, prevouts: coins })
                .await?;
            if signed.tx.outputs != expected_outputs {
                return Err(BlockchainError::SigningFailed(
                    "signer altered transaction outputs".to_string(),
                )
                .into());
            }
            info!(txid = %signed.txid(), %fee, "Transfer domain transaction assembled");
            return Ok(signed);
        }

        Err(BlockchainError::InsufficientFunds {
            required,
            available,
        }
        .into())
    }

    fn check_owner_inputs(
        &self,
        owners: &[DomainAddress],
        coins: &[UnspentOutput],
    ) -> Result<(), AppError> {
        for owner in owners {
            let script = owner.script();
            if !coins.iter().any(|coin| coin.script_pubkey == script) {
                return Err(TransferDomainError::NotOwner {
                    address: Some(owner.render(self.network)),
                }
                .into());
            }
        }
        Ok(())
    }
}

/// DVM source addresses, each listed once, in payload order.
fn dvm_sources(payload: &TransferDomainPayload) -> Vec<DomainAddress> {
    let mut owners: Vec<DomainAddress> = Vec::new();
    for item in payload.items() {
        if item.src.domain == Domain::Dvm && !owners.contains(&item.src.address) {
            owners.push(item.src.address);
        }
    }
    owners
}

/// Fee for `tx` once every input is signed, at `fee_rate` per 1000 vbytes.
fn estimate_fee(
    tx: &Transaction,
    coins: &[UnspentOutput],
    fee_rate: Amount,
) -> Result<Amount, AppError> {
    let signatures: usize = coins
        .iter()
        .map(|coin| match DomainAddress::from_script(&coin.script_pubkey) {
            Some(DomainAddress::Segwit { .. }) => P2WPKH_WITNESS_VBYTES,
            _ => P2PKH_SCRIPT_SIG_BYTES,
        })
        .sum();
    let vsize = (tx.vsize() + signatures) as i64;
    let units = vsize
        .checked_mul(fee_rate.units())
        .and_then(|total| total.checked_add(999))
        .map(|total| total / 1000)
        .ok_or_else(|| TransferDomainError::AmountOutOfRange {
            value: format!("fee for {vsize} vbytes at {fee_rate} per kvB"),
        })?;
    Ok(Amount::from_units(units)?)
}
