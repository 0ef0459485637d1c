//! Client-side precondition checks for transfer items.
//!
//! The rules mirror the node's consensus checks and run in the node's
//! order, so the first failure reported here is the one the network would
//! have reported.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::domain::{
    AccountLookup, AppError, Domain, Network, TransferDomainError, TransferDomainPayload,
    TransferItem,
};

use super::service::with_timeout;

/// One precondition, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    DistinctDomains,
    SameToken,
    SameAmount,
    SupportedToken,
    SrcAddressMatchesDomain,
    DstAddressMatchesDomain,
    SourceOwnership,
    SufficientBalance,
}

pub const RULES: [Rule; 8] = [
    Rule::DistinctDomains,
    Rule::SameToken,
    Rule::SameAmount,
    Rule::SupportedToken,
    Rule::SrcAddressMatchesDomain,
    Rule::DstAddressMatchesDomain,
    Rule::SourceOwnership,
    Rule::SufficientBalance,
];

impl Rule {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Rule::DistinctDomains => "distinct_domains",
            Rule::SameToken => "same_token",
            Rule::SameAmount => "same_amount",
            Rule::SupportedToken => "supported_token",
            Rule::SrcAddressMatchesDomain => "src_address_matches_domain",
            Rule::DstAddressMatchesDomain => "dst_address_matches_domain",
            Rule::SourceOwnership => "source_ownership",
            Rule::SufficientBalance => "sufficient_balance",
        }
    }
}

/// Applies [`RULES`] to every item of a payload.
pub struct PreconditionValidator {
    lookup: Arc<dyn AccountLookup>,
    network: Network,
    lookup_timeout: Duration,
}

impl PreconditionValidator {
    #[must_use]
    pub fn new(lookup: Arc<dyn AccountLookup>, network: Network, lookup_timeout: Duration) -> Self {
        Self {
            lookup,
            network,
            lookup_timeout,
        }
    }

    /// Validates items in order and stops at the first failing item.
    ///
    /// # Errors
    ///
    /// `AppError::TransferDomain` carrying the first failed rule's error,
    /// or the lookup collaborator's error if a lookup fails or times out.
    #[instrument(skip(self, payload), fields(items = payload.items().len()))]
    pub async fn validate(&self, payload: &TransferDomainPayload) -> Result<(), AppError> {
        for (index, item) in payload.items().iter().enumerate() {
            self.validate_item(item).await.inspect_err(|e| {
                warn!(item = index, error = %e, "Transfer item failed precondition");
            })?;
        }
        Ok(())
    }

    /// Runs every rule against one item; the first failure wins.
    pub async fn validate_item(&self, item: &TransferItem) -> Result<(), AppError> {
        for rule in RULES {
            self.check(rule, item).await?;
            debug!(rule = rule.name(), "Precondition passed");
        }
        Ok(())
    }

    async fn check(&self, rule: Rule, item: &TransferItem) -> Result<(), AppError> {
        let (src, dst) = (&item.src, &item.dst);
        let failure = match rule {
            Rule::DistinctDomains => (src.domain == dst.domain).then_some(
                TransferDomainError::SameDomainTransfer {
                    domain: Some(src.domain),
                },
            ),
            Rule::SameToken => (src.amount.token_id != dst.amount.token_id).then_some(
                TransferDomainError::TokenMismatch {
                    src: Some(src.amount.token_id),
                    dst: Some(dst.amount.token_id),
                },
            ),
            Rule::SameAmount => (src.amount.amount != dst.amount.amount).then_some(
                TransferDomainError::AmountMismatch {
                    src: Some(src.amount.amount),
                    dst: Some(dst.amount.amount),
                },
            ),
            Rule::SupportedToken => {
                let token_id = src.amount.token_id;
                let token = with_timeout(
                    self.lookup_timeout,
                    "get_token",
                    self.lookup.get_token(token_id),
                )
                .await?;
                (!token.is_some_and(|t| t.is_transferable())).then_some(
                    TransferDomainError::UnsupportedToken {
                        token_id: Some(token_id),
                    },
                )
            }
            Rule::SrcAddressMatchesDomain => (!src.address.compatible_with(src.domain)).then_some(
                TransferDomainError::SrcDomainAddressMismatch {
                    expected: src.domain,
                },
            ),
            Rule::DstAddressMatchesDomain => (!dst.address.compatible_with(dst.domain)).then_some(
                TransferDomainError::DstDomainAddressMismatch {
                    expected: dst.domain,
                },
            ),
            Rule::SourceOwnership if src.domain == Domain::Dvm => {
                let owned = with_timeout(
                    self.lookup_timeout,
                    "owns_address",
                    self.lookup.owns_address(&src.address),
                )
                .await?;
                (!owned).then(|| TransferDomainError::NotOwner {
                    address: Some(src.address.render(self.network)),
                })
            }
            Rule::SourceOwnership => None,
            Rule::SufficientBalance => {
                let required = src.amount.amount;
                let available = with_timeout(
                    self.lookup_timeout,
                    "balance_of",
                    self.lookup
                        .balance_of(&src.address, src.domain, src.amount.token_id),
                )
                .await?;
                (available < required).then(|| TransferDomainError::InsufficientBalance {
                    domain: src.domain,
                    address: Some(src.address.render(self.network)),
                    required: Some(required),
                    available: Some(available),
                })
            }
        };
        match failure {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Amount, COIN, DomainAddress, TokenAmount, TokenInfo, TransferLeg};
    use crate::test_utils::MockLedger;

    const DVM: DomainAddress = DomainAddress::Legacy {
        pubkey_hash: [0x01; 20],
    };
    const EVM: DomainAddress = DomainAddress::Evm {
        address: [0x02; 20],
    };

    fn amount(whole: i64, token_id: u32) -> TokenAmount {
        TokenAmount::new(token_id, Amount::from_units(whole * COIN).unwrap()).unwrap()
    }

    fn item(
        src: (DomainAddress, Domain, TokenAmount),
        dst: (DomainAddress, Domain, TokenAmount),
    ) -> TransferItem {
        TransferItem::new(
            TransferLeg::new(src.0, src.2, src.1),
            TransferLeg::new(dst.0, dst.2, dst.1),
        )
    }

    fn funded_ledger() -> Arc<MockLedger> {
        let ledger = Arc::new(MockLedger::new());
        ledger.add_wallet_address(DVM);
        ledger.add_wallet_address(EVM);
        ledger.credit(DVM, Domain::Dvm, 0, Amount::from_units(100 * COIN).unwrap());
        ledger
    }

    fn validator(ledger: Arc<MockLedger>) -> PreconditionValidator {
        PreconditionValidator::new(ledger, Network::Regtest, Duration::from_secs(5))
    }

    async fn run(item: TransferItem) -> Result<(), AppError> {
        validator(funded_ledger()).validate_item(&item).await
    }

    #[tokio::test]
    async fn test_valid_dvm_to_evm_passes() {
        let result = run(item(
            (DVM, Domain::Dvm, amount(3, 0)),
            (EVM, Domain::Evm, amount(3, 0)),
        ))
        .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_same_domain_wins_over_everything() {
        // every later rule would also fail here
        let result = run(item(
            (EVM, Domain::Dvm, amount(999, 7)),
            (DVM, Domain::Dvm, amount(1, 0)),
        ))
        .await;
        assert!(matches!(
            result,
            Err(AppError::TransferDomain(
                TransferDomainError::SameDomainTransfer { .. }
            ))
        ));
    }

    #[tokio::test]
    async fn test_token_mismatch() {
        let result = run(item(
            (DVM, Domain::Dvm, amount(3, 0)),
            (EVM, Domain::Evm, amount(3, 1)),
        ))
        .await;
        assert!(matches!(
            result,
            Err(AppError::TransferDomain(TransferDomainError::TokenMismatch {
                src: Some(0),
                dst: Some(1)
            }))
        ));
    }

    #[tokio::test]
    async fn test_amount_mismatch() {
        let result = run(item(
            (DVM, Domain::Dvm, amount(3, 0)),
            (EVM, Domain::Evm, amount(4, 0)),
        ))
        .await;
        assert!(matches!(
            result,
            Err(AppError::TransferDomain(
                TransferDomainError::AmountMismatch { .. }
            ))
        ));
    }

    #[tokio::test]
    async fn test_unknown_and_lp_tokens_unsupported() {
        let ledger = funded_ledger();
        ledger.add_token(TokenInfo {
            id: 5,
            symbol: "BTC-DFI".to_string(),
            is_dat: true,
            is_lps: true,
        });
        let validator = validator(ledger);

        for token_id in [5, 42] {
            let result = validator
                .validate_item(&item(
                    (DVM, Domain::Dvm, amount(1, token_id)),
                    (EVM, Domain::Evm, amount(1, token_id)),
                ))
                .await;
            assert!(matches!(
                result,
                Err(AppError::TransferDomain(
                    TransferDomainError::UnsupportedToken { token_id: Some(id) }
                )) if id == token_id
            ));
        }
    }

    #[tokio::test]
    async fn test_src_address_must_match_domain() {
        let result = run(item(
            (EVM, Domain::Dvm, amount(3, 0)),
            (EVM, Domain::Evm, amount(3, 0)),
        ))
        .await;
        assert!(matches!(
            result,
            Err(AppError::TransferDomain(
                TransferDomainError::SrcDomainAddressMismatch {
                    expected: Domain::Dvm
                }
            ))
        ));

        let result = run(item(
            (DVM, Domain::Evm, amount(3, 0)),
            (DVM, Domain::Dvm, amount(3, 0)),
        ))
        .await;
        assert!(matches!(
            result,
            Err(AppError::TransferDomain(
                TransferDomainError::SrcDomainAddressMismatch {
                    expected: Domain::Evm
                }
            ))
        ));
    }

    #[tokio::test]
    async fn test_dst_address_must_match_domain() {
        let result = run(item(
            (DVM, Domain::Dvm, amount(3, 0)),
            (DVM, Domain::Evm, amount(3, 0)),
        ))
        .await;
        assert!(matches!(
            result,
            Err(AppError::TransferDomain(
                TransferDomainError::DstDomainAddressMismatch {
                    expected: Domain::Evm
                }
            ))
        ));
    }

    #[tokio::test]
    async fn test_not_owner_for_dvm_source() {
        let stranger = DomainAddress::Segwit {
            program: [0x09; 20],
        };
        let result = run(item(
            (stranger, Domain::Dvm, amount(3, 0)),
            (EVM, Domain::Evm, amount(3, 0)),
        ))
        .await;
        assert!(matches!(
            result,
            Err(AppError::TransferDomain(TransferDomainError::NotOwner {
                address: Some(_)
            }))
        ));
    }

    #[tokio::test]
    async fn test_ownership_not_required_for_evm_source() {
        let ledger = funded_ledger();
        let foreign_evm = DomainAddress::Evm {
            address: [0x0a; 20],
        };
        ledger.credit(
            foreign_evm,
            Domain::Evm,
            0,
            Amount::from_units(5 * COIN).unwrap(),
        );
        let result = validator(ledger)
            .validate_item(&item(
                (foreign_evm, Domain::Evm, amount(5, 0)),
                (DVM, Domain::Dvm, amount(5, 0)),
            ))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_insufficient_balance_carries_amounts() {
        let result = run(item(
            (DVM, Domain::Dvm, amount(999, 0)),
            (EVM, Domain::Evm, amount(999, 0)),
        ))
        .await;
        match result {
            Err(AppError::TransferDomain(TransferDomainError::InsufficientBalance {
                required,
                available,
                ..
            })) => {
                assert_eq!(required, Some(Amount::from_units(999 * COIN).unwrap()));
                assert_eq!(available, Some(Amount::from_units(100 * COIN).unwrap()));
            }
            other => panic!("expected InsufficientBalance, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_batch_stops_at_first_failing_item() {
        let ledger = funded_ledger();
        let validator = validator(Arc::clone(&ledger));
        let good = item(
            (DVM, Domain::Dvm, amount(1, 0)),
            (EVM, Domain::Evm, amount(1, 0)),
        );
        let bad = item(
            (DVM, Domain::Dvm, amount(1, 0)),
            (DVM, Domain::Dvm, amount(1, 0)),
        );
        let payload = TransferDomainPayload::new(vec![good.clone(), bad, good]).unwrap();

        let calls_before = ledger.call_count();
        let result = validator.validate(&payload).await;
        assert!(matches!(
            result,
            Err(AppError::TransferDomain(
                TransferDomainError::SameDomainTransfer { .. }
            ))
        ));
        // first item: token, ownership, balance lookups; second item fails before any lookup
        assert_eq!(ledger.call_count() - calls_before, 3);
    }

    #[tokio::test]
    async fn test_lookup_failure_propagates() {
        let ledger = Arc::new(MockLedger::failing("node down"));
        let result = validator(ledger)
            .validate_item(&item(
                (DVM, Domain::Dvm, amount(1, 0)),
                (EVM, Domain::Evm, amount(1, 0)),
            ))
            .await;
        assert!(matches!(result, Err(AppError::Blockchain(_))));
    }

    #[test]
    fn test_rule_order() {
        assert_eq!(RULES[0], Rule::DistinctDomains);
        assert_eq!(RULES[7], Rule::SufficientBalance);
        let names: std::collections::HashSet<_> = RULES.iter().map(|r| r.name()).collect();
        assert_eq!(names.len(), RULES.len());
    }
}
