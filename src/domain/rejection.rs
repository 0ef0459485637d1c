//! Maps node rejection text back onto the error taxonomy.
//!
//! Patterns follow the node's consensus messages. The order of the table
//! matters only where two messages could overlap; the first match wins.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::error::{SubmissionError, TransferDomainError};
use super::types::{Amount, Domain};

type Build = fn(&Captures<'_>) -> TransferDomainError;

static PATTERNS: LazyLock<Vec<(Regex, Build)>> = LazyLock::new(|| {
    let table: [(&str, Build); 11] = [
        (r"Amount out of range(?::\s*(\S+))?", |c| {
            TransferDomainError::AmountOutOfRange {
                value: c.get(1).map_or_else(String::new, |m| m.as_str().to_string()),
            }
        }),
        (
            r"recipient \((.*)\) does not refer to any valid address",
            |c| TransferDomainError::InvalidAddress {
                address: c[1].to_string(),
            },
        ),
        (r"Cannot transfer inside same domain", |_| {
            TransferDomainError::SameDomainTransfer { domain: None }
        }),
        (r"Source token and destination token must be the same", |_| {
            TransferDomainError::TokenMismatch {
                src: None,
                dst: None,
            }
        }),
        (r"Source amount must be equal to destination amount", |_| {
            TransferDomainError::AmountMismatch {
                src: None,
                dst: None,
            }
        }),
        (r"Non-DAT or LP tokens are not supported", |_| {
            TransferDomainError::UnsupportedToken { token_id: None }
        }),
        (r#"Src address must be .* in case of "(DVM|EVM)" domain"#, |c| {
            TransferDomainError::SrcDomainAddressMismatch {
                expected: parse_domain(&c[1]),
            }
        }),
        (r#"Dst address must be .* in case of "(DVM|EVM)" domain"#, |c| {
            TransferDomainError::DstDomainAddressMismatch {
                expected: parse_domain(&c[1]),
            }
        }),
        (r"tx must have at least one input from account owner", |_| {
            TransferDomainError::NotOwner { address: None }
        }),
        (r"amount ([0-9.]+) is less than ([0-9.]+)", |c| {
            TransferDomainError::InsufficientBalance {
                domain: Domain::Dvm,
                address: None,
                required: c[2].parse::<Amount>().ok(),
                available: c[1].parse::<Amount>().ok(),
            }
        }),
        (
            r#"Not enough balance in (\S+) to cover "(DVM|EVM)" domain transfer"#,
            |c| TransferDomainError::InsufficientBalance {
                domain: parse_domain(&c[2]),
                address: Some(c[1].to_string()),
                required: None,
                available: None,
            },
        ),
    ];
    table
        .into_iter()
        .map(|(pattern, build)| (Regex::new(pattern).expect("static rejection pattern"), build))
        .collect()
});

static CODE_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(code (-?\d+)\)\s*$").expect("static code pattern"));

fn parse_domain(tag: &str) -> Domain {
    if tag == "EVM" { Domain::Evm } else { Domain::Dvm }
}

/// Classifies raw rejection text. Unrecognised text becomes `NetworkRejected`.
pub fn map_rejection(code: Option<i64>, message: &str) -> TransferDomainError {
    PATTERNS
        .iter()
        .find_map(|(re, build)| re.captures(message).map(|c| build(&c)))
        .unwrap_or_else(|| TransferDomainError::NetworkRejected {
            code: code.or_else(|| consensus_code(message)),
            message: message.to_string(),
        })
}

/// Builds the full submission error, keeping the node's text untouched.
pub fn to_submission_error(code: Option<i64>, message: &str) -> SubmissionError {
    SubmissionError {
        kind: map_rejection(code, message),
        code,
        raw: message.to_string(),
    }
}

/// Extracts the trailing `(code N)` consensus reject code, if present.
fn consensus_code(message: &str) -> Option<i64> {
    CODE_SUFFIX
        .captures(message)
        .and_then(|c| c[1].parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::COIN;

    #[test]
    fn test_all_patterns_compile() {
        assert_eq!(PATTERNS.len(), 11);
        assert!(CODE_SUFFIX.is_match("(code 16)"));
    }

    #[test]
    fn test_same_domain() {
        let err = map_rejection(
            Some(-26),
            "TransferDomainTx: Cannot transfer inside same domain (code 16)",
        );
        assert!(matches!(err, TransferDomainError::SameDomainTransfer { .. }));
    }

    #[test]
    fn test_token_and_amount_mismatch() {
        assert!(matches!(
            map_rejection(
                None,
                "TransferDomainTx: Source token and destination token must be the same (code 16)"
            ),
            TransferDomainError::TokenMismatch { .. }
        ));
        assert!(matches!(
            map_rejection(
                None,
                "TransferDomainTx: Source amount must be equal to destination amount (code 16)"
            ),
            TransferDomainError::AmountMismatch { .. }
        ));
    }

    #[test]
    fn test_domain_address_mismatch_carries_domain() {
        let err = map_rejection(
            None,
            "TransferDomainTx: Dst address must be an ERC55 address in case of \"EVM\" domain (code 16)",
        );
        assert_eq!(
            err,
            TransferDomainError::DstDomainAddressMismatch {
                expected: Domain::Evm
            }
        );

        let err = map_rejection(
            None,
            "TransferDomainTx: Src address must be a legacy or Bech32 address in case of \"DVM\" domain (code 16)",
        );
        assert_eq!(
            err,
            TransferDomainError::SrcDomainAddressMismatch {
                expected: Domain::Dvm
            }
        );
    }

    #[test]
    fn test_insufficient_balance_extracts_amounts() {
        let err = map_rejection(
            Some(-32600),
            "Test TransferDomainTx execution failed:\namount 100.00000000 is less than 999.00000000",
        );
        assert_eq!(
            err,
            TransferDomainError::InsufficientBalance {
                domain: Domain::Dvm,
                address: None,
                required: Some(Amount::from_units(999 * COIN).unwrap()),
                available: Some(Amount::from_units(100 * COIN).unwrap()),
            }
        );
    }

    #[test]
    fn test_insufficient_evm_balance() {
        let err = map_rejection(
            None,
            "TransferDomainTx: Not enough balance in 0xabc to cover \"EVM\" domain transfer (code 16)",
        );
        assert!(matches!(
            err,
            TransferDomainError::InsufficientBalance {
                domain: Domain::Evm,
                address: Some(ref a),
                ..
            } if a == "0xabc"
        ));
    }

    #[test]
    fn test_invalid_address_and_not_owner() {
        assert_eq!(
            map_rejection(None, "recipient (xyz) does not refer to any valid address"),
            TransferDomainError::InvalidAddress {
                address: "xyz".to_string()
            }
        );
        assert!(matches!(
            map_rejection(
                None,
                "TransferDomainTx: tx must have at least one input from account owner (code 16)"
            ),
            TransferDomainError::NotOwner { .. }
        ));
    }

    #[test]
    fn test_unsupported_token_and_amount_range() {
        assert!(matches!(
            map_rejection(
                None,
                "TransferDomainTx: Non-DAT or LP tokens are not supported for transferdomain (code 16)"
            ),
            TransferDomainError::UnsupportedToken { .. }
        ));
        let err = map_rejection(Some(-3), "Amount out of range");
        assert!(matches!(err, TransferDomainError::AmountOutOfRange { .. }));
        assert_eq!(err.to_string(), "Amount out of range");
    }

    #[test]
    fn test_amount_out_of_range_keeps_node_value() {
        let err = map_rejection(Some(-3), "Amount out of range: -1.00000000");
        assert_eq!(
            err,
            TransferDomainError::AmountOutOfRange {
                value: "-1.00000000".to_string()
            }
        );
        assert_eq!(err.to_string(), "Amount out of range: -1.00000000");
    }

    #[test]
    fn test_unrecognised_text_is_preserved() {
        let err = map_rejection(None, "bad-txns-inputs-missingorspent (code 16)");
        assert_eq!(
            err,
            TransferDomainError::NetworkRejected {
                code: Some(16),
                message: "bad-txns-inputs-missingorspent (code 16)".to_string(),
            }
        );

        let err = map_rejection(Some(-25), "Missing inputs");
        assert!(matches!(
            err,
            TransferDomainError::NetworkRejected { code: Some(-25), .. }
        ));
    }

    #[test]
    fn test_submission_error_keeps_raw_text() {
        let raw = "TransferDomainTx: Cannot transfer inside same domain (code 16)";
        let err = to_submission_error(Some(-26), raw);
        assert_eq!(err.raw, raw);
        assert_eq!(err.code, Some(-26));
        assert_eq!(err.kind.kind(), "same_domain_transfer");
    }
}
