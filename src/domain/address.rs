//! Address classification for the two ledger domains.
//!
//! DVM accepts legacy pay-to-pubkey-hash (base58check) and segwit v0
//! key-hash (bech32) addresses. EVM accepts 20-byte addresses written in
//! the ERC55 mixed-case checksum form. Every accepted address maps to
//! exactly one locking-script template, and that template is what ends up
//! on the wire.

use std::fmt;
use std::str::FromStr;

use bech32::{Fe32, Hrp};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use super::error::TransferDomainError;
use super::types::Domain;

const OP_0: u8 = 0x00;
const OP_16: u8 = 0x60;
const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_CHECKSIG: u8 = 0xac;
const PUSH_20: u8 = 0x14;

/// Chain parameters that affect address rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
    Regtest,
}

impl Network {
    /// Version byte of base58check pay-to-pubkey-hash addresses.
    #[must_use]
    pub const fn pubkey_hash_prefix(self) -> u8 {
        match self {
            Network::Mainnet => 0x12,
            Network::Testnet => 0x0f,
            Network::Regtest => 0x6f,
        }
    }

    #[must_use]
    pub const fn bech32_hrp(self) -> &'static str {
        match self {
            Network::Mainnet => "df",
            Network::Testnet => "tf",
            Network::Regtest => "bcrt",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Regtest => "regtest",
        })
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" | "main" => Ok(Network::Mainnet),
            "testnet" | "test" => Ok(Network::Testnet),
            "regtest" => Ok(Network::Regtest),
            other => Err(format!("unknown network '{other}'")),
        }
    }
}

/// Concrete address representation, independent of payload bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFormat {
    Legacy,
    Bech32,
    Erc55,
}

/// An address in exactly one of the supported representations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomainAddress {
    Legacy { pubkey_hash: [u8; 20] },
    Segwit { program: [u8; 20] },
    Evm { address: [u8; 20] },
}

impl DomainAddress {
    /// Parses an address string, or a locking script given as hex.
    ///
    /// Anything that is not one of the three supported representations,
    /// or that belongs to a different network, is an `InvalidAddress`.
    pub fn classify(raw: &str, network: Network) -> Result<Self, TransferDomainError> {
        let raw = raw.trim();
        let invalid = || TransferDomainError::InvalidAddress {
            address: raw.to_string(),
        };

        if raw.len() == 42 && (raw.starts_with("0x") || raw.starts_with("0X")) {
            return parse_erc55(&raw[2..]).ok_or_else(invalid);
        }
        if let Some(address) = parse_bech32(raw, network) {
            return Ok(address);
        }
        if let Some(address) = parse_base58(raw, network) {
            return Ok(address);
        }
        hex::decode(raw)
            .ok()
            .and_then(|script| Self::from_script(&script))
            .ok_or_else(invalid)
    }

    /// Recognises one of the three locking-script templates.
    #[must_use]
    pub fn from_script(script: &[u8]) -> Option<Self> {
        match script {
            [OP_DUP, OP_HASH160, PUSH_20, hash @ .., OP_EQUALVERIFY, OP_CHECKSIG]
                if hash.len() == 20 =>
            {
                Some(DomainAddress::Legacy {
                    pubkey_hash: hash.try_into().ok()?,
                })
            }
            [OP_0, PUSH_20, program @ ..] if program.len() == 20 => Some(DomainAddress::Segwit {
                program: program.try_into().ok()?,
            }),
            [OP_16, PUSH_20, address @ ..] if address.len() == 20 => Some(DomainAddress::Evm {
                address: address.try_into().ok()?,
            }),
            _ => None,
        }
    }

    /// The locking script this address resolves to.
    #[must_use]
    pub fn script(&self) -> Vec<u8> {
        match self {
            DomainAddress::Legacy { pubkey_hash } => {
                let mut script = Vec::with_capacity(25);
                script.extend_from_slice(&[OP_DUP, OP_HASH160, PUSH_20]);
                script.extend_from_slice(pubkey_hash);
                script.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
                script
            }
            DomainAddress::Segwit { program } => prefixed(OP_0, program),
            DomainAddress::Evm { address } => prefixed(OP_16, address),
        }
    }

    #[must_use]
    pub fn format(&self) -> AddressFormat {
        match self {
            DomainAddress::Legacy { .. } => AddressFormat::Legacy,
            DomainAddress::Segwit { .. } => AddressFormat::Bech32,
            DomainAddress::Evm { .. } => AddressFormat::Erc55,
        }
    }

    /// Whether this representation is legal for `domain`.
    #[must_use]
    pub fn compatible_with(&self, domain: Domain) -> bool {
        match domain {
            Domain::Dvm => matches!(
                self,
                DomainAddress::Legacy { .. } | DomainAddress::Segwit { .. }
            ),
            Domain::Evm => matches!(self, DomainAddress::Evm { .. }),
        }
    }

    /// Renders the address in its canonical text form for `network`.
    #[must_use]
    pub fn render(&self, network: Network) -> String {
        match self {
            DomainAddress::Legacy { pubkey_hash } => {
                let mut payload = Vec::with_capacity(21);
                payload.push(network.pubkey_hash_prefix());
                payload.extend_from_slice(pubkey_hash);
                bs58::encode(payload).with_check().into_string()
            }
            DomainAddress::Segwit { program } => {
                let hrp = Hrp::parse_unchecked(network.bech32_hrp());
                bech32::segwit::encode_v0(hrp, program)
                    .unwrap_or_else(|_| hex::encode(self.script()))
            }
            DomainAddress::Evm { address } => erc55_checksum(address),
        }
    }
}

fn prefixed(op: u8, body: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(22);
    script.push(op);
    script.push(PUSH_20);
    script.extend_from_slice(body);
    script
}

fn parse_erc55(body: &str) -> Option<DomainAddress> {
    let bytes = hex::decode(body).ok()?;
    let address: [u8; 20] = bytes.try_into().ok()?;

    let has_lower = body.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = body.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper && erc55_checksum(&address)[2..] != *body {
        return None;
    }
    Some(DomainAddress::Evm { address })
}

fn parse_bech32(raw: &str, network: Network) -> Option<DomainAddress> {
    let (hrp, version, program) = bech32::segwit::decode(raw).ok()?;
    if !hrp.as_str().eq_ignore_ascii_case(network.bech32_hrp()) || version != Fe32::Q {
        return None;
    }
    Some(DomainAddress::Segwit {
        program: program.try_into().ok()?,
    })
}

fn parse_base58(raw: &str, network: Network) -> Option<DomainAddress> {
    let payload = bs58::decode(raw).with_check(None).into_vec().ok()?;
    let (version, hash) = payload.split_first()?;
    if *version != network.pubkey_hash_prefix() {
        return None;
    }
    Some(DomainAddress::Legacy {
        pubkey_hash: hash.try_into().ok()?,
    })
}

/// Mixed-case checksum encoding: a hex letter is uppercased when the
/// matching nibble of keccak256(lowercase hex) is 8 or above.
#[must_use]
pub fn erc55_checksum(address: &[u8; 20]) -> String {
    let lower = hex::encode(address);
    let hash = Keccak256::digest(lower.as_bytes());

    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = (hash[i / 2] >> (if i % 2 == 0 { 4 } else { 0 })) & 0x0f;
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: [u8; 20] = [0x11; 20];

    #[test]
    fn test_erc55_reference_vectors() {
        for vector in [
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
            "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359",
            "0xdbF03B407c01E7cD3CBea99509d93f8DDDC8C6FB",
            "0xD1220A0cf47c7B9Be7A2E6BA89F429762e7b9aDb",
        ] {
            let address = DomainAddress::classify(vector, Network::Mainnet).unwrap();
            assert_eq!(address.format(), AddressFormat::Erc55);
            assert_eq!(address.render(Network::Regtest), vector);
        }
    }

    #[test]
    fn test_erc55_accepts_single_case() {
        let lower = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed";
        let upper = "0x5AAEB6053F3E94C9B9A09F33669435E7EF1BEAED";
        assert!(DomainAddress::classify(lower, Network::Mainnet).is_ok());
        assert!(DomainAddress::classify(upper, Network::Mainnet).is_ok());
    }

    #[test]
    fn test_erc55_rejects_bad_checksum() {
        let err =
            DomainAddress::classify("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAeD", Network::Mainnet)
                .unwrap_err();
        assert!(matches!(err, TransferDomainError::InvalidAddress { .. }));
    }

    #[test]
    fn test_legacy_round_trip_per_network() {
        let address = DomainAddress::Legacy { pubkey_hash: HASH };
        for network in [Network::Mainnet, Network::Testnet, Network::Regtest] {
            let rendered = address.render(network);
            assert_eq!(DomainAddress::classify(&rendered, network).unwrap(), address);
        }
    }

    #[test]
    fn test_legacy_from_other_network_is_invalid() {
        let rendered = DomainAddress::Legacy { pubkey_hash: HASH }.render(Network::Mainnet);
        assert!(DomainAddress::classify(&rendered, Network::Testnet).is_err());
    }

    #[test]
    fn test_bech32_round_trip() {
        let address = DomainAddress::Segwit { program: HASH };
        let rendered = address.render(Network::Regtest);
        assert!(rendered.starts_with("bcrt1q"));
        assert_eq!(
            DomainAddress::classify(&rendered, Network::Regtest).unwrap(),
            address
        );
        assert!(address.render(Network::Mainnet).starts_with("df1q"));
    }

    #[test]
    fn test_foreign_bech32_is_invalid() {
        let err = DomainAddress::classify(
            "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4",
            Network::Mainnet,
        )
        .unwrap_err();
        assert!(matches!(err, TransferDomainError::InvalidAddress { .. }));
    }

    #[test]
    fn test_garbage_is_invalid() {
        for raw in ["", "not-an-address", "0x1234", "zzzz"] {
            assert!(matches!(
                DomainAddress::classify(raw, Network::Mainnet),
                Err(TransferDomainError::InvalidAddress { .. })
            ));
        }
    }

    #[test]
    fn test_script_templates() {
        let legacy = DomainAddress::Legacy { pubkey_hash: HASH }.script();
        assert_eq!(hex::encode(&legacy), format!("76a914{}88ac", "11".repeat(20)));

        let segwit = DomainAddress::Segwit { program: HASH }.script();
        assert_eq!(hex::encode(&segwit), format!("0014{}", "11".repeat(20)));

        let evm = DomainAddress::Evm { address: HASH }.script();
        assert_eq!(hex::encode(&evm), format!("6014{}", "11".repeat(20)));
    }

    #[test]
    fn test_classify_accepts_script_hex() {
        let script_hex = format!("6014{}", "11".repeat(20));
        let address = DomainAddress::classify(&script_hex, Network::Mainnet).unwrap();
        assert_eq!(address, DomainAddress::Evm { address: HASH });
    }

    #[test]
    fn test_from_script_rejects_other_templates() {
        // pay-to-script-hash
        let p2sh = [&[0xa9, 0x14][..], &HASH, &[0x87]].concat();
        assert_eq!(DomainAddress::from_script(&p2sh), None);
        assert_eq!(DomainAddress::from_script(&[0x00, 0x14, 0x01]), None);
    }

    #[test]
    fn test_domain_compatibility() {
        let legacy = DomainAddress::Legacy { pubkey_hash: HASH };
        let segwit = DomainAddress::Segwit { program: HASH };
        let evm = DomainAddress::Evm { address: HASH };

        assert!(legacy.compatible_with(Domain::Dvm));
        assert!(segwit.compatible_with(Domain::Dvm));
        assert!(!evm.compatible_with(Domain::Dvm));

        assert!(evm.compatible_with(Domain::Evm));
        assert!(!legacy.compatible_with(Domain::Evm));
        assert!(!segwit.compatible_with(Domain::Evm));
    }

    #[test]
    fn test_network_parsing() {
        assert_eq!("regtest".parse::<Network>().unwrap(), Network::Regtest);
        assert_eq!("MAINNET".parse::<Network>().unwrap(), Network::Mainnet);
        assert!("devnet-x".parse::<Network>().is_err());
    }
}
