//! Raw transaction model for the token-aware (version 4) transaction format.
//!
//! # Wire format
//!
//! | Field         | Encoding                                        |
//! |---------------|-------------------------------------------------|
//! | version       | i32 LE                                          |
//! | marker, flag  | `00 01`, only when any input carries a witness  |
//! | inputs        | CompactSize count, then outpoint/script/sequence |
//! | outputs       | CompactSize count, then value/script/token id   |
//! | witnesses     | one stack per input, only with the marker       |
//! | lock_time     | u32 LE                                          |
//!
//! Outputs of version 4 and above carry a VARINT token id after the script.

use std::fmt;

use sha2::{Digest, Sha256};

use super::encoding::{ByteReader, ByteWriter};
use super::error::TransactionError;
use super::types::{Amount, TransactionId};

pub const TOKEN_AWARE_VERSION: i32 = 4;
pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;

/// Reference to an output of a previous transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OutPoint {
    /// Hash in internal (little-endian) byte order.
    pub txid: [u8; 32],
    pub vout: u32,
}

impl OutPoint {
    /// Builds an outpoint from the display (byte-reversed) txid hex.
    pub fn from_display_hex(txid: &str, vout: u32) -> Result<Self, TransactionError> {
        let mut bytes: [u8; 32] = hex::decode(txid)
            .map_err(|e| TransactionError::Invalid(format!("invalid txid hex: {e}")))?
            .try_into()
            .map_err(|_| TransactionError::Invalid("txid must be 32 bytes".to_string()))?;
        bytes.reverse();
        Ok(Self { txid: bytes, vout })
    }

    #[must_use]
    pub fn txid_hex(&self) -> TransactionId {
        let mut display = self.txid;
        display.reverse();
        hex::encode(display)
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid_hex(), self.vout)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxIn {
    pub previous_output: OutPoint,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
    pub witness: Vec<Vec<u8>>,
}

impl TxIn {
    #[must_use]
    pub fn unsigned(previous_output: OutPoint) -> Self {
        Self {
            previous_output,
            script_sig: Vec::new(),
            sequence: SEQUENCE_FINAL,
            witness: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOut {
    pub value: Amount,
    pub script_pubkey: Vec<u8>,
    pub token_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub version: i32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u32,
}

impl Transaction {
    #[must_use]
    pub fn new(inputs: Vec<TxIn>, outputs: Vec<TxOut>) -> Self {
        Self {
            version: TOKEN_AWARE_VERSION,
            inputs,
            outputs,
            lock_time: 0,
        }
    }

    #[must_use]
    pub fn has_witness(&self) -> bool {
        self.inputs.iter().any(|input| !input.witness.is_empty())
    }

    /// Full serialization, witnesses included when present.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.serialize(self.has_witness())
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    fn serialize(&self, with_witness: bool) -> Vec<u8> {
        let mut writer = ByteWriter::with_capacity(256);
        writer.write_i32_le(self.version);
        if with_witness {
            writer.write_bytes(&[0x00, 0x01]);
        }

        writer.write_compact_size(self.inputs.len() as u64);
        for input in &self.inputs {
            writer.write_bytes(&input.previous_output.txid);
            writer.write_u32_le(input.previous_output.vout);
            writer.write_var_bytes(&input.script_sig);
            writer.write_u32_le(input.sequence);
        }

        writer.write_compact_size(self.outputs.len() as u64);
        for output in &self.outputs {
            writer.write_i64_le(output.value.units());
            writer.write_var_bytes(&output.script_pubkey);
            if self.version >= TOKEN_AWARE_VERSION {
                writer.write_varint(u64::from(output.token_id));
            }
        }

        if with_witness {
            for input in &self.inputs {
                writer.write_compact_size(input.witness.len() as u64);
                for item in &input.witness {
                    writer.write_var_bytes(item);
                }
            }
        }
        writer.write_u32_le(self.lock_time);
        writer.into_inner()
    }

    pub fn from_hex(raw: &str) -> Result<Self, TransactionError> {
        let bytes = hex::decode(raw.trim())
            .map_err(|e| TransactionError::Invalid(format!("invalid hex: {e}")))?;
        Self::from_bytes(&bytes)
    }

    /// Parses exactly one transaction; trailing data is an error.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TransactionError> {
        let mut reader = ByteReader::new(bytes);
        let version = reader.read_i32_le()?;

        let with_witness = reader.peek_u8() == Some(0x00);
        if with_witness {
            reader.read_u8()?;
            let flag = reader.read_u8()?;
            if flag != 0x01 {
                return Err(TransactionError::Invalid(format!(
                    "unsupported witness flag 0x{flag:02x}"
                )));
            }
        }

        let input_count = reader.read_compact_size()? as usize;
        // outpoint + script len + sequence
        let mut inputs = Vec::with_capacity(input_count.min(reader.remaining() / 41));
        for _ in 0..input_count {
            let txid = reader.read_array::<32>()?;
            let vout = reader.read_u32_le()?;
            let script_sig = reader.read_var_bytes()?;
            let sequence = reader.read_u32_le()?;
            inputs.push(TxIn {
                previous_output: OutPoint { txid, vout },
                script_sig,
                sequence,
                witness: Vec::new(),
            });
        }

        let output_count = reader.read_compact_size()? as usize;
        let mut outputs = Vec::with_capacity(output_count.min(reader.remaining() / 9));
        for _ in 0..output_count {
            let units = reader.read_i64_le()?;
            let value = Amount::from_units(units)
                .map_err(|_| TransactionError::Invalid(format!("output value {units} out of range")))?;
            let script_pubkey = reader.read_var_bytes()?;
            let token_id = if version >= TOKEN_AWARE_VERSION {
                u32::try_from(reader.read_varint()?)
                    .map_err(|_| TransactionError::Invalid("token id exceeds 32 bits".to_string()))?
            } else {
                0
            };
            outputs.push(TxOut {
                value,
                script_pubkey,
                token_id,
            });
        }

        if with_witness {
            for input in &mut inputs {
                let items = reader.read_compact_size()? as usize;
                let mut stack = Vec::with_capacity(items.min(reader.remaining()));
                for _ in 0..items {
                    stack.push(reader.read_var_bytes()?);
                }
                input.witness = stack;
            }
        }

        let lock_time = reader.read_u32_le()?;
        if !reader.is_empty() {
            return Err(TransactionError::TrailingBytes(reader.remaining()));
        }
        Ok(Self {
            version,
            inputs,
            outputs,
            lock_time,
        })
    }

    /// Byte-reversed double SHA-256 of the witness-stripped serialization.
    #[must_use]
    pub fn txid(&self) -> TransactionId {
        let mut hash: [u8; 32] = Sha256::digest(Sha256::digest(self.serialize(false))).into();
        hash.reverse();
        hex::encode(hash)
    }

    /// Virtual size: witness bytes count one quarter.
    #[must_use]
    pub fn vsize(&self) -> usize {
        let base = self.serialize(false).len();
        let total = self.to_bytes().len();
        (base * 3 + total).div_ceil(4)
    }

    #[must_use]
    pub fn total_output_value(&self) -> Option<Amount> {
        self.outputs
            .iter()
            .try_fold(Amount::ZERO, |acc, output| acc.checked_add(output.value))
    }
}

/// A spendable coin offered by the funding collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnspentOutput {
    pub outpoint: OutPoint,
    pub value: Amount,
    pub script_pubkey: Vec<u8>,
}

/// A transaction ready for signing, together with the coins it spends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    pub tx: Transaction,
    pub prevouts: Vec<UnspentOutput>,
}

impl UnsignedTransaction {
    #[must_use]
    pub fn input_value(&self) -> Option<Amount> {
        self.prevouts
            .iter()
            .try_fold(Amount::ZERO, |acc, coin| acc.checked_add(coin.value))
    }

    /// Inputs minus outputs; `None` if outputs exceed inputs.
    #[must_use]
    pub fn fee(&self) -> Option<Amount> {
        self.input_value()?
            .checked_sub(self.tx.total_output_value()?)
    }

    /// Pairs a signed copy of this transaction with its fee.
    ///
    /// Signing may only fill in scripts and witnesses; any change to the
    /// spent outpoints or to the outputs is rejected.
    pub fn into_signed(self, signed: Transaction) -> Result<SignedTransaction, TransactionError> {
        let same_inputs = signed.inputs.len() == self.tx.inputs.len()
            && signed
                .inputs
                .iter()
                .zip(&self.tx.inputs)
                .all(|(a, b)| a.previous_output == b.previous_output);
        if !same_inputs || signed.outputs != self.tx.outputs {
            return Err(TransactionError::Invalid(
                "signed transaction does not match the unsigned template".to_string(),
            ));
        }
        let fee = self
            .fee()
            .ok_or_else(|| TransactionError::Invalid("outputs exceed inputs".to_string()))?;
        Ok(SignedTransaction { tx: signed, fee })
    }
}

/// A fully signed transaction and the fee it pays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub tx: Transaction,
    pub fee: Amount,
}

impl SignedTransaction {
    #[must_use]
    pub fn txid(&self) -> TransactionId {
        self.tx.txid()
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        self.tx.to_hex()
    }
}
