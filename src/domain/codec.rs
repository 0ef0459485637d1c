//! Transfer-domain payload codec.
//!
//! The payload travels inside the locking script of a zero-value output:
//!
//! ```text
//! OP_RETURN <push: "DfTx" '8' count (leg leg)*>
//! leg = script(var_bytes) token(VARINT) amount(i64 LE) domain(u8) data(var_bytes)
//! ```
//!
//! Decoding is strict: the push must cover exactly the rest of the script
//! and the items must cover exactly the rest of the push.

use super::address::DomainAddress;
use super::encoding::{ByteReader, ByteWriter};
use super::error::{TransactionError, TransferDomainError};
use super::types::{
    Amount, Domain, EncodedScript, TokenAmount, TransferDomainPayload, TransferItem, TransferLeg,
};

pub const OP_RETURN: u8 = 0x6a;
const OP_PUSHDATA1: u8 = 0x4c;
const OP_PUSHDATA2: u8 = 0x4d;
const OP_PUSHDATA4: u8 = 0x4e;

/// Protocol family marker shared by every custom transaction.
pub const DFTX_MARKER: &[u8; 4] = b"DfTx";

/// Custom transaction type byte for a domain transfer.
pub const TRANSFER_DOMAIN_TYPE: u8 = b'8';

// script len + token + amount + domain + data len
const MIN_LEG_SIZE: usize = 1 + 1 + 8 + 1 + 1;

/// Encodes the payload into the marker output's locking script.
pub fn encode(payload: &TransferDomainPayload) -> EncodedScript {
    let body = encode_body(payload);

    let mut script = ByteWriter::with_capacity(body.len() + 6);
    script.write_u8(OP_RETURN);
    match body.len() {
        len if len < OP_PUSHDATA1 as usize => script.write_u8(len as u8),
        len if len <= 0xff => {
            script.write_u8(OP_PUSHDATA1);
            script.write_u8(len as u8);
        }
        len if len <= 0xffff => {
            script.write_u8(OP_PUSHDATA2);
            script.write_bytes(&(len as u16).to_le_bytes());
        }
        len => {
            script.write_u8(OP_PUSHDATA4);
            script.write_u32_le(len as u32);
        }
    }
    script.write_bytes(&body);
    EncodedScript::from_raw(script.into_inner())
}

fn encode_body(payload: &TransferDomainPayload) -> Vec<u8> {
    let mut writer = ByteWriter::new();
    writer.write_bytes(DFTX_MARKER);
    writer.write_u8(TRANSFER_DOMAIN_TYPE);
    writer.write_compact_size(payload.items().len() as u64);
    for item in payload.items() {
        write_leg(&mut writer, &item.src);
        write_leg(&mut writer, &item.dst);
    }
    writer.into_inner()
}

fn write_leg(writer: &mut ByteWriter, leg: &TransferLeg) {
    writer.write_var_bytes(&leg.address.script());
    writer.write_varint(u64::from(leg.amount.token_id));
    writer.write_i64_le(leg.amount.amount.units());
    writer.write_u8(leg.domain.tag());
    writer.write_var_bytes(&leg.data);
}

/// Decodes a marker output's locking script back into its payload.
pub fn decode(script: &[u8]) -> Result<TransferDomainPayload, TransferDomainError> {
    let mut reader = ByteReader::new(script);
    if reader.read_u8().map_err(malformed)? != OP_RETURN {
        return Err(TransferDomainError::malformed("script does not start with OP_RETURN"));
    }
    let push_len = match reader.read_u8().map_err(malformed)? {
        op if op < OP_PUSHDATA1 => usize::from(op),
        OP_PUSHDATA1 => usize::from(reader.read_u8().map_err(malformed)?),
        OP_PUSHDATA2 => usize::from(reader.read_u16_le().map_err(malformed)?),
        OP_PUSHDATA4 => reader.read_u32_le().map_err(malformed)? as usize,
        op => {
            return Err(TransferDomainError::malformed(format!(
                "expected a data push, found opcode 0x{op:02x}"
            )));
        }
    };
    if push_len != reader.remaining() {
        return Err(TransferDomainError::malformed(format!(
            "push declares {push_len} bytes but {} follow",
            reader.remaining()
        )));
    }
    decode_body(reader.read_bytes(push_len).map_err(malformed)?)
}

fn decode_body(body: &[u8]) -> Result<TransferDomainPayload, TransferDomainError> {
    let mut reader = ByteReader::new(body);
    let marker = reader.read_bytes(DFTX_MARKER.len()).map_err(malformed)?;
    if marker != DFTX_MARKER {
        return Err(TransferDomainError::malformed("missing DfTx marker"));
    }
    let tx_type = reader.read_u8().map_err(malformed)?;
    if tx_type != TRANSFER_DOMAIN_TYPE {
        return Err(TransferDomainError::UnknownTag {
            field: "transaction type",
            tag: tx_type,
        });
    }

    let count = reader.read_compact_size().map_err(malformed)? as usize;
    let mut items = Vec::with_capacity(count.min(reader.remaining() / (2 * MIN_LEG_SIZE)));
    for _ in 0..count {
        let src = read_leg(&mut reader)?;
        let dst = read_leg(&mut reader)?;
        items.push(TransferItem { src, dst });
    }
    if !reader.is_empty() {
        return Err(TransferDomainError::malformed(format!(
            "{} trailing bytes after {count} items",
            reader.remaining()
        )));
    }
    TransferDomainPayload::new(items)
}

fn read_leg(reader: &mut ByteReader<'_>) -> Result<TransferLeg, TransferDomainError> {
    let script = reader.read_var_bytes().map_err(malformed)?;
    let address =
        DomainAddress::from_script(&script).ok_or_else(|| TransferDomainError::UnknownTag {
            field: "address format",
            tag: script.first().copied().unwrap_or_default(),
        })?;

    let token_id = u32::try_from(reader.read_varint().map_err(malformed)?)
        .map_err(|_| TransferDomainError::malformed("token id exceeds 32 bits"))?;

    let units = reader.read_i64_le().map_err(malformed)?;
    let amount = Amount::from_units(units)
        .and_then(|amount| TokenAmount::new(token_id, amount))
        .map_err(|_| TransferDomainError::malformed(format!("amount {units} out of range")))?;

    let tag = reader.read_u8().map_err(malformed)?;
    let domain = Domain::from_tag(tag).ok_or(TransferDomainError::UnknownTag {
        field: "domain",
        tag,
    })?;

    let data = reader.read_var_bytes().map_err(malformed)?;
    Ok(TransferLeg {
        address,
        amount,
        domain,
        data,
    })
}

fn malformed(err: TransactionError) -> TransferDomainError {
    TransferDomainError::MalformedPayload(err.to_string())
}

/// Hex form of [`encode`], as exposed to callers.
pub fn encode_transfer_domain(payload: &TransferDomainPayload) -> String {
    encode(payload).to_hex()
}

/// Inverse of [`encode_transfer_domain`].
pub fn decode_transfer_domain(script_hex: &str) -> Result<TransferDomainPayload, TransferDomainError> {
    let script = hex::decode(script_hex.trim())
        .map_err(|e| TransferDomainError::malformed(format!("invalid hex: {e}")))?;
    decode(&script)
}
