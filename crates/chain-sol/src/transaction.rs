//! Solana legacy transaction wire format.
//!
//! Transactions are built entirely by hand, with no `solana-sdk` dependency.
//! Signing is NOT done here for the wallet: the message bytes are handed to
//! an external signer and the returned signatures are assembled into the
//! wire layout below.
//!
//! ```text
//! Transaction:
//!   num_signatures          compact-u16
//!   signatures              64 bytes * num_signatures
//!   message:
//!     num_required_sigs     u8
//!     num_readonly_signed   u8
//!     num_readonly_unsigned u8
//!     num_accounts          compact-u16
//!     account_keys          32 bytes * num_accounts
//!     recent_blockhash      32 bytes
//!     num_instructions      compact-u16
//!     instructions[]        (see below)
//!
//! Instruction:
//!   program_id_index        u8
//!   num_accounts            compact-u16
//!   account_indices         u8 * num_accounts
//!   data_len                compact-u16
//!   data                    u8 * data_len
//! ```

use ed25519_dalek::{Signer, Verifier};
use zeroize::Zeroize;

use crate::address::bytes_to_address;
use crate::error::SolError;

// ---------------------------------------------------------------------------
// Solana System Program
// ---------------------------------------------------------------------------

/// The Solana System Program public key: 32 zero bytes.
/// Base58: `11111111111111111111111111111111`
pub const SYSTEM_PROGRAM_ID: [u8; 32] = [0u8; 32];

/// System Program `CreateAccount` instruction index (little-endian u32).
const SYSTEM_CREATE_ACCOUNT_IX_INDEX: u32 = 0;

// ---------------------------------------------------------------------------
// Compact-u16 encoding
// ---------------------------------------------------------------------------

/// Encode a `u16` value in Solana's compact-u16 format.
///
/// - Values 0..0x7f       -> 1 byte
/// - Values 0x80..0x3fff  -> 2 bytes
/// - Values 0x4000..      -> 3 bytes
pub fn encode_compact_u16(value: u16) -> Vec<u8> {
    let mut val = value as u32;
    let mut out = Vec::with_capacity(3);

    loop {
        let mut byte = (val & 0x7f) as u8;
        val >>= 7;
        if val > 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if val == 0 {
            break;
        }
    }

    out
}

/// Decode a compact-u16 value from a byte slice.
///
/// Returns `(value, bytes_consumed)` or an error if the data is truncated.
pub fn decode_compact_u16(data: &[u8]) -> Result<(u16, usize), SolError> {
    let mut value: u32 = 0;
    let mut shift = 0u32;
    let mut consumed = 0usize;

    loop {
        let byte = *data.get(consumed).ok_or_else(|| {
            SolError::SerializationError(
                "unexpected end of data while decoding compact-u16".into(),
            )
        })?;
        consumed += 1;

        value |= ((byte & 0x7f) as u32) << shift;
        shift += 7;

        if byte & 0x80 == 0 || consumed >= 3 {
            break;
        }
    }

    if value > u16::MAX as u32 {
        return Err(SolError::SerializationError(
            "compact-u16 value overflow".into(),
        ));
    }

    Ok((value as u16, consumed))
}

// ---------------------------------------------------------------------------
// Data structures
// ---------------------------------------------------------------------------

/// A single account reference in a Solana instruction.
#[derive(Debug, Clone)]
pub struct SolAccountMeta {
    pub pubkey: [u8; 32],
    pub is_signer: bool,
    pub is_writable: bool,
}

impl SolAccountMeta {
    pub fn writable(pubkey: [u8; 32], is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: true,
        }
    }

    pub fn readonly(pubkey: [u8; 32], is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: false,
        }
    }
}

/// A Solana instruction (before it is compiled into a transaction).
#[derive(Debug, Clone)]
pub struct SolInstruction {
    pub program_id: [u8; 32],
    pub accounts: Vec<SolAccountMeta>,
    pub data: Vec<u8>,
}

/// A compiled, unsigned Solana transaction.
#[derive(Debug, Clone)]
pub struct SolTransaction {
    /// All account keys referenced by this transaction, in canonical order:
    ///   1. writable signers
    ///   2. read-only signers
    ///   3. writable non-signers
    ///   4. read-only non-signers
    pub account_keys: Vec<[u8; 32]>,

    /// Number of required signatures (first N accounts are signers).
    pub num_required_signatures: u8,
    /// How many of the signing accounts are read-only.
    pub num_readonly_signed: u8,
    /// How many of the non-signing accounts are read-only.
    pub num_readonly_unsigned: u8,

    pub recent_blockhash: [u8; 32],

    /// Compiled instructions (account references replaced with indices).
    pub compiled_instructions: Vec<CompiledInstruction>,
}

impl SolTransaction {
    /// The accounts whose signatures this transaction requires, in slot order.
    pub fn signer_keys(&self) -> &[[u8; 32]] {
        &self.account_keys[..self.num_required_signatures as usize]
    }
}

/// A compiled instruction where account references are replaced by u8 indices
/// into the transaction's `account_keys` array.
#[derive(Debug, Clone)]
pub struct CompiledInstruction {
    pub program_id_index: u8,
    pub account_indices: Vec<u8>,
    pub data: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Instruction building
// ---------------------------------------------------------------------------

/// Build a System Program `CreateAccount` instruction.
///
/// Funds `new_account` with `lamports` from `payer`, allocates `space` bytes
/// and assigns ownership to `owner`. Both `payer` and `new_account` sign.
pub fn build_create_account_instruction(
    payer: &[u8; 32],
    new_account: &[u8; 32],
    lamports: u64,
    space: u64,
    owner: &[u8; 32],
) -> SolInstruction {
    // u32 LE index (0) + u64 LE lamports + u64 LE space + 32-byte owner = 52 bytes.
    let mut data = Vec::with_capacity(52);
    data.extend_from_slice(&SYSTEM_CREATE_ACCOUNT_IX_INDEX.to_le_bytes());
    data.extend_from_slice(&lamports.to_le_bytes());
    data.extend_from_slice(&space.to_le_bytes());
    data.extend_from_slice(owner);

    SolInstruction {
        program_id: SYSTEM_PROGRAM_ID,
        accounts: vec![
            SolAccountMeta::writable(*payer, true),
            SolAccountMeta::writable(*new_account, true),
        ],
        data,
    }
}

// ---------------------------------------------------------------------------
// Transaction compilation
// ---------------------------------------------------------------------------

/// Build a transaction from a set of instructions with a single fee payer.
///
/// The fee payer is always the first signer and is placed at index 0 in the
/// account keys.
pub fn compile_transaction(
    instructions: &[SolInstruction],
    fee_payer: &[u8; 32],
    recent_blockhash: &[u8; 32],
) -> Result<SolTransaction, SolError> {
    if instructions.is_empty() {
        return Err(SolError::TransactionBuildError(
            "transaction needs at least one instruction".into(),
        ));
    }

    // Instruction account lists are tiny, a Vec scan beats a HashMap here.
    struct AccountEntry {
        pubkey: [u8; 32],
        is_signer: bool,
        is_writable: bool,
    }

    let mut entries: Vec<AccountEntry> = Vec::new();

    let mut upsert = |pubkey: [u8; 32], signer: bool, writable: bool| {
        if let Some(entry) = entries.iter_mut().find(|e| e.pubkey == pubkey) {
            entry.is_signer |= signer;
            entry.is_writable |= writable;
        } else {
            entries.push(AccountEntry {
                pubkey,
                is_signer: signer,
                is_writable: writable,
            });
        }
    };

    // Fee payer is always signer + writable.
    upsert(*fee_payer, true, true);

    for ix in instructions {
        for meta in &ix.accounts {
            upsert(meta.pubkey, meta.is_signer, meta.is_writable);
        }
        // Program IDs are non-signer, read-only accounts.
        upsert(ix.program_id, false, false);
    }

    // Stable sort keeps insertion order within a category, so the fee payer
    // (inserted first, writable signer) stays at index 0.
    entries.sort_by_key(|e| match (e.is_signer, e.is_writable) {
        (true, true) => 0u8,
        (true, false) => 1,
        (false, true) => 2,
        (false, false) => 3,
    });

    if entries.len() > u8::MAX as usize {
        return Err(SolError::TransactionBuildError(format!(
            "too many accounts: {}",
            entries.len()
        )));
    }

    let num_signers = entries.iter().filter(|e| e.is_signer).count() as u8;
    let num_readonly_signed = entries
        .iter()
        .filter(|e| e.is_signer && !e.is_writable)
        .count() as u8;
    let num_readonly_unsigned = entries
        .iter()
        .filter(|e| !e.is_signer && !e.is_writable)
        .count() as u8;

    let account_keys: Vec<[u8; 32]> = entries.iter().map(|e| e.pubkey).collect();

    let index_of = |key: &[u8; 32], what: &str| {
        account_keys
            .iter()
            .position(|k| k == key)
            .map(|i| i as u8)
            .ok_or_else(|| SolError::TransactionBuildError(format!("{what} not in account keys")))
    };

    let mut compiled = Vec::with_capacity(instructions.len());
    for ix in instructions {
        let program_id_index = index_of(&ix.program_id, "program_id")?;
        let account_indices = ix
            .accounts
            .iter()
            .map(|meta| index_of(&meta.pubkey, "account"))
            .collect::<Result<Vec<u8>, SolError>>()?;

        compiled.push(CompiledInstruction {
            program_id_index,
            account_indices,
            data: ix.data.clone(),
        });
    }

    Ok(SolTransaction {
        account_keys,
        num_required_signatures: num_signers,
        num_readonly_signed,
        num_readonly_unsigned,
        recent_blockhash: *recent_blockhash,
        compiled_instructions: compiled,
    })
}

/// Serialize the transaction message (the bytes that get signed).
pub fn serialize_message(tx: &SolTransaction) -> Result<Vec<u8>, SolError> {
    let mut buf = Vec::with_capacity(256);

    buf.push(tx.num_required_signatures);
    buf.push(tx.num_readonly_signed);
    buf.push(tx.num_readonly_unsigned);

    buf.extend_from_slice(&encode_compact_u16(len_u16(tx.account_keys.len())?));
    for key in &tx.account_keys {
        buf.extend_from_slice(key);
    }

    buf.extend_from_slice(&tx.recent_blockhash);

    buf.extend_from_slice(&encode_compact_u16(len_u16(
        tx.compiled_instructions.len(),
    )?));
    for ix in &tx.compiled_instructions {
        buf.push(ix.program_id_index);

        buf.extend_from_slice(&encode_compact_u16(len_u16(ix.account_indices.len())?));
        buf.extend_from_slice(&ix.account_indices);

        buf.extend_from_slice(&encode_compact_u16(len_u16(ix.data.len())?));
        buf.extend_from_slice(&ix.data);
    }

    Ok(buf)
}

// ---------------------------------------------------------------------------
// Signing
// ---------------------------------------------------------------------------

/// Sign `message` with a locally held Ed25519 secret (e.g. a freshly
/// generated mint account key). Wallet signatures never go through here.
pub fn sign_with_secret(message: &[u8], secret: &[u8; 32]) -> [u8; 64] {
    let mut seed = *secret;
    let signing_key = ed25519_dalek::SigningKey::from_bytes(&seed);
    seed.zeroize();

    signing_key.sign(message).to_bytes()
}

/// Assemble the wire transaction from the compiled message and signatures.
///
/// `signatures` pairs each signer public key with its 64-byte signature in
/// any order; they are placed into the slots required by the message. Every
/// signature is verified against the message first, so a signer that returns
/// garbage is caught before submission.
pub fn assemble_signed_transaction(
    tx: &SolTransaction,
    signatures: &[([u8; 32], [u8; 64])],
) -> Result<Vec<u8>, SolError> {
    let message_bytes = serialize_message(tx)?;
    let signers = tx.signer_keys();

    let mut wire = Vec::with_capacity(3 + signers.len() * 64 + message_bytes.len());
    wire.extend_from_slice(&encode_compact_u16(len_u16(signers.len())?));

    for signer in signers {
        let (_, signature) = signatures
            .iter()
            .find(|(key, _)| key == signer)
            .ok_or_else(|| {
                SolError::SigningError(format!(
                    "missing signature for {}",
                    bytes_to_address(signer)
                ))
            })?;

        let verifying_key = ed25519_dalek::VerifyingKey::from_bytes(signer).map_err(|e| {
            SolError::SigningError(format!("signer key is not a valid Ed25519 point: {e}"))
        })?;
        verifying_key
            .verify(&message_bytes, &ed25519_dalek::Signature::from_bytes(signature))
            .map_err(|_| {
                SolError::SigningError(format!(
                    "signature for {} does not verify",
                    bytes_to_address(signer)
                ))
            })?;

        wire.extend_from_slice(signature);
    }

    wire.extend_from_slice(&message_bytes);
    Ok(wire)
}

// ---------------------------------------------------------------------------
// Wire parsing
// ---------------------------------------------------------------------------

/// Split a wire transaction into its signatures and message bytes.
pub fn split_wire_transaction(raw_tx: &[u8]) -> Result<(Vec<[u8; 64]>, &[u8]), SolError> {
    let (num_sigs, compact_len) = decode_compact_u16(raw_tx)?;

    if num_sigs == 0 {
        return Err(SolError::SerializationError(
            "transaction has zero signatures".into(),
        ));
    }

    let sigs_end = compact_len + (num_sigs as usize) * 64;
    if sigs_end > raw_tx.len() {
        return Err(SolError::SerializationError(
            "transaction too short: signature slots exceed length".into(),
        ));
    }

    let signatures = raw_tx[compact_len..sigs_end]
        .chunks_exact(64)
        .map(|chunk| {
            let mut sig = [0u8; 64];
            sig.copy_from_slice(chunk);
            sig
        })
        .collect();

    Ok((signatures, &raw_tx[sigs_end..]))
}

/// Read the signer account keys from serialized message bytes.
pub fn message_signer_keys(message: &[u8]) -> Result<Vec<[u8; 32]>, SolError> {
    if message.len() < 4 {
        return Err(SolError::SerializationError(
            "transaction message too short".into(),
        ));
    }

    let num_required_sigs = message[0] as usize;
    let (num_accounts, accounts_compact_len) = decode_compact_u16(&message[3..])?;

    let accounts_start = 3 + accounts_compact_len;
    let accounts_end = accounts_start + (num_accounts as usize) * 32;
    if accounts_end > message.len() {
        return Err(SolError::SerializationError(
            "transaction message too short for account keys".into(),
        ));
    }

    Ok(message[accounts_start..accounts_end]
        .chunks_exact(32)
        .take(num_required_sigs)
        .map(|chunk| {
            let mut key = [0u8; 32];
            key.copy_from_slice(chunk);
            key
        })
        .collect())
}

fn len_u16(len: usize) -> Result<u16, SolError> {
    u16::try_from(len)
        .map_err(|_| SolError::SerializationError(format!("length {len} exceeds compact-u16")))
}
