//! SPL Token operations for Solana.
//!
//! Implements the SPL Token instructions the vault submits (InitializeMint2,
//! MintTo, Transfer), associated token account (ATA) provisioning and
//! address derivation, and decoding of mint / token account data, without
//! pulling in the `solana-sdk` or the `spl-token` crates.

use sha2::{Digest, Sha256};

use crate::error::SolError;
use crate::transaction::{SolAccountMeta, SolInstruction, SYSTEM_PROGRAM_ID};

// ---------------------------------------------------------------------------
// Well-known program IDs
// ---------------------------------------------------------------------------

/// SPL Token Program ID: `TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA`
pub const TOKEN_PROGRAM_ID: [u8; 32] = [
    0x06, 0xdd, 0xf6, 0xe1, 0xd7, 0x65, 0xa1, 0x93, 0xd9, 0xcb, 0xe1, 0x46, 0xce, 0xeb, 0x79,
    0xac, 0x1c, 0xb4, 0x85, 0xed, 0x5f, 0x5b, 0x37, 0x91, 0x3a, 0x8c, 0xf5, 0x85, 0x7e, 0xff,
    0x00, 0xa9,
];

/// Associated Token Account Program ID: `ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL`
pub const ASSOCIATED_TOKEN_PROGRAM_ID: [u8; 32] = [
    0x8c, 0x97, 0x25, 0x8f, 0x4e, 0x24, 0x89, 0xf1, 0xbb, 0x3d, 0x10, 0x29, 0x14, 0x8e, 0x0d,
    0x83, 0x0b, 0x5a, 0x13, 0x99, 0xda, 0xff, 0x10, 0x84, 0x04, 0x8e, 0x7b, 0xd8, 0xdb, 0xe9,
    0xf8, 0x59,
];

/// Size in bytes of an SPL mint account.
pub const MINT_ACCOUNT_SIZE: usize = 82;

/// Size in bytes of an SPL token account.
pub const TOKEN_ACCOUNT_SIZE: usize = 165;

/// Largest decimals value the vault accepts for a new mint.
pub const MAX_DECIMALS: u8 = 9;

/// The string appended to PDA derivation: "ProgramDerivedAddress".
const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

// SPL Token instruction tags.
const IX_MINT_TO: u8 = 7;
const IX_TRANSFER: u8 = 3;
const IX_INITIALIZE_MINT2: u8 = 20;

// Associated Token Account program instruction tag.
const ATA_IX_CREATE_IDEMPOTENT: u8 = 1;

// ---------------------------------------------------------------------------
// Mint creation
// ---------------------------------------------------------------------------

/// Build an SPL Token `InitializeMint2` instruction.
///
/// The mint account must already be allocated (82 bytes) and owned by the
/// token program, normally by a System `CreateAccount` in the same
/// transaction.
///
/// # Wire format
///
/// `[20, decimals, mint_authority(32), freeze_tag, freeze_authority(32)?]`
pub fn build_initialize_mint(
    mint: &[u8; 32],
    decimals: u8,
    mint_authority: &[u8; 32],
    freeze_authority: Option<&[u8; 32]>,
) -> Result<SolInstruction, SolError> {
    if decimals > MAX_DECIMALS {
        return Err(SolError::TransactionBuildError(format!(
            "decimals must be in 0..={MAX_DECIMALS}, got {decimals}"
        )));
    }

    let mut data = Vec::with_capacity(67);
    data.push(IX_INITIALIZE_MINT2);
    data.push(decimals);
    data.extend_from_slice(mint_authority);
    match freeze_authority {
        Some(authority) => {
            data.push(1);
            data.extend_from_slice(authority);
        }
        None => data.push(0),
    }

    Ok(SolInstruction {
        program_id: TOKEN_PROGRAM_ID,
        accounts: vec![SolAccountMeta::writable(*mint, false)],
        data,
    })
}

// ---------------------------------------------------------------------------
// MintTo / Transfer
// ---------------------------------------------------------------------------

/// Build an SPL Token `MintTo` instruction.
///
/// Mints `amount` base units of `mint` into `destination` (a token account),
/// authorised by `mint_authority`.
pub fn build_mint_to(
    mint: &[u8; 32],
    destination: &[u8; 32],
    mint_authority: &[u8; 32],
    amount: u64,
) -> Result<SolInstruction, SolError> {
    if amount == 0 {
        return Err(SolError::TransactionBuildError(
            "mint amount must be > 0".into(),
        ));
    }

    let mut data = Vec::with_capacity(9);
    data.push(IX_MINT_TO);
    data.extend_from_slice(&amount.to_le_bytes());

    Ok(SolInstruction {
        program_id: TOKEN_PROGRAM_ID,
        accounts: vec![
            SolAccountMeta::writable(*mint, false),
            SolAccountMeta::writable(*destination, false),
            SolAccountMeta::readonly(*mint_authority, true),
        ],
        data,
    })
}

/// Build an SPL Token `Transfer` instruction.
///
/// This transfers `amount` of the smallest token unit (e.g. for a token with
/// 6 decimals, `amount = 1_000_000` transfers 1 whole token).
///
/// # Wire format
///
/// SPL Token `Transfer` instruction index = 3, followed by u64 LE amount.
/// Total data: 9 bytes.
pub fn build_spl_transfer(
    from_token_account: &[u8; 32],
    to_token_account: &[u8; 32],
    owner: &[u8; 32],
    amount: u64,
) -> Result<SolInstruction, SolError> {
    if amount == 0 {
        return Err(SolError::TransactionBuildError(
            "SPL transfer amount must be > 0".into(),
        ));
    }

    let mut data = Vec::with_capacity(9);
    data.push(IX_TRANSFER);
    data.extend_from_slice(&amount.to_le_bytes());

    Ok(SolInstruction {
        program_id: TOKEN_PROGRAM_ID,
        accounts: vec![
            SolAccountMeta::writable(*from_token_account, false),
            SolAccountMeta::writable(*to_token_account, false),
            SolAccountMeta::readonly(*owner, true),
        ],
        data,
    })
}

// ---------------------------------------------------------------------------
// Associated Token Account provisioning
// ---------------------------------------------------------------------------

/// Build an ATA program `CreateIdempotent` instruction for `wallet` + `mint`,
/// paid by `payer`. Succeeds on-chain whether or not the account exists.
///
/// Returns the instruction together with the derived ATA address.
pub fn build_create_associated_account_idempotent(
    payer: &[u8; 32],
    wallet: &[u8; 32],
    mint: &[u8; 32],
) -> Result<(SolInstruction, [u8; 32]), SolError> {
    let ata = derive_associated_token_address(wallet, mint)?;

    let ix = SolInstruction {
        program_id: ASSOCIATED_TOKEN_PROGRAM_ID,
        accounts: vec![
            SolAccountMeta::writable(*payer, true),
            SolAccountMeta::writable(ata, false),
            SolAccountMeta::readonly(*wallet, false),
            SolAccountMeta::readonly(*mint, false),
            SolAccountMeta::readonly(SYSTEM_PROGRAM_ID, false),
            SolAccountMeta::readonly(TOKEN_PROGRAM_ID, false),
        ],
        data: vec![ATA_IX_CREATE_IDEMPOTENT],
    };

    Ok((ix, ata))
}

/// Derive the associated token account address for a wallet + mint pair.
///
/// The ATA is a Program Derived Address (PDA) with seeds:
///   `[wallet_address, token_program_id, mint_address]`
/// derived from the Associated Token Account program.
pub fn derive_associated_token_address(
    wallet: &[u8; 32],
    mint: &[u8; 32],
) -> Result<[u8; 32], SolError> {
    find_program_address(
        &[wallet.as_ref(), &TOKEN_PROGRAM_ID, mint.as_ref()],
        &ASSOCIATED_TOKEN_PROGRAM_ID,
    )
    .map(|(address, _bump)| address)
}

/// Find a valid Program Derived Address (PDA) for the given seeds and program.
///
/// Iterates bump seeds from 255 down to 0 and returns the first
/// `SHA-256(seeds || bump || program_id || "ProgramDerivedAddress")` that is
/// NOT a valid Ed25519 point.
fn find_program_address(
    seeds: &[&[u8]],
    program_id: &[u8; 32],
) -> Result<([u8; 32], u8), SolError> {
    for bump in (0u8..=255).rev() {
        if let Some(address) = try_create_program_address(seeds, &[bump], program_id) {
            return Ok((address, bump));
        }
    }

    Err(SolError::InvalidAddress(
        "could not find valid PDA bump seed".into(),
    ))
}

fn try_create_program_address(
    seeds: &[&[u8]],
    bump_seed: &[u8],
    program_id: &[u8; 32],
) -> Option<[u8; 32]> {
    let mut hasher = Sha256::new();

    for seed in seeds {
        hasher.update(seed);
    }
    hasher.update(bump_seed);
    hasher.update(program_id);
    hasher.update(PDA_MARKER);

    let hash: [u8; 32] = hasher.finalize().into();

    if is_on_curve(&hash) {
        return None;
    }

    Some(hash)
}

/// Whether `bytes` decompress to an Ed25519 point. Wallet addresses are on
/// the curve; program derived addresses are not.
pub fn is_on_curve(bytes: &[u8; 32]) -> bool {
    curve25519_dalek::edwards::CompressedEdwardsY(*bytes)
        .decompress()
        .is_some()
}

// ---------------------------------------------------------------------------
// Account data decoding
// ---------------------------------------------------------------------------

/// The fields of an SPL token account the vault reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenAccount {
    pub mint: [u8; 32],
    pub owner: [u8; 32],
    pub amount: u64,
}

/// Decoded SPL mint account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintAccount {
    pub mint_authority: Option<[u8; 32]>,
    pub supply: u64,
    pub decimals: u8,
    pub is_initialized: bool,
    pub freeze_authority: Option<[u8; 32]>,
}

/// Decode SPL token account data.
///
/// Layout: mint(32) | owner(32) | amount(u64 LE) | delegate, state, ...
pub fn decode_token_account(data: &[u8]) -> Result<TokenAccount, SolError> {
    if data.len() != TOKEN_ACCOUNT_SIZE {
        return Err(SolError::InvalidAccountData(format!(
            "expected {TOKEN_ACCOUNT_SIZE} bytes, got {}",
            data.len()
        )));
    }

    Ok(TokenAccount {
        mint: read_key(&data[0..32]),
        owner: read_key(&data[32..64]),
        amount: read_u64(&data[64..72]),
    })
}

/// Decode SPL mint account data.
///
/// Layout: mint_authority(COption) | supply(u64 LE) | decimals(u8) |
/// is_initialized(u8) | freeze_authority(COption). A COption is a u32 LE tag
/// followed by 32 key bytes.
pub fn decode_mint_account(data: &[u8]) -> Result<MintAccount, SolError> {
    if data.len() != MINT_ACCOUNT_SIZE {
        return Err(SolError::InvalidAccountData(format!(
            "expected {MINT_ACCOUNT_SIZE} bytes, got {}",
            data.len()
        )));
    }

    Ok(MintAccount {
        mint_authority: read_coption_key(&data[0..36])?,
        supply: read_u64(&data[36..44]),
        decimals: data[44],
        is_initialized: data[45] != 0,
        freeze_authority: read_coption_key(&data[46..82])?,
    })
}

fn read_key(bytes: &[u8]) -> [u8; 32] {
    let mut key = [0u8; 32];
    key.copy_from_slice(bytes);
    key
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

fn read_coption_key(bytes: &[u8]) -> Result<Option<[u8; 32]>, SolError> {
    match u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) {
        0 => Ok(None),
        1 => Ok(Some(read_key(&bytes[4..36]))),
        tag => Err(SolError::InvalidAccountData(format!(
            "invalid COption tag {tag}"
        ))),
    }
}
