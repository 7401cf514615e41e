//! Solana chain primitives for the token vault.
//!
//! This crate handles Solana addresses, the legacy transaction wire format,
//! and the SPL Token / Associated Token Account instructions the vault needs
//! (mint creation, minting, transfers) without pulling in `solana-sdk`.
//!
//! Nothing in here performs I/O. Transactions are compiled into message bytes
//! that an external signer signs; the signatures are then assembled into the
//! wire format ready for `sendTransaction`.

pub mod address;
pub mod error;
pub mod spl_token;
pub mod transaction;

// Re-export key public types for ergonomic imports.
pub use address::{address_to_bytes, bytes_to_address, shorten_address, validate_address, Address};
pub use error::SolError;
pub use spl_token::{
    build_create_associated_account_idempotent, build_initialize_mint, build_mint_to,
    build_spl_transfer, decode_mint_account, decode_token_account,
    derive_associated_token_address, is_on_curve, MintAccount, TokenAccount, ASSOCIATED_TOKEN_PROGRAM_ID,
    MAX_DECIMALS, MINT_ACCOUNT_SIZE, TOKEN_ACCOUNT_SIZE, TOKEN_PROGRAM_ID,
};
pub use transaction::{
    assemble_signed_transaction, build_create_account_instruction, compile_transaction,
    decode_compact_u16, encode_compact_u16, message_signer_keys, serialize_message,
    sign_with_secret, split_wire_transaction, CompiledInstruction, SolAccountMeta,
    SolInstruction, SolTransaction, SYSTEM_PROGRAM_ID,
};
