//! The vault's only path to the remote ledger.
//!
//! [`ChainGateway`] exposes the four operations the vault performs on-chain.
//! [`RpcChainGateway`] implements them over Solana JSON-RPC; tests supply
//! in-memory implementations.

mod rpc;

use std::fmt;

use async_trait::async_trait;
use chain_sol::Address;
use thiserror::Error;

use crate::amount::TokenAmount;
use crate::signer::{SignerError, SigningProvider};
use crate::types::TokenRecord;

pub use rpc::{OwnedTokenAccount, RpcChainGateway};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("wallet not connected")]
    WalletDisconnected,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("rejected by remote: {0}")]
    RemoteRejected(String),

    #[error("remote unavailable: {0}")]
    RemoteUnavailable(String),
}

impl From<SignerError> for GatewayError {
    fn from(e: SignerError) -> Self {
        match e {
            SignerError::Disconnected => GatewayError::WalletDisconnected,
            SignerError::Rejected(msg) => GatewayError::RemoteRejected(msg),
        }
    }
}

/// Signature of a confirmed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfirmationHandle(pub String);

impl ConfirmationHandle {
    pub fn signature(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfirmationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// Create and initialise a new mint with `authority` as both mint and
    /// freeze authority. Returns once the creation is confirmed.
    async fn create_mint_account(
        &self,
        authority: &dyn SigningProvider,
        name: &str,
        symbol: &str,
        decimals: u8,
    ) -> Result<TokenRecord, GatewayError>;

    /// Mint `amount` of `token` into the authority's own associated account.
    async fn mint_supply(
        &self,
        authority: &dyn SigningProvider,
        token: &TokenRecord,
        amount: &TokenAmount,
    ) -> Result<ConfirmationHandle, GatewayError>;

    /// Move `amount` of `token` from the sender's associated account to the
    /// recipient's, creating the recipient's account if needed.
    async fn transfer(
        &self,
        sender: &dyn SigningProvider,
        token: &TokenRecord,
        recipient: &Address,
        amount: &TokenAmount,
    ) -> Result<ConfirmationHandle, GatewayError>;

    /// Raw balance of `token` held by `owner`. A missing associated account
    /// reads as zero.
    async fn query_balance(&self, owner: &Address, token: &Address) -> Result<u64, GatewayError>;
}

/// Reject an amount that was parsed for a different precision.
pub(crate) fn check_amount(token: &TokenRecord, amount: &TokenAmount) -> Result<u64, GatewayError> {
    if amount.decimals() != token.decimals {
        return Err(GatewayError::InvalidAmount(format!(
            "amount has {} decimals but {} uses {}",
            amount.decimals(),
            token.symbol,
            token.decimals
        )));
    }
    if amount.raw() == 0 {
        return Err(GatewayError::InvalidAmount(
            "amount must be greater than zero".into(),
        ));
    }
    Ok(amount.raw())
}
