use async_trait::async_trait;
use chain_sol::Address;
use thiserror::Error;

use crate::gateway::GatewayError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignerError {
    #[error("wallet is not connected")]
    Disconnected,

    #[error("signature request rejected: {0}")]
    Rejected(String),
}

/// The connected wallet. Holds the user's key and signs transaction messages
/// on request; the vault never sees the secret.
#[async_trait]
pub trait SigningProvider: Send + Sync {
    /// The wallet's public key, or `None` while disconnected.
    fn public_key(&self) -> Option<Address>;

    /// Sign serialized message bytes. May wait on user approval.
    async fn sign_message(&self, message: &[u8]) -> Result<[u8; 64], SignerError>;
}

/// The signer's identity, or `WalletDisconnected`.
pub fn require_identity(signer: &dyn SigningProvider) -> Result<Address, GatewayError> {
    signer.public_key().ok_or(GatewayError::WalletDisconnected)
}
