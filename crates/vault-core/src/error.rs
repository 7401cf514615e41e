use thiserror::Error;

use crate::gateway::GatewayError;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("Wallet not connected")]
    WalletDisconnected,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("Unknown token: {0}")]
    UnknownToken(String),

    #[error("Remote rejected: {0}")]
    RemoteRejected(String),

    #[error("Remote unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl VaultError {
    /// Text shown to the user in an error notice. Remote rejections carry
    /// the endpoint's message when it sent one.
    pub fn user_message(&self) -> String {
        match self {
            VaultError::WalletDisconnected => "Please connect your wallet".to_string(),
            VaultError::InvalidInput(msg)
            | VaultError::InvalidAmount(msg)
            | VaultError::InvalidRecipient(msg) => msg.clone(),
            VaultError::RemoteRejected(msg) if !msg.trim().is_empty() => msg.clone(),
            VaultError::RemoteRejected(_) => "Something went wrong".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<GatewayError> for VaultError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::WalletDisconnected => VaultError::WalletDisconnected,
            GatewayError::InvalidInput(msg) => VaultError::InvalidInput(msg),
            GatewayError::InvalidAmount(msg) => VaultError::InvalidAmount(msg),
            GatewayError::InvalidRecipient(msg) => VaultError::InvalidRecipient(msg),
            GatewayError::RemoteRejected(msg) => VaultError::RemoteRejected(msg),
            GatewayError::RemoteUnavailable(msg) => VaultError::RemoteUnavailable(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_rejection_surfaces_endpoint_message() {
        let err = VaultError::RemoteRejected("insufficient funds".into());
        assert_eq!(err.user_message(), "insufficient funds");
    }

    #[test]
    fn empty_remote_rejection_gets_generic_message() {
        let err = VaultError::RemoteRejected("  ".into());
        assert_eq!(err.user_message(), "Something went wrong");
    }

    #[test]
    fn gateway_errors_keep_their_category() {
        let err: VaultError = GatewayError::InvalidRecipient("off curve".into()).into();
        assert!(matches!(err, VaultError::InvalidRecipient(msg) if msg == "off curve"));

        let err: VaultError = GatewayError::WalletDisconnected.into();
        assert!(matches!(err, VaultError::WalletDisconnected));
    }
}
