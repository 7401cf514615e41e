//! SPL token vault core.
//!
//! Keeps the token list, transaction log and balances of a connected Solana
//! wallet in sync with the chain and with local storage:
//!
//! - [`gateway`]: the four remote operations (create mint, mint, transfer,
//!   balance) and their JSON-RPC implementation.
//! - [`cache`]: per-identity persistence over a [`storage::KeyValueStore`].
//! - [`refresh`]: generation-tagged balance refresh.
//! - [`ledger`]: transaction records appended after confirmed operations.
//! - [`vault`]: the session that ties them together and emits notices.
//!
//! Signing is delegated to a [`signer::SigningProvider`]; the vault never
//! holds the wallet's key.

pub mod amount;
pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod refresh;
pub mod signer;
pub mod storage;
pub mod types;
pub mod vault;

pub use amount::{format_amount, parse_amount, TokenAmount};
pub use cache::{IdentityState, PersistenceCache};
pub use config::{Commitment, VaultConfig, VaultConfigBuilder};
pub use error::VaultError;
pub use gateway::{ChainGateway, ConfirmationHandle, GatewayError, OwnedTokenAccount, RpcChainGateway};
pub use ledger::TransactionRecorder;
pub use refresh::{BalanceRefresher, RefreshOutcome};
pub use signer::{SignerError, SigningProvider};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use types::{BalanceEntry, Notice, NoticeLevel, TokenRecord, TransactionKind, TransactionRecord};
pub use vault::TokenVault;
