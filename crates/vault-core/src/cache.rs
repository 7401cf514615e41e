//! Per-identity token list and transaction log, persisted as JSON.

use std::collections::HashSet;
use std::sync::Arc;

use chain_sol::{Address, MAX_DECIMALS};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::VaultError;
use crate::storage::KeyValueStore;
use crate::types::{TokenRecord, TransactionRecord};

/// Everything persisted for one wallet identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityState {
    pub tokens: Vec<TokenRecord>,
    /// Newest first.
    pub transactions: Vec<TransactionRecord>,
}

#[derive(Clone)]
pub struct PersistenceCache {
    store: Arc<dyn KeyValueStore>,
    prefix: String,
}

impl PersistenceCache {
    pub fn new(store: Arc<dyn KeyValueStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    pub fn tokens_key(&self, identity: &Address) -> String {
        format!("{}-tokens-{}", self.prefix, identity)
    }

    pub fn transactions_key(&self, identity: &Address) -> String {
        format!("{}-transactions-{}", self.prefix, identity)
    }

    /// Load the saved state for `identity`. The two collections load
    /// independently: a missing or unreadable entry becomes empty without
    /// affecting the other.
    pub fn load(&self, identity: &Address) -> IdentityState {
        let mut tokens: Vec<TokenRecord> = self.read_list(&self.tokens_key(identity));

        let mut seen = HashSet::new();
        tokens.retain(|t| {
            if t.decimals > MAX_DECIMALS {
                log::warn!("dropping saved token {} with {} decimals", t.address, t.decimals);
                return false;
            }
            seen.insert(t.address)
        });

        let transactions = self.read_list(&self.transactions_key(identity));

        IdentityState {
            tokens,
            transactions,
        }
    }

    /// Write both collections for `identity`, replacing what was there.
    pub fn save(&self, identity: &Address, state: &IdentityState) -> Result<(), VaultError> {
        self.write_list(&self.tokens_key(identity), &state.tokens)?;
        self.write_list(&self.transactions_key(identity), &state.transactions)
    }

    fn read_list<T: DeserializeOwned>(&self, key: &str) -> Vec<T> {
        let raw = match self.store.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                log::warn!("could not read {key}: {e}");
                return Vec::new();
            }
        };

        serde_json::from_str(&raw).unwrap_or_else(|e| {
            log::warn!("discarding corrupt entry {key}: {e}");
            Vec::new()
        })
    }

    fn write_list<T: Serialize>(&self, key: &str, items: &[T]) -> Result<(), VaultError> {
        let json = serde_json::to_string(items)
            .map_err(|e| VaultError::Storage(format!("cannot encode {key}: {e}")))?;
        self.store.set(key, &json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::types::TransactionKind;
    use chrono::{TimeZone, Utc};

    fn token(byte: u8, decimals: u8) -> TokenRecord {
        TokenRecord {
            address: Address::new([byte; 32]),
            name: format!("Token {byte}"),
            symbol: format!("T{byte}"),
            mint_authority: Address::new([9u8; 32]),
            freeze_authority: Some(Address::new([9u8; 32])),
            decimals,
        }
    }

    fn record(id: &str) -> TransactionRecord {
        TransactionRecord {
            id: id.into(),
            kind: TransactionKind::Send,
            amount: "1.5".into(),
            symbol: "T1".into(),
            counterparty: Address::new([7u8; 32]),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    fn cache() -> (Arc<MemoryStore>, PersistenceCache) {
        let store = Arc::new(MemoryStore::new());
        let cache = PersistenceCache::new(store.clone(), "solana");
        (store, cache)
    }

    #[test]
    fn keys_include_prefix_and_identity() {
        let (_, cache) = cache();
        let id = Address::new([0u8; 32]);
        assert_eq!(
            cache.tokens_key(&id),
            "solana-tokens-11111111111111111111111111111111"
        );
        assert_eq!(
            cache.transactions_key(&id),
            "solana-transactions-11111111111111111111111111111111"
        );
    }

    #[test]
    fn save_then_load_returns_same_state() {
        let (_, cache) = cache();
        let id = Address::new([3u8; 32]);
        let state = IdentityState {
            tokens: vec![token(1, 2), token(2, 9)],
            transactions: vec![record("send-2"), record("send-1")],
        };

        cache.save(&id, &state).unwrap();
        assert_eq!(cache.load(&id), state);
    }

    #[test]
    fn unknown_identity_loads_empty() {
        let (_, cache) = cache();
        assert_eq!(cache.load(&Address::new([4u8; 32])), IdentityState::default());
    }

    #[test]
    fn corrupt_tokens_do_not_lose_transactions() {
        let (store, cache) = cache();
        let id = Address::new([5u8; 32]);
        cache
            .save(&id, &IdentityState {
                tokens: vec![token(1, 2)],
                transactions: vec![record("send-1")],
            })
            .unwrap();
        store.set(&cache.tokens_key(&id), "{not json").unwrap();

        let loaded = cache.load(&id);
        assert!(loaded.tokens.is_empty());
        assert_eq!(loaded.transactions, vec![record("send-1")]);
    }

    #[test]
    fn load_drops_duplicates_and_bad_decimals() {
        let (store, cache) = cache();
        let id = Address::new([6u8; 32]);
        let tokens = vec![token(1, 2), token(1, 4), token(2, 12)];
        store
            .set(&cache.tokens_key(&id), &serde_json::to_string(&tokens).unwrap())
            .unwrap();

        let loaded = cache.load(&id);
        assert_eq!(loaded.tokens, vec![token(1, 2)]);
    }
}
