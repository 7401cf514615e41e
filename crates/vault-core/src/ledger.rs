//! Local record of the operations the user performed.

use chain_sol::Address;
use chrono::{DateTime, Utc};

use crate::types::{TokenRecord, TransactionKind, TransactionRecord};

/// Builds [`TransactionRecord`]s for confirmed operations and keeps a log
/// newest first.
#[derive(Debug, Clone, Default)]
pub struct TransactionRecorder;

impl TransactionRecorder {
    pub fn created(token: &TokenRecord) -> TransactionRecord {
        Self::record(TransactionKind::Create, "0", &token.symbol, token.address)
    }

    pub fn sent(token: &TokenRecord, amount: &str, recipient: Address) -> TransactionRecord {
        Self::record(TransactionKind::Send, amount, &token.symbol, recipient)
    }

    /// Minting credits the authority's own account, so it is logged as a
    /// receipt of the token.
    pub fn minted(token: &TokenRecord, amount: &str) -> TransactionRecord {
        Self::record(TransactionKind::Receive, amount, &token.symbol, token.address)
    }

    fn record(
        kind: TransactionKind,
        amount: &str,
        symbol: &str,
        counterparty: Address,
    ) -> TransactionRecord {
        let timestamp = Utc::now();
        TransactionRecord {
            id: new_id(kind, timestamp),
            kind,
            amount: amount.to_string(),
            symbol: symbol.to_string(),
            counterparty,
            timestamp,
        }
    }

    /// Prepend `record` to `log`.
    pub fn append(log: &mut Vec<TransactionRecord>, record: TransactionRecord) {
        log.insert(0, record);
    }

    /// Newest first by timestamp; equal timestamps keep log order, so the
    /// most recently appended comes first.
    pub fn display_order(log: &[TransactionRecord]) -> Vec<TransactionRecord> {
        let mut ordered = log.to_vec();
        ordered.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        ordered
    }
}

fn new_id(kind: TransactionKind, at: DateTime<Utc>) -> String {
    format!(
        "{}-{}-{}",
        kind.as_str(),
        at.timestamp_millis(),
        hex::encode(rand::random::<[u8; 4]>())
    )
}
