use chain_sol::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A token mint created by the connected wallet.
///
/// Field names on disk match the browser build's local storage layout so
/// previously saved token lists keep loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
    #[serde(rename = "tokenAddress")]
    pub address: Address,
    #[serde(rename = "tokenName")]
    pub name: String,
    #[serde(rename = "tokenSymbol")]
    pub symbol: String,
    pub mint_authority: Address,
    pub freeze_authority: Option<Address>,
    pub decimals: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Token creation. Older saves wrote this as `mint`.
    #[serde(alias = "mint")]
    Create,
    Send,
    Receive,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Create => "create",
            TransactionKind::Send => "send",
            TransactionKind::Receive => "receive",
        }
    }
}

/// One entry in the local transaction log. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    /// Amount as the user entered it, in display units.
    pub amount: String,
    pub symbol: String,
    #[serde(rename = "address")]
    pub counterparty: Address,
    pub timestamp: DateTime<Utc>,
}

/// Balance of one token as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceEntry {
    /// Requested but never successfully fetched.
    Loading,
    /// Raw amount in minor units.
    Known(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// A user-visible notification (a toast in the browser build).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub description: String,
}

impl Notice {
    pub fn new(level: NoticeLevel, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            description: description.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_record_uses_stored_field_names() {
        let token = TokenRecord {
            address: Address::new([1u8; 32]),
            name: "Test".into(),
            symbol: "TST".into(),
            mint_authority: Address::new([2u8; 32]),
            freeze_authority: None,
            decimals: 2,
        };
        let json = serde_json::to_value(&token).unwrap();

        assert!(json.get("tokenAddress").is_some());
        assert_eq!(json["tokenName"], "Test");
        assert_eq!(json["tokenSymbol"], "TST");
        assert!(json.get("mintAuthority").is_some());
        assert!(json["freezeAuthority"].is_null());
        assert_eq!(json["decimals"], 2);
    }

    #[test]
    fn legacy_mint_kind_reads_as_create() {
        let kind: TransactionKind = serde_json::from_str("\"mint\"").unwrap();
        assert_eq!(kind, TransactionKind::Create);

        let written = serde_json::to_string(&TransactionKind::Create).unwrap();
        assert_eq!(written, "\"create\"");
    }

    #[test]
    fn transaction_record_parses_browser_timestamp() {
        let json = r#"{
            "id": "create-1700000000000",
            "type": "mint",
            "amount": "0",
            "symbol": "TST",
            "address": "11111111111111111111111111111111",
            "timestamp": "2023-11-14T22:13:20.000Z"
        }"#;
        let record: TransactionRecord = serde_json::from_str(json).unwrap();

        assert_eq!(record.kind, TransactionKind::Create);
        assert_eq!(record.counterparty, Address::new([0u8; 32]));
        assert_eq!(record.timestamp.timestamp(), 1_700_000_000);
    }
}
