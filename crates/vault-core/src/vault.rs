//! The user-facing session: one connected wallet, its tokens, its log and
//! the balances shown for them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chain_sol::{shorten_address, Address, MAX_DECIMALS};

use crate::amount::{format_amount, parse_amount};
use crate::cache::{IdentityState, PersistenceCache};
use crate::config::VaultConfig;
use crate::error::VaultError;
use crate::gateway::{ChainGateway, RpcChainGateway};
use crate::ledger::TransactionRecorder;
use crate::refresh::{BalanceRefresher, RefreshOutcome};
use crate::signer::SigningProvider;
use crate::storage::{FileStore, KeyValueStore, MemoryStore};
use crate::types::{BalanceEntry, Notice, NoticeLevel, TokenRecord, TransactionRecord};

const APPROVE_PROMPT: &str = "Please approve the transaction in your wallet";

struct Session {
    signer: Arc<dyn SigningProvider>,
    identity: Address,
    state: IdentityState,
    selected: Option<Address>,
}

pub struct TokenVault {
    gateway: Arc<dyn ChainGateway>,
    cache: PersistenceCache,
    refresher: BalanceRefresher,
    session: Mutex<Option<Session>>,
    notices: Mutex<Vec<Notice>>,
}

impl TokenVault {
    pub fn new(
        gateway: Arc<dyn ChainGateway>,
        store: Arc<dyn KeyValueStore>,
        storage_prefix: impl Into<String>,
    ) -> Self {
        Self {
            refresher: BalanceRefresher::new(Arc::clone(&gateway)),
            gateway,
            cache: PersistenceCache::new(store, storage_prefix),
            session: Mutex::new(None),
            notices: Mutex::new(Vec::new()),
        }
    }

    /// RPC gateway plus a file store when `storage_dir` is set, otherwise
    /// an in-memory store.
    pub fn from_config(config: &VaultConfig) -> Result<Self, VaultError> {
        let gateway: Arc<dyn ChainGateway> = Arc::new(RpcChainGateway::new(config));
        let store: Arc<dyn KeyValueStore> = match &config.storage_dir {
            Some(dir) => Arc::new(FileStore::open(dir)?),
            None => Arc::new(MemoryStore::new()),
        };
        Ok(Self::new(gateway, store, config.storage_prefix.clone()))
    }

    fn session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // -----------------------------------------------------------------------
    // Connection
    // -----------------------------------------------------------------------

    /// Attach a wallet, load its saved tokens and log, and start a balance
    /// refresh.
    pub async fn connect(&self, signer: Arc<dyn SigningProvider>) -> Result<Address, VaultError> {
        let Some(identity) = signer.public_key() else {
            return self.fail("Wallet not connected", VaultError::WalletDisconnected);
        };

        let state = self.cache.load(&identity);
        log::info!(
            "connected {identity}: {} tokens, {} transactions",
            state.tokens.len(),
            state.transactions.len()
        );

        self.refresher.reset();
        *self.session() = Some(Session {
            signer,
            identity,
            state,
            selected: None,
        });

        self.refresh_for(identity).await;
        Ok(identity)
    }

    /// Drop the session. Saved data stays on disk.
    pub fn disconnect(&self) {
        if let Some(session) = self.session().take() {
            log::info!("disconnected {}", session.identity);
        }
        self.refresher.reset();
    }

    pub fn identity(&self) -> Option<Address> {
        self.session().as_ref().map(|s| s.identity)
    }

    pub fn tokens(&self) -> Vec<TokenRecord> {
        self.session()
            .as_ref()
            .map(|s| s.state.tokens.clone())
            .unwrap_or_default()
    }

    /// The log in display order, newest first.
    pub fn transactions(&self) -> Vec<TransactionRecord> {
        self.session()
            .as_ref()
            .map(|s| TransactionRecorder::display_order(&s.state.transactions))
            .unwrap_or_default()
    }

    pub fn select_token(&self, address: &Address) -> Result<(), VaultError> {
        let mut guard = self.session();
        let session = guard.as_mut().ok_or(VaultError::WalletDisconnected)?;
        if !session.state.tokens.iter().any(|t| t.address == *address) {
            return Err(VaultError::UnknownToken(address.to_string()));
        }
        session.selected = Some(*address);
        Ok(())
    }

    pub fn selected_token(&self) -> Option<TokenRecord> {
        let guard = self.session();
        let session = guard.as_ref()?;
        let selected = session.selected?;
        session
            .state
            .tokens
            .iter()
            .find(|t| t.address == selected)
            .cloned()
    }

    // -----------------------------------------------------------------------
    // Balances
    // -----------------------------------------------------------------------

    pub fn balance(&self, token: &Address) -> Option<BalanceEntry> {
        self.refresher.balance(token)
    }

    pub fn balances(&self) -> HashMap<Address, BalanceEntry> {
        self.refresher.snapshot()
    }

    /// `"100.00 TST"`, or `None` while the balance is unknown.
    pub fn display_balance(&self, token: &Address) -> Option<String> {
        let record = self.find_token(token)?;
        match self.refresher.balance(token)? {
            BalanceEntry::Known(raw) => Some(format!(
                "{} {}",
                format_amount(raw, record.decimals),
                record.symbol
            )),
            BalanceEntry::Loading => None,
        }
    }

    pub async fn refresh_balances(&self) -> Result<RefreshOutcome, VaultError> {
        let identity = self.identity().ok_or(VaultError::WalletDisconnected)?;
        let outcome = self.refresh_for(identity).await;
        if matches!(outcome, RefreshOutcome::Completed { .. }) {
            self.notify(
                NoticeLevel::Info,
                "Balances Updated",
                "Your token balances have been refreshed",
            );
        }
        Ok(outcome)
    }

    async fn refresh_for(&self, identity: Address) -> RefreshOutcome {
        let tokens: Vec<Address> = {
            let guard = self.session();
            match guard.as_ref() {
                Some(s) if s.identity == identity => {
                    s.state.tokens.iter().map(|t| t.address).collect()
                }
                _ => return RefreshOutcome::Superseded,
            }
        };
        self.refresher.refresh(identity, &tokens).await
    }

    // -----------------------------------------------------------------------
    // Mutating operations
    // -----------------------------------------------------------------------

    pub async fn create_token(
        &self,
        name: &str,
        symbol: &str,
        decimals: u8,
    ) -> Result<TokenRecord, VaultError> {
        let Some((signer, identity)) = self.signer() else {
            return self.fail("Wallet not connected", VaultError::WalletDisconnected);
        };
        let (name, symbol) = (name.trim(), symbol.trim());
        if name.is_empty() || symbol.is_empty() {
            return self.fail(
                "Missing Information",
                VaultError::InvalidInput("Please provide both token name and symbol".into()),
            );
        }
        if decimals > MAX_DECIMALS {
            return self.fail(
                "Invalid Decimals",
                VaultError::InvalidInput(format!("Decimals must be between 0 and {MAX_DECIMALS}")),
            );
        }

        self.notify(NoticeLevel::Info, "Creating Token", APPROVE_PROMPT);
        let token = match self
            .gateway
            .create_mint_account(signer.as_ref(), name, symbol, decimals)
            .await
        {
            Ok(token) => token,
            Err(e) => return self.fail("Error Creating Token", e.into()),
        };

        let record = TransactionRecorder::created(&token);
        let current = self.commit(identity, |state| {
            if !state.tokens.iter().any(|t| t.address == token.address) {
                state.tokens.push(token.clone());
            }
            TransactionRecorder::append(&mut state.transactions, record);
        });
        if current {
            if let Some(session) = self.session().as_mut() {
                session.selected = Some(token.address);
            }
        }

        self.notify(
            NoticeLevel::Success,
            "Token Created!",
            format!("Your token {} was successfully created", token.symbol),
        );
        if current {
            self.refresh_for(identity).await;
        }
        Ok(token)
    }

    /// Mint `amount` (display units) of `token` to the connected wallet.
    pub async fn mint(&self, token: &Address, amount: &str) -> Result<(), VaultError> {
        let Some((signer, identity)) = self.signer() else {
            return self.fail("Cannot Mint Tokens", VaultError::WalletDisconnected);
        };
        let Some(record) = self.find_token(token) else {
            return self.fail("Cannot Mint Tokens", VaultError::UnknownToken(token.to_string()));
        };
        let parsed = match parse_amount(amount, record.decimals) {
            Ok(parsed) => parsed,
            Err(e) => return self.fail("Invalid Amount", e),
        };

        self.notify(NoticeLevel::Info, "Minting Tokens", APPROVE_PROMPT);
        let handle = match self
            .gateway
            .mint_supply(signer.as_ref(), &record, &parsed)
            .await
        {
            Ok(handle) => handle,
            Err(e) => return self.fail("Error Minting Tokens", e.into()),
        };
        log::info!("minted {} {} in {handle}", parsed.entered(), record.symbol);

        let entry = TransactionRecorder::minted(&record, parsed.entered());
        let current = self.commit(identity, |state| {
            TransactionRecorder::append(&mut state.transactions, entry);
        });

        self.notify(
            NoticeLevel::Success,
            "Tokens Minted!",
            format!("Successfully minted {} {}", parsed.entered(), record.symbol),
        );
        if current {
            self.refresh_for(identity).await;
        }
        Ok(())
    }

    /// Send `amount` (display units) of `token` to `recipient`.
    pub async fn send(&self, token: &Address, recipient: &str, amount: &str) -> Result<(), VaultError> {
        let Some((signer, identity)) = self.signer() else {
            return self.fail("Cannot Send Tokens", VaultError::WalletDisconnected);
        };
        let Some(record) = self.find_token(token) else {
            return self.fail("Cannot Send Tokens", VaultError::UnknownToken(token.to_string()));
        };
        let recipient = recipient.trim();
        if recipient.is_empty() {
            return self.fail(
                "Missing Recipient",
                VaultError::InvalidRecipient("Please enter a recipient address".into()),
            );
        }
        let Ok(to) = recipient.parse::<Address>() else {
            return self.fail(
                "Invalid Recipient",
                VaultError::InvalidRecipient(format!("'{recipient}' is not a valid address")),
            );
        };
        let parsed = match parse_amount(amount, record.decimals) {
            Ok(parsed) => parsed,
            Err(e) => return self.fail("Invalid Amount", e),
        };

        self.notify(NoticeLevel::Info, "Sending Tokens", APPROVE_PROMPT);
        let handle = match self
            .gateway
            .transfer(signer.as_ref(), &record, &to, &parsed)
            .await
        {
            Ok(handle) => handle,
            Err(e) => return self.fail("Error Sending Tokens", e.into()),
        };
        log::info!("sent {} {} to {to} in {handle}", parsed.entered(), record.symbol);

        let entry = TransactionRecorder::sent(&record, parsed.entered(), to);
        let current = self.commit(identity, |state| {
            TransactionRecorder::append(&mut state.transactions, entry);
        });

        self.notify(
            NoticeLevel::Success,
            "Tokens Sent!",
            format!(
                "Successfully sent {} {} to {}",
                parsed.entered(),
                record.symbol,
                shorten_address(recipient, 4)
            ),
        );
        if current {
            self.refresh_for(identity).await;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Notices
    // -----------------------------------------------------------------------

    /// Take every notice emitted since the last call, oldest first.
    pub fn drain_notices(&self) -> Vec<Notice> {
        std::mem::take(
            &mut *self
                .notices
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        )
    }

    fn notify(&self, level: NoticeLevel, title: &str, description: impl Into<String>) {
        let notice = Notice::new(level, title, description);
        match level {
            NoticeLevel::Error => log::warn!("{}: {}", notice.title, notice.description),
            _ => log::debug!("{}: {}", notice.title, notice.description),
        }
        self.notices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(notice);
    }

    fn fail<T>(&self, title: &str, error: VaultError) -> Result<T, VaultError> {
        self.notify(NoticeLevel::Error, title, error.user_message());
        Err(error)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn signer(&self) -> Option<(Arc<dyn SigningProvider>, Address)> {
        self.session()
            .as_ref()
            .map(|s| (Arc::clone(&s.signer), s.identity))
    }

    fn find_token(&self, address: &Address) -> Option<TokenRecord> {
        self.session()
            .as_ref()?
            .state
            .tokens
            .iter()
            .find(|t| t.address == *address)
            .cloned()
    }

    /// Apply a confirmed change to `identity`'s state and save it. If the
    /// wallet switched while the operation was in flight, the change goes to
    /// `identity`'s saved state instead of the visible one. Returns whether
    /// `identity` is still the connected one.
    fn commit<F>(&self, identity: Address, mutate: F) -> bool
    where
        F: FnOnce(&mut IdentityState),
    {
        {
            let mut guard = self.session();
            if let Some(session) = guard.as_mut().filter(|s| s.identity == identity) {
                mutate(&mut session.state);
                self.persist(&identity, &session.state);
                return true;
            }
        }

        log::info!("{identity} disconnected before its operation confirmed; saving offline");
        let mut state = self.cache.load(&identity);
        mutate(&mut state);
        self.persist(&identity, &state);
        false
    }

    fn persist(&self, identity: &Address, state: &IdentityState) {
        if let Err(e) = self.cache.save(identity, state) {
            log::error!("failed to save state for {identity}: {e}");
        }
    }
}
