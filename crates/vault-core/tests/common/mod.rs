//! Shared fixtures: an in-memory ledger standing in for the RPC gateway and
//! a signer backed by a local keypair.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chain_sol::Address;
use ed25519_dalek::{Signer, SigningKey};
use tokio::sync::Notify;
use vault_core::{
    ChainGateway, ConfirmationHandle, GatewayError, SignerError, SigningProvider, TokenAmount,
    TokenRecord,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub struct KeypairSigner {
    key: SigningKey,
    reject: AtomicBool,
}

impl KeypairSigner {
    pub fn from_seed(seed: u8) -> Self {
        Self {
            key: SigningKey::from_bytes(&[seed; 32]),
            reject: AtomicBool::new(false),
        }
    }

    pub fn address(&self) -> Address {
        Address::new(self.key.verifying_key().to_bytes())
    }

    /// Make the next signature requests fail as if the user declined.
    pub fn reject_requests(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }
}

#[async_trait]
impl SigningProvider for KeypairSigner {
    fn public_key(&self) -> Option<Address> {
        Some(self.address())
    }

    async fn sign_message(&self, message: &[u8]) -> Result<[u8; 64], SignerError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(SignerError::Rejected("User rejected the request.".into()));
        }
        Ok(self.key.sign(message).to_bytes())
    }
}

/// Token balances keyed by (owner, mint), with knobs for failure injection.
#[derive(Default)]
pub struct FakeLedger {
    balances: Mutex<HashMap<(Address, Address), u64>>,
    reject_next: Mutex<Option<String>>,
    fail_queries: AtomicBool,
    mints_created: AtomicUsize,
    mutations: AtomicUsize,
    queries: AtomicUsize,
    hold_mutations: AtomicBool,
    pub entered: Notify,
    pub release: Notify,
}

impl FakeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next mutating call fails with `message`.
    pub fn reject_next(&self, message: &str) {
        *self.reject_next.lock().unwrap() = Some(message.to_string());
    }

    pub fn fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    /// Park every mutating call after it is accepted until `release` fires.
    pub fn hold_mutations(&self, hold: bool) {
        self.hold_mutations.store(hold, Ordering::SeqCst);
    }

    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    pub fn balance_of(&self, owner: &Address, mint: &Address) -> u64 {
        self.balances
            .lock()
            .unwrap()
            .get(&(*owner, *mint))
            .copied()
            .unwrap_or(0)
    }

    async fn begin_mutation(&self, signer: &dyn SigningProvider) -> Result<Address, GatewayError> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        let owner = signer.public_key().ok_or(GatewayError::WalletDisconnected)?;
        signer.sign_message(b"approve").await?;
        if let Some(message) = self.reject_next.lock().unwrap().take() {
            return Err(GatewayError::RemoteRejected(message));
        }
        if self.hold_mutations.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        Ok(owner)
    }

    fn handle(&self) -> ConfirmationHandle {
        ConfirmationHandle(format!("sig-{}", self.mutations.load(Ordering::SeqCst)))
    }
}

#[async_trait]
impl ChainGateway for FakeLedger {
    async fn create_mint_account(
        &self,
        authority: &dyn SigningProvider,
        name: &str,
        symbol: &str,
        decimals: u8,
    ) -> Result<TokenRecord, GatewayError> {
        let owner = self.begin_mutation(authority).await?;
        let n = self.mints_created.fetch_add(1, Ordering::SeqCst) as u64 + 1;
        let mut bytes = [0xAAu8; 32];
        bytes[..8].copy_from_slice(&n.to_le_bytes());

        Ok(TokenRecord {
            address: Address::new(bytes),
            name: name.to_string(),
            symbol: symbol.to_string(),
            mint_authority: owner,
            freeze_authority: Some(owner),
            decimals,
        })
    }

    async fn mint_supply(
        &self,
        authority: &dyn SigningProvider,
        token: &TokenRecord,
        amount: &TokenAmount,
    ) -> Result<ConfirmationHandle, GatewayError> {
        let owner = self.begin_mutation(authority).await?;
        *self
            .balances
            .lock()
            .unwrap()
            .entry((owner, token.address))
            .or_insert(0) += amount.raw();
        Ok(self.handle())
    }

    async fn transfer(
        &self,
        sender: &dyn SigningProvider,
        token: &TokenRecord,
        recipient: &Address,
        amount: &TokenAmount,
    ) -> Result<ConfirmationHandle, GatewayError> {
        let owner = self.begin_mutation(sender).await?;
        let mut balances = self.balances.lock().unwrap();
        let from = balances.entry((owner, token.address)).or_insert(0);
        if *from < amount.raw() {
            return Err(GatewayError::RemoteRejected(
                "Error processing Instruction 1: custom program error: 0x1".into(),
            ));
        }
        *from -= amount.raw();
        *balances.entry((*recipient, token.address)).or_insert(0) += amount.raw();
        Ok(self.handle())
    }

    async fn query_balance(&self, owner: &Address, token: &Address) -> Result<u64, GatewayError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(GatewayError::RemoteUnavailable("connection refused".into()));
        }
        Ok(self.balance_of(owner, token))
    }
}
