//! Balance refresh with last-request-wins semantics.
//!
//! Every call to [`BalanceRefresher::refresh`] takes a new generation number.
//! Results are committed per token as they arrive, and only while their
//! generation is still the newest one. A fetch that never resolves leaves
//! just its own token `Loading`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chain_sol::Address;
use futures_util::stream::{FuturesUnordered, StreamExt};

use crate::gateway::ChainGateway;
use crate::types::BalanceEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Every fetch finished while this refresh was still current.
    Completed { updated: usize, failed: usize },
    /// A newer refresh or a reset started before this one finished.
    Superseded,
}

pub struct BalanceRefresher {
    gateway: Arc<dyn ChainGateway>,
    generation: AtomicU64,
    board: Mutex<HashMap<Address, BalanceEntry>>,
}

impl BalanceRefresher {
    pub fn new(gateway: Arc<dyn ChainGateway>) -> Self {
        Self {
            gateway,
            generation: AtomicU64::new(0),
            board: Mutex::new(HashMap::new()),
        }
    }

    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn board(&self) -> MutexGuard<'_, HashMap<Address, BalanceEntry>> {
        // The board only ever holds plain values, so a poisoned guard is
        // still consistent.
        self.board.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fetch the balance of each token held by `owner`.
    ///
    /// Tokens not yet on the board start as `Loading`; tokens no longer in
    /// `tokens` are dropped. Failed fetches keep whatever value was shown.
    pub async fn refresh(&self, owner: Address, tokens: &[Address]) -> RefreshOutcome {
        let generation = {
            let mut board = self.board();
            board.retain(|token, _| tokens.contains(token));
            for token in tokens {
                board.entry(*token).or_insert(BalanceEntry::Loading);
            }
            self.generation.fetch_add(1, Ordering::SeqCst) + 1
        };
        log::debug!("balance refresh {generation} for {} tokens", tokens.len());

        let mut pending: FuturesUnordered<_> = tokens
            .iter()
            .map(|token| {
                let gateway = Arc::clone(&self.gateway);
                let token = *token;
                async move { (token, gateway.query_balance(&owner, &token).await) }
            })
            .collect();

        let mut updated = 0;
        let mut failed = 0;
        while let Some((token, result)) = pending.next().await {
            match result {
                Ok(raw) => {
                    let mut board = self.board();
                    if self.current_generation() != generation {
                        return RefreshOutcome::Superseded;
                    }
                    board.insert(token, BalanceEntry::Known(raw));
                    updated += 1;
                }
                Err(e) => {
                    if self.current_generation() != generation {
                        return RefreshOutcome::Superseded;
                    }
                    log::warn!("balance fetch for {token} failed: {e}");
                    failed += 1;
                }
            }
        }

        if self.current_generation() != generation {
            return RefreshOutcome::Superseded;
        }
        RefreshOutcome::Completed { updated, failed }
    }

    /// Invalidate in-flight refreshes and clear the board.
    pub fn reset(&self) {
        let mut board = self.board();
        self.generation.fetch_add(1, Ordering::SeqCst);
        board.clear();
    }

    pub fn balance(&self, token: &Address) -> Option<BalanceEntry> {
        self.board().get(token).copied()
    }

    pub fn snapshot(&self) -> HashMap<Address, BalanceEntry> {
        self.board().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::TokenAmount;
    use crate::gateway::{ConfirmationHandle, GatewayError};
    use crate::signer::SigningProvider;
    use crate::types::TokenRecord;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Balances keyed by token; tokens listed in `hang` never answer and the
    /// first call can be held until `release` fires.
    #[derive(Default)]
    struct ScriptedGateway {
        balances: Mutex<HashMap<Address, Result<u64, GatewayError>>>,
        hang: Vec<Address>,
        hold_first: bool,
        calls: AtomicUsize,
        entered: Notify,
        release: Notify,
    }

    impl ScriptedGateway {
        fn set(&self, token: Address, value: Result<u64, GatewayError>) {
            self.balances.lock().unwrap().insert(token, value);
        }
    }

    #[async_trait]
    impl ChainGateway for ScriptedGateway {
        async fn create_mint_account(
            &self,
            _: &dyn SigningProvider,
            _: &str,
            _: &str,
            _: u8,
        ) -> Result<TokenRecord, GatewayError> {
            Err(GatewayError::RemoteRejected("unsupported".into()))
        }

        async fn mint_supply(
            &self,
            _: &dyn SigningProvider,
            _: &TokenRecord,
            _: &TokenAmount,
        ) -> Result<ConfirmationHandle, GatewayError> {
            Err(GatewayError::RemoteRejected("unsupported".into()))
        }

        async fn transfer(
            &self,
            _: &dyn SigningProvider,
            _: &TokenRecord,
            _: &Address,
            _: &TokenAmount,
        ) -> Result<ConfirmationHandle, GatewayError> {
            Err(GatewayError::RemoteRejected("unsupported".into()))
        }

        async fn query_balance(&self, _: &Address, token: &Address) -> Result<u64, GatewayError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let answer = self
                .balances
                .lock()
                .unwrap()
                .get(token)
                .cloned()
                .unwrap_or(Ok(0));
            if self.hang.contains(token) {
                std::future::pending::<()>().await;
            }
            if self.hold_first && call == 0 {
                self.entered.notify_one();
                self.release.notified().await;
            }
            answer
        }
    }

    fn addr(byte: u8) -> Address {
        Address::new([byte; 32])
    }

    #[tokio::test]
    async fn refresh_commits_every_token() {
        let gateway = Arc::new(ScriptedGateway::default());
        gateway.set(addr(1), Ok(10_000));
        gateway.set(addr(2), Ok(5));
        let refresher = BalanceRefresher::new(gateway);

        let outcome = refresher.refresh(addr(9), &[addr(1), addr(2)]).await;

        assert_eq!(outcome, RefreshOutcome::Completed { updated: 2, failed: 0 });
        assert_eq!(refresher.balance(&addr(1)), Some(BalanceEntry::Known(10_000)));
        assert_eq!(refresher.balance(&addr(2)), Some(BalanceEntry::Known(5)));
    }

    #[tokio::test]
    async fn older_refresh_never_overwrites_newer() {
        let gateway = Arc::new(ScriptedGateway {
            hold_first: true,
            ..Default::default()
        });
        gateway.set(addr(1), Ok(1));
        let refresher = BalanceRefresher::new(gateway.clone());
        let tokens = [addr(1)];

        let (first, second) = tokio::join!(refresher.refresh(addr(9), &tokens), async {
            gateway.entered.notified().await;
            gateway.set(addr(1), Ok(2));
            let outcome = refresher.refresh(addr(9), &tokens).await;
            gateway.release.notify_one();
            outcome
        });

        assert_eq!(first, RefreshOutcome::Superseded);
        assert_eq!(second, RefreshOutcome::Completed { updated: 1, failed: 0 });
        assert_eq!(refresher.balance(&addr(1)), Some(BalanceEntry::Known(2)));
    }

    #[tokio::test]
    async fn hung_fetch_leaves_only_its_token_loading() {
        let gateway = Arc::new(ScriptedGateway {
            hang: vec![addr(2)],
            ..Default::default()
        });
        gateway.set(addr(1), Ok(7));
        let refresher = BalanceRefresher::new(gateway);

        let result = tokio::time::timeout(
            Duration::from_millis(100),
            refresher.refresh(addr(9), &[addr(1), addr(2)]),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(refresher.balance(&addr(1)), Some(BalanceEntry::Known(7)));
        assert_eq!(refresher.balance(&addr(2)), Some(BalanceEntry::Loading));
    }

    #[tokio::test]
    async fn failed_fetch_keeps_previous_value() {
        let gateway = Arc::new(ScriptedGateway::default());
        gateway.set(addr(1), Ok(300));
        let refresher = BalanceRefresher::new(gateway.clone());
        refresher.refresh(addr(9), &[addr(1)]).await;

        gateway.set(addr(1), Err(GatewayError::RemoteUnavailable("timeout".into())));
        let outcome = refresher.refresh(addr(9), &[addr(1), addr(3)]).await;

        assert_eq!(outcome, RefreshOutcome::Completed { updated: 1, failed: 1 });
        assert_eq!(refresher.balance(&addr(1)), Some(BalanceEntry::Known(300)));
        assert_eq!(refresher.balance(&addr(3)), Some(BalanceEntry::Known(0)));
    }

    #[tokio::test]
    async fn reset_clears_board_and_bumps_generation() {
        let gateway = Arc::new(ScriptedGateway::default());
        gateway.set(addr(1), Ok(1));
        let refresher = BalanceRefresher::new(gateway);
        refresher.refresh(addr(9), &[addr(1)]).await;
        let before = refresher.current_generation();

        refresher.reset();

        assert!(refresher.current_generation() > before);
        assert!(refresher.snapshot().is_empty());
    }

    #[tokio::test]
    async fn refresh_drops_tokens_outside_the_set() {
        let gateway = Arc::new(ScriptedGateway::default());
        let refresher = BalanceRefresher::new(gateway);
        refresher.refresh(addr(9), &[addr(1), addr(2)]).await;
        refresher.refresh(addr(9), &[addr(2)]).await;

        assert_eq!(refresher.balance(&addr(1)), None);
        assert_eq!(refresher.balance(&addr(2)), Some(BalanceEntry::Known(0)));
    }
}
