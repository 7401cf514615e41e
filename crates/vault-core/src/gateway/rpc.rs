//! Solana JSON-RPC implementation of [`ChainGateway`].

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chain_sol::{
    address_to_bytes, assemble_signed_transaction, build_create_account_instruction,
    build_create_associated_account_idempotent, build_initialize_mint, build_mint_to,
    build_spl_transfer, compile_transaction, decode_token_account,
    derive_associated_token_address, is_on_curve, serialize_message, sign_with_secret, Address,
    SolInstruction, MAX_DECIMALS, MINT_ACCOUNT_SIZE, TOKEN_PROGRAM_ID,
};
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use zeroize::Zeroizing;

use super::{check_amount, ChainGateway, ConfirmationHandle, GatewayError};
use crate::amount::TokenAmount;
use crate::config::{Commitment, VaultConfig};
use crate::signer::{require_identity, SigningProvider};
use crate::types::TokenRecord;

/// A token account returned by `getTokenAccountsByOwner`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedTokenAccount {
    pub address: Address,
    pub mint: Address,
    pub amount: u64,
}

#[derive(Clone)]
pub struct RpcChainGateway {
    url: String,
    client: Client,
    commitment: Commitment,
    poll_interval: Duration,
    max_attempts: u32,
}

impl RpcChainGateway {
    pub fn new(config: &VaultConfig) -> Self {
        Self {
            url: config.rpc_url.clone(),
            client: Client::new(),
            commitment: config.commitment,
            poll_interval: config.confirm_poll_interval,
            max_attempts: config.confirm_max_attempts,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcFailure> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        log::debug!("rpc {method}");
        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| RpcFailure::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RpcFailure::Transport(e.to_string()))?;

        let parsed: RpcResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(RpcFailure::Transport(format!("{method}: HTTP {status}")));
            }
            Err(e) => return Err(RpcFailure::Malformed(format!("{method}: {e}"))),
        };

        if let Some(error) = parsed.error {
            return Err(RpcFailure::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        parsed
            .result
            .ok_or_else(|| RpcFailure::Malformed(format!("{method}: no result in response")))
    }

    async fn latest_blockhash(&self) -> Result<[u8; 32], RpcFailure> {
        let result = self
            .call(
                "getLatestBlockhash",
                json!([{ "commitment": self.commitment.as_str() }]),
            )
            .await?;
        let hash = result["value"]["blockhash"]
            .as_str()
            .ok_or_else(|| RpcFailure::Malformed("getLatestBlockhash: missing blockhash".into()))?;
        address_to_bytes(hash).map_err(|e| RpcFailure::Malformed(e.to_string()))
    }

    async fn rent_exempt_minimum(&self, size: usize) -> Result<u64, RpcFailure> {
        let result = self
            .call(
                "getMinimumBalanceForRentExemption",
                json!([size, { "commitment": self.commitment.as_str() }]),
            )
            .await?;
        result.as_u64().ok_or_else(|| {
            RpcFailure::Malformed("getMinimumBalanceForRentExemption: not a number".into())
        })
    }

    /// Raw data of an account, or `None` if it does not exist.
    async fn account_data(&self, address: &Address) -> Result<Option<Vec<u8>>, RpcFailure> {
        let result = self
            .call(
                "getAccountInfo",
                json!([
                    address.to_string(),
                    { "encoding": "base64", "commitment": self.commitment.as_str() }
                ]),
            )
            .await?;

        let value = &result["value"];
        if value.is_null() {
            return Ok(None);
        }
        decode_account_data(&value["data"]).map(Some)
    }

    async fn send_transaction(&self, wire: &[u8]) -> Result<String, RpcFailure> {
        let result = self
            .call(
                "sendTransaction",
                json!([
                    BASE64.encode(wire),
                    { "encoding": "base64", "preflightCommitment": self.commitment.as_str() }
                ]),
            )
            .await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| RpcFailure::Malformed("sendTransaction: signature is not a string".into()))
    }

    /// Poll until `signature` reaches the configured commitment.
    async fn confirm(&self, signature: &str) -> Result<(), GatewayError> {
        for attempt in 1..=self.max_attempts {
            let result = self
                .call(
                    "getSignatureStatuses",
                    json!([[signature], { "searchTransactionHistory": false }]),
                )
                .await
                .map_err(RpcFailure::into_rejected)?;

            let status = &result["value"][0];
            if !status.is_null() {
                if !status["err"].is_null() {
                    return Err(GatewayError::RemoteRejected(format!(
                        "transaction {signature} failed: {}",
                        status["err"]
                    )));
                }
                let reached = status["confirmationStatus"]
                    .as_str()
                    .and_then(|s| s.parse::<Commitment>().ok())
                    .unwrap_or(Commitment::Processed);
                if reached >= self.commitment {
                    log::info!("transaction {signature} {}", reached.as_str());
                    return Ok(());
                }
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(self.poll_interval).await;
            }
        }

        Err(GatewayError::RemoteRejected(format!(
            "transaction {signature} was not confirmed after {} attempts",
            self.max_attempts
        )))
    }

    /// Compile, sign, submit and confirm. `local_signers` are keys the vault
    /// generated itself; the wallet signs as fee payer.
    async fn submit(
        &self,
        wallet: &dyn SigningProvider,
        instructions: &[SolInstruction],
        local_signers: &[&SigningKey],
    ) -> Result<ConfirmationHandle, GatewayError> {
        let payer = require_identity(wallet)?;
        let blockhash = self
            .latest_blockhash()
            .await
            .map_err(RpcFailure::into_rejected)?;

        let tx = compile_transaction(instructions, payer.as_bytes(), &blockhash)
            .map_err(|e| GatewayError::InvalidInput(e.to_string()))?;
        let message = serialize_message(&tx).map_err(|e| GatewayError::InvalidInput(e.to_string()))?;

        let mut signatures = Vec::with_capacity(1 + local_signers.len());
        signatures.push((payer.to_bytes(), wallet.sign_message(&message).await?));
        for key in local_signers {
            let secret = Zeroizing::new(key.to_bytes());
            signatures.push((key.verifying_key().to_bytes(), sign_with_secret(&message, &secret)));
        }

        let wire = assemble_signed_transaction(&tx, &signatures)
            .map_err(|e| GatewayError::RemoteRejected(e.to_string()))?;
        let signature = self
            .send_transaction(&wire)
            .await
            .map_err(RpcFailure::into_rejected)?;
        log::info!("submitted transaction {signature}");

        self.confirm(&signature).await?;
        Ok(ConfirmationHandle(signature))
    }

    /// Native SOL balance of `owner` in lamports.
    pub async fn sol_balance(&self, owner: &Address) -> Result<u64, GatewayError> {
        let result = self
            .call(
                "getBalance",
                json!([owner.to_string(), { "commitment": self.commitment.as_str() }]),
            )
            .await
            .map_err(RpcFailure::into_unavailable)?;
        result["value"]
            .as_u64()
            .ok_or_else(|| GatewayError::RemoteUnavailable("getBalance: missing value".into()))
    }

    /// Every SPL token account owned by `owner`.
    pub async fn token_accounts_by_owner(
        &self,
        owner: &Address,
    ) -> Result<Vec<OwnedTokenAccount>, GatewayError> {
        let result = self
            .call(
                "getTokenAccountsByOwner",
                json!([
                    owner.to_string(),
                    { "programId": Address::new(TOKEN_PROGRAM_ID).to_string() },
                    { "encoding": "base64", "commitment": self.commitment.as_str() }
                ]),
            )
            .await
            .map_err(RpcFailure::into_unavailable)?;

        let entries = result["value"].as_array().ok_or_else(|| {
            GatewayError::RemoteUnavailable("getTokenAccountsByOwner: missing value".into())
        })?;

        let mut accounts = Vec::with_capacity(entries.len());
        for entry in entries {
            let address = entry["pubkey"]
                .as_str()
                .and_then(|s| s.parse::<Address>().ok())
                .ok_or_else(|| {
                    GatewayError::RemoteUnavailable("token account without a valid pubkey".into())
                })?;
            let data = decode_account_data(&entry["account"]["data"])
                .map_err(RpcFailure::into_unavailable)?;
            let account = decode_token_account(&data)
                .map_err(|e| GatewayError::RemoteUnavailable(e.to_string()))?;
            accounts.push(OwnedTokenAccount {
                address,
                mint: Address::new(account.mint),
                amount: account.amount,
            });
        }
        Ok(accounts)
    }
}

#[async_trait]
impl ChainGateway for RpcChainGateway {
    async fn create_mint_account(
        &self,
        authority: &dyn SigningProvider,
        name: &str,
        symbol: &str,
        decimals: u8,
    ) -> Result<TokenRecord, GatewayError> {
        if decimals > MAX_DECIMALS {
            return Err(GatewayError::InvalidInput(format!(
                "decimals must be between 0 and {MAX_DECIMALS}"
            )));
        }
        if name.trim().is_empty() || symbol.trim().is_empty() {
            return Err(GatewayError::InvalidInput(
                "token name and symbol are required".into(),
            ));
        }
        let owner = require_identity(authority)?;

        let mint_key = SigningKey::generate(&mut OsRng);
        let mint = Address::new(mint_key.verifying_key().to_bytes());

        let lamports = self
            .rent_exempt_minimum(MINT_ACCOUNT_SIZE)
            .await
            .map_err(RpcFailure::into_rejected)?;

        let instructions = [
            build_create_account_instruction(
                owner.as_bytes(),
                mint.as_bytes(),
                lamports,
                MINT_ACCOUNT_SIZE as u64,
                &TOKEN_PROGRAM_ID,
            ),
            build_initialize_mint(mint.as_bytes(), decimals, owner.as_bytes(), Some(owner.as_bytes()))
                .map_err(|e| GatewayError::InvalidInput(e.to_string()))?,
        ];

        let handle = self.submit(authority, &instructions, &[&mint_key]).await?;
        log::info!("created mint {mint} ({symbol}) in {handle}");

        Ok(TokenRecord {
            address: mint,
            name: name.trim().to_string(),
            symbol: symbol.trim().to_string(),
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
        let raw = check_amount(token, amount)?;
        let owner = require_identity(authority)?;

        let (create_ata, ata) = build_create_associated_account_idempotent(
            owner.as_bytes(),
            owner.as_bytes(),
            token.address.as_bytes(),
        )
        .map_err(|e| GatewayError::InvalidInput(e.to_string()))?;
        let mint_to = build_mint_to(token.address.as_bytes(), &ata, owner.as_bytes(), raw)
            .map_err(|e| GatewayError::InvalidAmount(e.to_string()))?;

        self.submit(authority, &[create_ata, mint_to], &[]).await
    }

    async fn transfer(
        &self,
        sender: &dyn SigningProvider,
        token: &TokenRecord,
        recipient: &Address,
        amount: &TokenAmount,
    ) -> Result<ConfirmationHandle, GatewayError> {
        let raw = check_amount(token, amount)?;
        if !is_on_curve(recipient.as_bytes()) {
            return Err(GatewayError::InvalidRecipient(format!(
                "{recipient} is not a wallet address"
            )));
        }
        let owner = require_identity(sender)?;

        let source = derive_associated_token_address(owner.as_bytes(), token.address.as_bytes())
            .map_err(|e| GatewayError::InvalidInput(e.to_string()))?;
        let (create_ata, destination) = build_create_associated_account_idempotent(
            owner.as_bytes(),
            recipient.as_bytes(),
            token.address.as_bytes(),
        )
        .map_err(|e| GatewayError::InvalidRecipient(e.to_string()))?;
        let transfer = build_spl_transfer(&source, &destination, owner.as_bytes(), raw)
            .map_err(|e| GatewayError::InvalidAmount(e.to_string()))?;

        self.submit(sender, &[create_ata, transfer], &[]).await
    }

    async fn query_balance(&self, owner: &Address, token: &Address) -> Result<u64, GatewayError> {
        let ata = derive_associated_token_address(owner.as_bytes(), token.as_bytes())
            .map_err(|e| GatewayError::InvalidInput(e.to_string()))?;

        match self
            .account_data(&Address::new(ata))
            .await
            .map_err(RpcFailure::into_unavailable)?
        {
            None => Ok(0),
            Some(data) => decode_token_account(&data)
                .map(|account| account.amount)
                .map_err(|e| GatewayError::RemoteUnavailable(e.to_string())),
        }
    }
}

/// Decode `["<base64>", "base64"]` account data.
fn decode_account_data(data: &Value) -> Result<Vec<u8>, RpcFailure> {
    let encoded = data[0]
        .as_str()
        .ok_or_else(|| RpcFailure::Malformed("account data is not base64 encoded".into()))?;
    BASE64
        .decode(encoded)
        .map_err(|e| RpcFailure::Malformed(format!("account data: {e}")))
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug)]
enum RpcFailure {
    Transport(String),
    Rpc { code: i64, message: String },
    Malformed(String),
}

impl RpcFailure {
    /// Failure of a submission path: the endpoint's message is kept.
    fn into_rejected(self) -> GatewayError {
        match self {
            RpcFailure::Rpc { code, message } => {
                log::warn!("rpc error {code}: {message}");
                GatewayError::RemoteRejected(message)
            }
            RpcFailure::Transport(msg) | RpcFailure::Malformed(msg) => {
                GatewayError::RemoteRejected(msg)
            }
        }
    }

    fn into_unavailable(self) -> GatewayError {
        match self {
            RpcFailure::Rpc { code, message } => {
                GatewayError::RemoteUnavailable(format!("RPC error {code}: {message}"))
            }
            RpcFailure::Transport(msg) | RpcFailure::Malformed(msg) => {
                GatewayError::RemoteUnavailable(msg)
            }
        }
    }
}
