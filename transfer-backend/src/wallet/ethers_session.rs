//! JSON-RPC signing session
//!
//! Wraps ethers' `SignerMiddleware` so every call is signed locally and sent
//! through a plain HTTP provider. Legacy (gas price) transactions are used on
//! every chain so the same replacement logic works everywhere.

use async_trait::async_trait;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, MiddlewareError, PendingTransaction, Provider};
use ethers::signers::LocalWallet;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, H256, TransactionRequest, U64, U256};
use serde_json::Value;

use super::erc20;
use super::{ChainError, SignerSession};
use crate::transfer_queue::Chain;

/// Gas for a plain value transfer, used by cancel replacements
const CANCEL_GAS_LIMIT: u64 = 21_000;

type Client = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Signing session backed by a JSON-RPC endpoint
pub struct EthersSession {
    client: Client,
    chain: Chain,
}

impl EthersSession {
    /// Connect a chain-bound wallet to an RPC endpoint
    ///
    /// No request is made here; an unreachable endpoint surfaces on the first call.
    pub fn connect(rpc_url: &str, wallet: LocalWallet, chain: Chain) -> Result<Self, String> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| format!("Invalid RPC URL '{}': {}", rpc_url, e))?;
        let client = SignerMiddleware::new(provider, wallet);

        log::info!(
            "[Session] Signer {:?} bound to {} via {}",
            client.address(),
            chain,
            rpc_url
        );

        Ok(Self { client, chain })
    }

    async fn read(&self, to: Address, data: Vec<u8>) -> Result<Bytes, ChainError> {
        let tx: TypedTransaction = TransactionRequest::new().to(to).data(data).into();
        self.client.call(&tx, None).await.map_err(rpc_failure)
    }

    async fn submit(&self, to: Address, data: Vec<u8>) -> Result<H256, ChainError> {
        let tx = TransactionRequest::new()
            .from(self.client.address())
            .to(to)
            .data(data);
        let pending = self
            .client
            .send_transaction(tx, None)
            .await
            .map_err(rpc_failure)?;
        let tx_hash = *pending;
        log::info!("[Session] Submitted {:?} to {:?}", tx_hash, to);
        Ok(tx_hash)
    }
}

#[async_trait]
impl SignerSession for EthersSession {
    fn address(&self) -> Address {
        self.client.address()
    }

    fn chain(&self) -> Chain {
        self.chain
    }

    fn session_name(&self) -> &'static str {
        "ethers_rpc"
    }

    async fn token_decimals(&self, token: Address) -> Result<u8, ChainError> {
        let raw = self.read(token, erc20::encode_decimals()).await?;
        erc20::decode_decimals(&raw).map_err(ChainError::from)
    }

    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256, ChainError> {
        let raw = self.read(token, erc20::encode_balance_of(owner)).await?;
        erc20::decode_uint(&raw).map_err(ChainError::from)
    }

    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, ChainError> {
        let raw = self.read(token, erc20::encode_allowance(owner, spender)).await?;
        erc20::decode_uint(&raw).map_err(ChainError::from)
    }

    async fn send_approval(
        &self,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> Result<H256, ChainError> {
        self.submit(token, erc20::encode_approve(spender, amount)).await
    }

    async fn send_transfer(&self, token: Address, to: Address, amount: U256) -> Result<H256, ChainError> {
        self.submit(token, erc20::encode_transfer(to, amount)).await
    }

    async fn send_batch_transfer(
        &self,
        batcher: Address,
        token: Address,
        recipients: Vec<Address>,
        amounts: Vec<U256>,
    ) -> Result<H256, ChainError> {
        let data = erc20::encode_batch_transfer(token, &recipients, &amounts);
        self.submit(batcher, data).await
    }

    async fn wait_for_finality(&self, tx_hash: H256) -> Result<(), ChainError> {
        let receipt = PendingTransaction::new(tx_hash, self.client.provider())
            .await
            .map_err(rpc_failure)?;

        match receipt {
            Some(receipt) if receipt.status == Some(U64::from(1)) => {
                log::info!(
                    "[Session] {:?} finalized in block {:?}",
                    tx_hash,
                    receipt.block_number
                );
                Ok(())
            }
            Some(_) => Err(ChainError::named(
                "CALL_EXCEPTION",
                format!("execution reverted on-chain in {:?}", tx_hash),
            )),
            None => Err(ChainError::named(
                "TRANSACTION_DROPPED",
                format!("{:?} was dropped from the mempool", tx_hash),
            )),
        }
    }

    async fn replace_with_cancel(&self, tx_hash: H256) -> Result<H256, ChainError> {
        let original = self
            .client
            .get_transaction(tx_hash)
            .await
            .map_err(rpc_failure)?
            .ok_or_else(|| {
                ChainError::named("TRANSACTION_NOT_FOUND", format!("{:?} is unknown to the node", tx_hash))
            })?;

        if original.block_number.is_some() {
            return Err(ChainError::named(
                "ALREADY_MINED",
                format!("{:?} is already mined and cannot be replaced", tx_hash),
            ));
        }

        let current = self.client.get_gas_price().await.map_err(rpc_failure)?;
        let previous = original
            .gas_price
            .or(original.max_fee_per_gas)
            .unwrap_or_default();
        let gas_price = bumped_gas_price(previous).max(current);

        let own = self.client.address();
        let replacement = TransactionRequest::new()
            .from(own)
            .to(own)
            .value(U256::zero())
            .nonce(original.nonce)
            .gas(CANCEL_GAS_LIMIT)
            .gas_price(gas_price);

        let pending = self
            .client
            .send_transaction(replacement, None)
            .await
            .map_err(rpc_failure)?;
        let replacement_hash = *pending;

        log::info!(
            "[Session] Replaced {:?} with {:?} at nonce {} (gas price {})",
            tx_hash,
            replacement_hash,
            original.nonce,
            gas_price
        );
        Ok(replacement_hash)
    }
}

/// Nodes require at least a 10% bump to accept a replacement; 12.5% leaves margin
fn bumped_gas_price(previous: U256) -> U256 {
    previous + previous / 8 + U256::one()
}

/// Convert a middleware error into the raw error the classifier consumes
fn rpc_failure<E: MiddlewareError>(err: E) -> ChainError {
    match err.as_error_response() {
        Some(response) => {
            let failure = ChainError::with_code(response.message.clone(), response.code);
            match response.data.as_ref().and_then(revert_reason_from_data) {
                Some(reason) => failure.with_reason(reason),
                None => failure,
            }
        }
        None => ChainError::new(err.to_string()),
    }
}

/// Nodes put revert payloads either directly in `data` or in `data.data`
fn revert_reason_from_data(data: &Value) -> Option<String> {
    let encoded = match data {
        Value::String(s) => s.as_str(),
        Value::Object(map) => map.get("data")?.as_str()?,
        _ => return None,
    };
    let bytes = hex::decode(encoded.trim_start_matches("0x")).ok()?;
    erc20::decode_revert_reason(&bytes)
}
