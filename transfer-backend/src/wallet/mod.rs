//! Signing Session Abstraction
//!
//! The broadcast engine never talks to a node directly. It goes through a
//! `SignerSession`, an already-authorized account on one chain that can read
//! token state, submit contract calls and wait for them to settle.
//!
//! - `EnvWalletProvider` loads the signing key from the environment
//! - `EthersSession` drives a JSON-RPC endpoint through ethers' signer middleware

mod env_provider;
pub mod erc20;
mod ethers_session;

pub use env_provider::EnvWalletProvider;
pub use ethers_session::EthersSession;

use async_trait::async_trait;
use ethers::types::{Address, H256, U256};
use std::fmt;

use crate::transfer_queue::Chain;

/// Code attached to a failed chain call
///
/// Providers report either a numeric JSON-RPC / EIP-1193 code or a named
/// code in the style of `ACTION_REJECTED`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainErrorCode {
    Numeric(i64),
    Named(String),
}

impl fmt::Display for ChainErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainErrorCode::Numeric(code) => write!(f, "{}", code),
            ChainErrorCode::Named(name) => write!(f, "{}", name),
        }
    }
}

/// Raw failure surfaced by a session call, before classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainError {
    /// Error message as reported by the provider
    pub message: String,
    /// Provider error code if available
    pub code: Option<ChainErrorCode>,
    /// Machine-supplied revert reason, if the call reverted with one
    pub reason: Option<String>,
}

impl ChainError {
    pub fn new(message: impl Into<String>) -> Self {
        ChainError {
            message: message.into(),
            code: None,
            reason: None,
        }
    }

    pub fn with_code(message: impl Into<String>, code: i64) -> Self {
        ChainError {
            message: message.into(),
            code: Some(ChainErrorCode::Numeric(code)),
            reason: None,
        }
    }

    pub fn named(name: &str, message: impl Into<String>) -> Self {
        ChainError {
            message: message.into(),
            code: Some(ChainErrorCode::Named(name.to_string())),
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = &self.code {
            write!(f, "[{}] {}", code, self.message)?;
        } else {
            write!(f, "{}", self.message)?;
        }
        if let Some(reason) = &self.reason {
            write!(f, " (reason: {})", reason)?;
        }
        Ok(())
    }
}

impl std::error::Error for ChainError {}

impl From<String> for ChainError {
    fn from(s: String) -> Self {
        ChainError::new(s)
    }
}

impl From<&str> for ChainError {
    fn from(s: &str) -> Self {
        ChainError::new(s)
    }
}

/// An authorized account able to submit calls on one chain
///
/// Every `send_*` returns as soon as the node accepts the transaction;
/// settlement is awaited separately through `wait_for_finality`.
#[async_trait]
pub trait SignerSession: Send + Sync {
    /// Address the session signs for
    fn address(&self) -> Address;

    /// Chain the session is connected to
    fn chain(&self) -> Chain;

    /// Name for logging
    fn session_name(&self) -> &'static str;

    /// ERC20 `decimals()` of a token
    async fn token_decimals(&self, token: Address) -> Result<u8, ChainError>;

    /// ERC20 `balanceOf(owner)`
    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256, ChainError>;

    /// ERC20 `allowance(owner, spender)`
    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, ChainError>;

    /// ERC20 `approve(spender, amount)`
    async fn send_approval(
        &self,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> Result<H256, ChainError>;

    /// ERC20 `transfer(to, amount)`
    async fn send_transfer(&self, token: Address, to: Address, amount: U256) -> Result<H256, ChainError>;

    /// Batcher `batchTransfer(token, recipients, amounts)`
    async fn send_batch_transfer(
        &self,
        batcher: Address,
        token: Address,
        recipients: Vec<Address>,
        amounts: Vec<U256>,
    ) -> Result<H256, ChainError>;

    /// Block until the transaction settles. A revert is an error.
    ///
    /// No timeout is applied here.
    async fn wait_for_finality(&self, tx_hash: H256) -> Result<(), ChainError>;

    /// Supersede an unmined transaction with a zero-value self transfer at
    /// the same nonce and a higher fee, returning the replacement hash
    async fn replace_with_cancel(&self, tx_hash: H256) -> Result<H256, ChainError>;
}
