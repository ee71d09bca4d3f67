//! Environment-based signing key
//!
//! Loads the delegated signer from TRANSFER_SIGNER_PRIVATE_KEY. The key is
//! configured at deploy time; operators never type it into the terminal.

use ethers::core::k256::ecdsa::SigningKey;
use ethers::signers::{LocalWallet, Signer};

use crate::config::env_vars;

/// Signing key loaded from the environment
pub struct EnvWalletProvider {
    wallet: LocalWallet,
    address: String,
}

impl EnvWalletProvider {
    /// Create provider from environment variable
    ///
    /// Returns `Ok(None)` when no key is configured.
    pub fn from_env() -> Result<Option<Self>, String> {
        match std::env::var(env_vars::SIGNER_PRIVATE_KEY) {
            Ok(key) if !key.trim().is_empty() => Self::from_private_key(key.trim()).map(Some),
            _ => Ok(None),
        }
    }

    /// Create provider from a private key string
    pub fn from_private_key(private_key: &str) -> Result<Self, String> {
        let key_hex = private_key.strip_prefix("0x").unwrap_or(private_key);

        let key_bytes = hex::decode(key_hex)
            .map_err(|e| format!("Invalid private key hex: {}", e))?;

        if key_bytes.len() != 32 {
            return Err(format!("Invalid private key length: {} bytes", key_bytes.len()));
        }

        let signing_key = SigningKey::from_bytes(key_bytes.as_slice().into())
            .map_err(|e| format!("Invalid private key: {}", e))?;

        let wallet = LocalWallet::from(signing_key);
        let address = format!("{:?}", wallet.address()).to_lowercase();

        Ok(Self { wallet, address })
    }

    /// Wallet bound to the given chain id, for signing
    pub fn wallet_for_chain(&self, chain_id: u64) -> LocalWallet {
        self.wallet.clone().with_chain_id(chain_id)
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}
