use ethers::types::Address;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;

use crate::broadcast::DEFAULT_LOG_CAPACITY;
use crate::transfer_queue::{Chain, ExecutionMode};

/// Environment variable names
pub mod env_vars {
    pub const MODE: &str = "TRANSFER_MODE";
    pub const RPC_URL: &str = "TRANSFER_RPC_URL";
    pub const CHAIN_ID: &str = "TRANSFER_CHAIN_ID";
    pub const SESSION_CHAIN: &str = "TRANSFER_SESSION_CHAIN";
    pub const SIGNER_PRIVATE_KEY: &str = "TRANSFER_SIGNER_PRIVATE_KEY";
    pub const TOKEN_ADDRESS: &str = "TRANSFER_TOKEN_ADDRESS";
    pub const BATCHER_ADDRESS: &str = "TRANSFER_BATCHER_ADDRESS";
    pub const BUILD_DELAY_MS: &str = "TRANSFER_BUILD_DELAY_MS";
    pub const BROADCAST_DELAY_MS: &str = "TRANSFER_BROADCAST_DELAY_MS";
    pub const REPLACE_DELAY_MS: &str = "TRANSFER_REPLACE_DELAY_MS";
    pub const LOG_CAPACITY: &str = "TRANSFER_LOG_CAPACITY";
    pub const SIMULATED_BALANCE: &str = "TRANSFER_SIMULATED_BALANCE";
}

pub const DEFAULT_RPC_URL: &str = "https://eth.llamarpc.com";

/// Tether on Ethereum mainnet
pub const DEFAULT_TOKEN_ADDRESS: &str = "0xdAC17F958D2ee523a2206206994597C13D831ec7";

#[derive(Clone, Debug)]
pub struct Config {
    /// Mode the terminal starts in
    pub mode: ExecutionMode,
    pub rpc_url: String,
    pub chain_id: u64,
    /// Chain the delegated signer is connected to
    pub session_chain: Chain,
    pub token_address: Address,
    /// Multi-recipient batcher; the atomic batch path is off without it
    pub batcher_address: Option<Address>,
    pub build_delay: Duration,
    pub broadcast_delay: Duration,
    pub replace_delay: Duration,
    pub log_capacity: usize,
    /// Opening balance of the simulated ledger
    pub simulated_balance: Decimal,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or blank keys take defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mode = match get(env_vars::MODE) {
            Some(raw) => ExecutionMode::from_str(&raw)
                .map_err(|_| format!("{} must be 'simulated' or 'real', got '{}'", env_vars::MODE, raw))?,
            None => ExecutionMode::Simulated,
        };

        let session_chain = match get(env_vars::SESSION_CHAIN) {
            Some(raw) => Chain::from_str(&raw)
                .map_err(|_| format!("{} is not a known chain: '{}'", env_vars::SESSION_CHAIN, raw))?,
            None => Chain::Ethereum,
        };
        if !session_chain.is_evm() {
            return Err(format!("{} must be an EVM chain", env_vars::SESSION_CHAIN));
        }

        let token_address = parse_address(
            env_vars::TOKEN_ADDRESS,
            &get(env_vars::TOKEN_ADDRESS).unwrap_or_else(|| DEFAULT_TOKEN_ADDRESS.to_string()),
        )?;
        let batcher_address = get(env_vars::BATCHER_ADDRESS)
            .map(|raw| parse_address(env_vars::BATCHER_ADDRESS, &raw))
            .transpose()?;

        let simulated_balance = match get(env_vars::SIMULATED_BALANCE) {
            Some(raw) => Decimal::from_str(&raw)
                .map_err(|e| format!("{} must be a decimal: {}", env_vars::SIMULATED_BALANCE, e))?,
            None => Decimal::from(1_000_000),
        };

        Ok(Self {
            mode,
            rpc_url: get(env_vars::RPC_URL).unwrap_or_else(|| DEFAULT_RPC_URL.to_string()),
            chain_id: parse_number(env_vars::CHAIN_ID, get(env_vars::CHAIN_ID), 1)?,
            session_chain,
            token_address,
            batcher_address,
            build_delay: Duration::from_millis(parse_number(
                env_vars::BUILD_DELAY_MS,
                get(env_vars::BUILD_DELAY_MS),
                1200,
            )?),
            broadcast_delay: Duration::from_millis(parse_number(
                env_vars::BROADCAST_DELAY_MS,
                get(env_vars::BROADCAST_DELAY_MS),
                800,
            )?),
            replace_delay: Duration::from_millis(parse_number(
                env_vars::REPLACE_DELAY_MS,
                get(env_vars::REPLACE_DELAY_MS),
                2000,
            )?),
            log_capacity: parse_number(
                env_vars::LOG_CAPACITY,
                get(env_vars::LOG_CAPACITY),
                DEFAULT_LOG_CAPACITY as u64,
            )? as usize,
            simulated_balance,
        })
    }
}

fn parse_address(key: &str, raw: &str) -> Result<Address, String> {
    Address::from_str(raw).map_err(|_| format!("{} must be a hex address, got '{}'", key, raw))
}

fn parse_number(key: &str, raw: Option<String>, default: u64) -> Result<u64, String> {
    match raw {
        Some(raw) => raw
            .parse()
            .map_err(|_| format!("{} must be a valid number, got '{}'", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config.mode, ExecutionMode::Simulated);
        assert_eq!(config.chain_id, 1);
        assert_eq!(config.session_chain, Chain::Ethereum);
        assert_eq!(config.token_address, Address::from_str(DEFAULT_TOKEN_ADDRESS).unwrap());
        assert!(config.batcher_address.is_none());
        assert_eq!(config.build_delay, Duration::from_millis(1200));
        assert_eq!(config.broadcast_delay, Duration::from_millis(800));
        assert_eq!(config.replace_delay, Duration::from_millis(2000));
        assert_eq!(config.log_capacity, 80);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            (env_vars::MODE, "REAL"),
            (env_vars::CHAIN_ID, "56"),
            (env_vars::SESSION_CHAIN, "bep20"),
            (env_vars::BATCHER_ADDRESS, "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"),
            (env_vars::BUILD_DELAY_MS, "0"),
            (env_vars::SIMULATED_BALANCE, "2500.75"),
            (env_vars::RPC_URL, "  "),
        ]))
        .unwrap();

        assert_eq!(config.mode, ExecutionMode::Real);
        assert_eq!(config.chain_id, 56);
        assert_eq!(config.session_chain, Chain::Bsc);
        assert!(config.batcher_address.is_some());
        assert_eq!(config.build_delay, Duration::ZERO);
        assert_eq!(config.simulated_balance.to_string(), "2500.75");
        assert_eq!(config.rpc_url, DEFAULT_RPC_URL);
    }

    #[test]
    fn test_invalid_values_are_errors() {
        assert!(Config::from_lookup(lookup_from(&[(env_vars::MODE, "turbo")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[(env_vars::CHAIN_ID, "one")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[(env_vars::SESSION_CHAIN, "BITCOIN")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[(env_vars::BATCHER_ADDRESS, "0x12")])).is_err());
    }
}
