//! Transfer queue data types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Network a transfer is sent on
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum Chain {
    /// Ethereum mainnet
    #[serde(rename = "ERC20")]
    #[strum(to_string = "ERC20", serialize = "ETHEREUM", serialize = "MAINNET")]
    Ethereum,
    /// BNB Smart Chain
    #[serde(rename = "BEP20")]
    #[strum(to_string = "BEP20", serialize = "BSC")]
    Bsc,
    /// Polygon PoS
    #[serde(rename = "POLYGON")]
    #[strum(to_string = "POLYGON", serialize = "MATIC")]
    Polygon,
    /// Bitcoin network (non-EVM)
    #[serde(rename = "BITCOIN")]
    #[strum(to_string = "BITCOIN", serialize = "BTC")]
    Bitcoin,
}

impl Chain {
    /// Whether addresses on this chain are 20-byte hex EVM addresses
    pub fn is_evm(&self) -> bool {
        !matches!(self, Chain::Bitcoin)
    }

    /// Human-readable network name for log lines
    pub fn network_name(&self) -> &'static str {
        match self {
            Chain::Ethereum => "Ethereum Mainnet",
            Chain::Bsc => "BNB Smart Chain",
            Chain::Polygon => "Polygon PoS",
            Chain::Bitcoin => "Bitcoin",
        }
    }
}

/// Asset moved by a transfer
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum Asset {
    /// Tether, the fungible token
    #[serde(rename = "USDT")]
    #[strum(to_string = "USDT", serialize = "TETHER")]
    Usdt,
    /// Bitcoin, the native coin
    #[serde(rename = "BTC")]
    #[strum(to_string = "BTC", serialize = "BITCOIN")]
    Btc,
}

impl Asset {
    /// True for the ERC20-style token, false for the native coin
    pub fn is_fungible_token(&self) -> bool {
        matches!(self, Asset::Usdt)
    }
}

/// How an execute call reaches the network
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(ascii_case_insensitive, serialize_all = "snake_case")]
pub enum ExecutionMode {
    /// Fabricate identifiers locally, never touch a network
    #[default]
    #[strum(to_string = "simulated", serialize = "sim", serialize = "dry_run")]
    Simulated,
    /// Genuine contract calls through the signing session
    Real,
}

/// Status of a queued transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    /// Queued or broadcast but not finalized
    Pending,
    /// Finalized on-chain (or completed by the simulated path)
    Confirmed,
    /// Superseded by a replacement at the same sequence position
    Replaced,
}

impl TransferStatus {
    /// Only `Pending` may move, and only forward
    pub fn can_advance_to(&self, next: TransferStatus) -> bool {
        matches!(
            (self, next),
            (TransferStatus::Pending, TransferStatus::Confirmed)
                | (TransferStatus::Pending, TransferStatus::Replaced)
        )
    }
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferStatus::Pending => write!(f, "pending"),
            TransferStatus::Confirmed => write!(f, "confirmed"),
            TransferStatus::Replaced => write!(f, "replaced"),
        }
    }
}

/// A validated transfer waiting to be broadcast
///
/// Everything except `status` and `transaction_ref` is fixed at validation
/// time; both of those only move forward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferEntry {
    id: String,
    destination: String,
    amount: Decimal,
    chain: Chain,
    asset: Asset,
    status: TransferStatus,
    transaction_ref: Option<String>,
    created_at: DateTime<Utc>,
}

impl TransferEntry {
    pub(crate) fn new(destination: String, amount: Decimal, chain: Chain, asset: Asset) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            destination,
            amount,
            chain,
            asset,
            status: TransferStatus::Pending,
            transaction_ref: None,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn chain(&self) -> Chain {
        self.chain
    }

    pub fn asset(&self) -> Asset {
        self.asset
    }

    pub fn status(&self) -> TransferStatus {
        self.status
    }

    pub fn transaction_ref(&self) -> Option<&str> {
        self.transaction_ref.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Short form of the destination for log lines
    pub fn short_destination(&self) -> String {
        shorten(&self.destination, 10)
    }

    /// Attach the broadcast identifier. Set once; later calls are ignored.
    pub(crate) fn record_broadcast(&mut self, tx_ref: &str) -> bool {
        if self.transaction_ref.is_some() {
            return false;
        }
        self.transaction_ref = Some(tx_ref.to_string());
        true
    }

    pub(crate) fn mark_confirmed(&mut self) -> bool {
        self.advance(TransferStatus::Confirmed)
    }

    pub(crate) fn mark_replaced(&mut self) -> bool {
        self.advance(TransferStatus::Replaced)
    }

    fn advance(&mut self, next: TransferStatus) -> bool {
        if !self.status.can_advance_to(next) {
            log::warn!(
                "[TransferQueue] Refusing status change {} -> {} for {}",
                self.status,
                next,
                self.id
            );
            return false;
        }
        self.status = next;
        true
    }
}

/// Truncate a hash or address for display, keeping the leading characters
pub fn shorten(value: &str, keep: usize) -> String {
    if value.chars().count() <= keep {
        value.to_string()
    } else {
        let head: String = value.chars().take(keep).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn entry() -> TransferEntry {
        TransferEntry::new(
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed".to_string(),
            Decimal::from(1000),
            Chain::Ethereum,
            Asset::Usdt,
        )
    }

    #[test]
    fn test_chain_tags_parse_case_insensitive() {
        assert_eq!(Chain::from_str("erc20").unwrap(), Chain::Ethereum);
        assert_eq!(Chain::from_str("BEP20").unwrap(), Chain::Bsc);
        assert_eq!(Chain::from_str("polygon").unwrap(), Chain::Polygon);
        assert_eq!(Chain::from_str("Bitcoin").unwrap(), Chain::Bitcoin);
        assert!(Chain::from_str("TRC20").is_err());
        assert_eq!(Chain::Ethereum.to_string(), "ERC20");
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!(ExecutionMode::from_str("real").unwrap(), ExecutionMode::Real);
        assert_eq!(ExecutionMode::from_str("SIM").unwrap(), ExecutionMode::Simulated);
        assert_eq!(ExecutionMode::default(), ExecutionMode::Simulated);
        assert_eq!(ExecutionMode::Real.to_string(), "real");
    }

    #[test]
    fn test_status_only_moves_forward() {
        let mut e = entry();
        assert_eq!(e.status(), TransferStatus::Pending);
        assert!(e.mark_confirmed());
        assert!(!e.mark_replaced());
        assert_eq!(e.status(), TransferStatus::Confirmed);

        let mut e = entry();
        assert!(e.mark_replaced());
        assert!(!e.mark_confirmed());
        assert_eq!(e.status(), TransferStatus::Replaced);
    }

    #[test]
    fn test_transaction_ref_set_once() {
        let mut e = entry();
        assert!(e.transaction_ref().is_none());
        assert!(e.record_broadcast("0xaaa"));
        assert!(!e.record_broadcast("0xbbb"));
        assert_eq!(e.transaction_ref(), Some("0xaaa"));
    }

    #[test]
    fn test_serialized_tags() {
        let json = serde_json::to_value(entry()).unwrap();
        assert_eq!(json["chain"], "ERC20");
        assert_eq!(json["asset"], "USDT");
        assert_eq!(json["status"], "pending");
    }

    #[test]
    fn test_shorten() {
        assert_eq!(shorten("0x1234", 10), "0x1234");
        assert_eq!(shorten("0x1234567890abcdef", 6), "0x1234...");
    }
}
