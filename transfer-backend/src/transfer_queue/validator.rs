//! Entry validation
//!
//! Rejects malformed transfer requests before they reach the queue.
//! Validation never touches queue state.

use ethers::types::Address;
use ethers::utils::to_checksum;
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::types::{Asset, Chain, TransferEntry};
use crate::wallet::SignerSession;

/// Shortest raw secret accepted as proof of authority
pub const MIN_SECRET_LEN: usize = 10;

/// Shortest destination accepted on non-EVM chains
pub const MIN_NON_EVM_ADDRESS_LEN: usize = 26;

/// Raw secret material typed in by the operator
///
/// Not `Clone`, and `Debug` never prints the contents. Dropped after the
/// execution it was supplied for.
pub struct RawSecret(String);

impl RawSecret {
    pub fn new(material: impl Into<String>) -> Self {
        Self(material.into())
    }

    /// Meets the minimum length once surrounding whitespace is ignored
    pub fn is_acceptable(&self) -> bool {
        self.0.trim().chars().count() >= MIN_SECRET_LEN
    }
}

impl fmt::Debug for RawSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawSecret(<redacted, {} chars>)", self.0.chars().count())
    }
}

/// Who is allowed to authorize the queued transfers
#[derive(Clone, Default)]
pub enum AuthContext {
    /// An already-authorized signing session
    Delegated(Arc<dyn SignerSession>),
    /// Operator-supplied secret material, used for one execution only
    RawSecret(Arc<RawSecret>),
    #[default]
    Anonymous,
}

impl AuthContext {
    pub fn raw_secret(material: impl Into<String>) -> Self {
        AuthContext::RawSecret(Arc::new(RawSecret::new(material)))
    }

    /// The signing session, when one is delegated
    pub fn session(&self) -> Option<&Arc<dyn SignerSession>> {
        match self {
            AuthContext::Delegated(session) => Some(session),
            _ => None,
        }
    }

    pub fn has_authority(&self) -> bool {
        match self {
            AuthContext::Delegated(_) => true,
            AuthContext::RawSecret(secret) => secret.is_acceptable(),
            AuthContext::Anonymous => false,
        }
    }

    /// Label for log lines and the terminal
    pub fn describe(&self) -> &'static str {
        match self {
            AuthContext::Delegated(_) => "delegated_signer",
            AuthContext::RawSecret(_) => "manual_key",
            AuthContext::Anonymous => "none",
        }
    }
}

impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthContext::Delegated(session) => {
                write!(f, "Delegated({} @ {:?})", session.session_name(), session.address())
            }
            AuthContext::RawSecret(secret) => write!(f, "{:?}", secret),
            AuthContext::Anonymous => write!(f, "Anonymous"),
        }
    }
}

/// Why a transfer request was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Neither a delegated signer nor an acceptable raw secret
    NoAuthority,
    /// Destination does not fit the chain's address format
    MalformedAddress { chain: Chain, address: String },
    /// Amount is not a positive finite decimal
    InvalidAmount(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::NoAuthority => {
                write!(f, "No signing authority: connect a signer or supply a secret of at least {} characters", MIN_SECRET_LEN)
            }
            ValidationError::MalformedAddress { chain, address } => {
                write!(f, "Destination '{}' is not a valid {} address", address, chain)
            }
            ValidationError::InvalidAmount(amount) => {
                write!(f, "Amount '{}' must be a positive decimal", amount)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate a transfer request and allocate a `Pending` entry for it
///
/// The caller appends the returned entry to the queue.
pub fn validate(
    destination: &str,
    amount: &str,
    chain: Chain,
    asset: Asset,
    auth: &AuthContext,
) -> Result<TransferEntry, ValidationError> {
    if !auth.has_authority() {
        return Err(ValidationError::NoAuthority);
    }

    let destination = destination.trim();
    let address_ok = if chain.is_evm() {
        is_evm_address(destination)
    } else {
        destination.chars().count() >= MIN_NON_EVM_ADDRESS_LEN
    };
    if !address_ok {
        return Err(ValidationError::MalformedAddress {
            chain,
            address: destination.to_string(),
        });
    }

    let amount = parse_amount(amount)?;

    Ok(TransferEntry::new(destination.to_string(), amount, chain, asset))
}

/// Parse a strictly positive decimal amount
pub fn parse_amount(raw: &str) -> Result<Decimal, ValidationError> {
    let trimmed = raw.trim();
    match Decimal::from_str(trimmed) {
        Ok(value) if value > Decimal::ZERO => Ok(value.normalize()),
        _ => Err(ValidationError::InvalidAmount(trimmed.to_string())),
    }
}

/// `0x` followed by 40 hex digits. Mixed-case input must carry a valid
/// EIP-55 checksum.
pub fn is_evm_address(candidate: &str) -> bool {
    let Some(body) = candidate.strip_prefix("0x") else {
        return false;
    };
    if body.len() != 40 || !body.chars().all(|c| c.is_ascii_hexdigit()) {
        return false;
    }
    let Ok(address) = Address::from_str(body) else {
        return false;
    };

    let has_lower = body.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = body.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper {
        return to_checksum(&address, None) == candidate;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer_queue::TransferStatus;

    // EIP-55 reference vector
    const CHECKSUMMED: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";
    const BTC_ADDRESS: &str = "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq";

    fn secret_auth() -> AuthContext {
        AuthContext::raw_secret("correct horse battery staple")
    }

    #[test]
    fn test_valid_entry_is_pending_with_fresh_id() {
        let auth = secret_auth();
        let a = validate(CHECKSUMMED, "1000", Chain::Ethereum, Asset::Usdt, &auth).unwrap();
        let b = validate(CHECKSUMMED, "1000", Chain::Ethereum, Asset::Usdt, &auth).unwrap();

        assert_eq!(a.status(), TransferStatus::Pending);
        assert!(a.transaction_ref().is_none());
        assert_ne!(a.id(), b.id());
        assert_eq!(a.amount(), Decimal::from(1000));
    }

    #[test]
    fn test_no_authority() {
        let err = validate(CHECKSUMMED, "1", Chain::Ethereum, Asset::Usdt, &AuthContext::Anonymous)
            .unwrap_err();
        assert_eq!(err, ValidationError::NoAuthority);

        let short = AuthContext::raw_secret("   short   ");
        let err = validate(CHECKSUMMED, "1", Chain::Ethereum, Asset::Usdt, &short).unwrap_err();
        assert_eq!(err, ValidationError::NoAuthority);
    }

    #[test]
    fn test_malformed_evm_addresses() {
        let auth = secret_auth();
        let bad = [
            "",
            "0x",
            "5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAe",
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAedd",
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAeZ",
            // checksum broken by a single case flip
            "0x5AAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
            BTC_ADDRESS,
        ];
        for chain in [Chain::Ethereum, Chain::Bsc, Chain::Polygon] {
            for address in bad {
                let err = validate(address, "5", chain, Asset::Usdt, &auth).unwrap_err();
                assert!(
                    matches!(err, ValidationError::MalformedAddress { .. }),
                    "{} on {} gave {:?}",
                    address,
                    chain,
                    err
                );
            }
        }
    }

    #[test]
    fn test_single_case_evm_addresses_accepted() {
        let lower = CHECKSUMMED.to_lowercase();
        let upper = format!("0x{}", CHECKSUMMED[2..].to_uppercase());
        assert!(is_evm_address(CHECKSUMMED));
        assert!(is_evm_address(&lower));
        assert!(is_evm_address(&upper));
    }

    #[test]
    fn test_non_evm_length_heuristic() {
        let auth = secret_auth();
        assert!(validate(BTC_ADDRESS, "0.5", Chain::Bitcoin, Asset::Btc, &auth).is_ok());
        let err = validate("bc1qshort", "0.5", Chain::Bitcoin, Asset::Btc, &auth).unwrap_err();
        assert!(matches!(err, ValidationError::MalformedAddress { chain: Chain::Bitcoin, .. }));
    }

    #[test]
    fn test_invalid_amounts() {
        let auth = secret_auth();
        for amount in ["", "0", "0.000", "-5", "abc", "12abc", "NaN", "inf"] {
            let err = validate(CHECKSUMMED, amount, Chain::Ethereum, Asset::Usdt, &auth).unwrap_err();
            assert!(matches!(err, ValidationError::InvalidAmount(_)), "{:?} gave {:?}", amount, err);
        }
        let entry = validate(CHECKSUMMED, " 12.50 ", Chain::Ethereum, Asset::Usdt, &auth).unwrap();
        assert_eq!(entry.amount().to_string(), "12.5");
    }

    #[test]
    fn test_raw_secret_debug_is_redacted() {
        let auth = AuthContext::raw_secret("super-secret-material");
        let printed = format!("{:?}", auth);
        assert!(!printed.contains("super-secret"));
        assert!(printed.contains("redacted"));
    }
}
