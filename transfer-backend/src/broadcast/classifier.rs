//! Chain failure classification
//!
//! Maps raw session errors onto a fixed taxonomy. The rules run in priority
//! order and the first hit wins.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::wallet::{ChainError, ChainErrorCode};

/// Stable failure kinds surfaced during broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The signing party declined authorization
    UserRejected,
    /// Balance cannot cover value or fee
    InsufficientFunds,
    /// The remote endpoint could not be reached
    NetworkUnavailable,
    /// A competing transaction invalidated sequencing
    NonceConflict,
    /// The call executed but the contract rejected it
    ContractReverted,
    /// Anything else
    Unknown,
}

impl ErrorKind {
    /// Whether re-entering the transfer can succeed without operator changes
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ErrorKind::NonceConflict | ErrorKind::NetworkUnavailable)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::UserRejected => "UserRejected",
            ErrorKind::InsufficientFunds => "InsufficientFunds",
            ErrorKind::NetworkUnavailable => "NetworkUnavailable",
            ErrorKind::NonceConflict => "NonceConflict",
            ErrorKind::ContractReverted => "ContractReverted",
            ErrorKind::Unknown => "Unknown",
        };
        write!(f, "{}", name)
    }
}

/// A classified failure: kind plus operator-facing detail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classified {
    pub kind: ErrorKind,
    pub message: String,
}

impl Classified {
    /// The single log line this failure produces
    pub fn log_line(&self) -> String {
        if self.kind.is_recoverable() {
            format!("[{}] {} (retry by re-queuing)", self.kind, self.message)
        } else {
            format!("[{}] {}", self.kind, self.message)
        }
    }
}

impl fmt::Display for Classified {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Result of one chain call, with failures already classified
///
/// The engine branches on this instead of unwinding, so the batch-abort and
/// per-entry-continue policies are explicit.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome<T> {
    Success(T),
    Classified(Classified),
}

impl<T> From<Result<T, ChainError>> for CallOutcome<T> {
    fn from(result: Result<T, ChainError>) -> Self {
        match result {
            Ok(value) => CallOutcome::Success(value),
            Err(err) => CallOutcome::Classified(classify(&err)),
        }
    }
}

fn has_named(code: &Option<ChainErrorCode>, names: &[&str]) -> bool {
    matches!(code, Some(ChainErrorCode::Named(name)) if names.iter().any(|n| name.eq_ignore_ascii_case(n)))
}

fn has_numeric(code: &Option<ChainErrorCode>, value: i64) -> bool {
    matches!(code, Some(ChainErrorCode::Numeric(c)) if *c == value)
}

fn mentions(message: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| message.contains(needle))
}

/// Classify a raw chain failure
pub fn classify(err: &ChainError) -> Classified {
    let code = &err.code;
    let message = err.message.to_lowercase();

    let (kind, detail) = if has_numeric(code, 4001)
        || has_named(code, &["ACTION_REJECTED"])
        || mentions(&message, &["user rejected", "user denied"])
    {
        (
            ErrorKind::UserRejected,
            "signer declined the request, authorization cancelled".to_string(),
        )
    } else if has_named(code, &["INSUFFICIENT_FUNDS"]) || mentions(&message, &["insufficient funds"]) {
        (
            ErrorKind::InsufficientFunds,
            "balance cannot cover the transfer value or network fee".to_string(),
        )
    } else if has_named(code, &["NETWORK_ERROR", "TIMEOUT"])
        || mentions(
            &message,
            &["network error", "failed to fetch", "error sending request", "connection refused"],
        )
    {
        (
            ErrorKind::NetworkUnavailable,
            "could not reach the chain endpoint, check connectivity".to_string(),
        )
    } else if has_named(code, &["NONCE_EXPIRED", "REPLACEMENT_UNDERPRICED"])
        || mentions(
            &message,
            &["nonce too low", "replacement transaction underpriced", "already known"],
        )
    {
        (
            ErrorKind::NonceConflict,
            "a competing transaction took this sequence number".to_string(),
        )
    } else if has_named(code, &["CALL_EXCEPTION"]) || mentions(&message, &["execution reverted"]) {
        let detail = match &err.reason {
            Some(reason) => format!("contract rejected the call: {}", reason),
            None => "contract rejected the call".to_string(),
        };
        (ErrorKind::ContractReverted, detail)
    } else {
        let detail = match &err.reason {
            Some(reason) => format!("broadcast failed: {} ({})", reason, err.message),
            None => format!("broadcast failed: {}", err.message),
        };
        (ErrorKind::Unknown, detail)
    };

    log::warn!("[Broadcast] Classified failure as {}: {}", kind, err);
    Classified { kind, message: detail }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_rejected_by_code_or_message() {
        assert_eq!(classify(&ChainError::with_code("whatever", 4001)).kind, ErrorKind::UserRejected);
        assert_eq!(
            classify(&ChainError::named("ACTION_REJECTED", "denied")).kind,
            ErrorKind::UserRejected
        );
        assert_eq!(
            classify(&ChainError::new("MetaMask Tx Signature: User denied transaction signature."))
                .kind,
            ErrorKind::UserRejected
        );
    }

    #[test]
    fn test_priority_order() {
        // rejection outranks everything else in the message
        let err = ChainError::new("user rejected: insufficient funds, execution reverted");
        assert_eq!(classify(&err).kind, ErrorKind::UserRejected);

        let err = ChainError::new("insufficient funds for gas * price + value; nonce too low");
        assert_eq!(classify(&err).kind, ErrorKind::InsufficientFunds);

        let err = ChainError::new("error sending request: execution reverted");
        assert_eq!(classify(&err).kind, ErrorKind::NetworkUnavailable);

        let err = ChainError::new("nonce too low; execution reverted");
        assert_eq!(classify(&err).kind, ErrorKind::NonceConflict);
    }

    #[test]
    fn test_network_failures() {
        for msg in [
            "network error",
            "Failed to fetch",
            "(code: -32603) error sending request for url (http://127.0.0.1:8545/)",
            "tcp connect error: Connection refused (os error 111)",
        ] {
            assert_eq!(classify(&ChainError::new(msg)).kind, ErrorKind::NetworkUnavailable, "{}", msg);
        }
        assert_eq!(classify(&ChainError::named("TIMEOUT", "slow")).kind, ErrorKind::NetworkUnavailable);
    }

    #[test]
    fn test_nonce_conflict_is_recoverable() {
        let classified = classify(&ChainError::with_code("replacement transaction underpriced", -32000));
        assert_eq!(classified.kind, ErrorKind::NonceConflict);
        assert!(classified.kind.is_recoverable());
        assert!(classified.log_line().contains("retry"));
    }

    #[test]
    fn test_revert_reason_is_kept_verbatim() {
        let err = ChainError::with_code("execution reverted", 3).with_reason("BEP20: transfer amount exceeds balance");
        let classified = classify(&err);
        assert_eq!(classified.kind, ErrorKind::ContractReverted);
        assert!(classified.message.contains("BEP20: transfer amount exceeds balance"));
        assert!(!classified.kind.is_recoverable());
        assert!(classified.log_line().starts_with("[ContractReverted]"));
    }

    #[test]
    fn test_unknown_keeps_original_message() {
        let classified = classify(&ChainError::new("header not found"));
        assert_eq!(classified.kind, ErrorKind::Unknown);
        assert!(classified.message.contains("header not found"));
    }

    #[test]
    fn test_call_outcome_from_result() {
        let ok: CallOutcome<u8> = Ok::<u8, ChainError>(6).into();
        assert_eq!(ok, CallOutcome::Success(6));

        let failed: CallOutcome<u8> = Err(ChainError::new("insufficient funds")).into();
        match failed {
            CallOutcome::Classified(c) => assert_eq!(c.kind, ErrorKind::InsufficientFunds),
            CallOutcome::Success(_) => panic!("expected a classified failure"),
        }
    }
}
