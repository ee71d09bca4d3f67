//! Transfer Queue Subsystem
//!
//! Holds validated transfers until the operator triggers an execution.
//!
//! ## Flow
//! 1. `validate` checks a request against the auth context and returns a `Pending` entry
//! 2. `TransferQueue::append` stores it; `remove` drops it again by id
//! 3. The broadcast engine takes everything at once with `drain_all`

mod manager;
mod types;
mod validator;

pub use manager::{TransferQueue, create_transfer_queue};
pub use types::{Asset, Chain, ExecutionMode, TransferEntry, TransferStatus, shorten};
pub use validator::{
    AuthContext, MIN_NON_EVM_ADDRESS_LEN, MIN_SECRET_LEN, RawSecret, ValidationError,
    is_evm_address, parse_amount, validate,
};
