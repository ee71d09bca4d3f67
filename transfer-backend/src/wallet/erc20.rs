//! ERC20 and batcher ABI encoding/decoding helpers
//!
//! Manual ABI encoding for the handful of calls the engine makes, without the abigen! macro.

use ethers::abi::{AbiDecode, ParamType, Token};
use ethers::types::{Address, U256};
use ethers::utils::id;

/// Function selector for balanceOf(address)
const BALANCE_OF_SELECTOR: [u8; 4] = [0x70, 0xa0, 0x82, 0x31];

/// Function selector for decimals()
const DECIMALS_SELECTOR: [u8; 4] = [0x31, 0x3c, 0xe5, 0x67];

/// Function selector for allowance(address,address)
const ALLOWANCE_SELECTOR: [u8; 4] = [0xdd, 0x62, 0xed, 0x3e];

/// Function selector for approve(address,uint256)
const APPROVE_SELECTOR: [u8; 4] = [0x09, 0x5e, 0xa7, 0xb3];

/// Function selector for transfer(address,uint256)
const TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];

/// Selector prefixing `Error(string)` revert payloads
const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// Signature of the multi-recipient batcher entry point
pub const BATCH_TRANSFER_SIGNATURE: &str = "batchTransfer(address,address[],uint256[])";

fn with_selector(selector: [u8; 4], args: &[Token]) -> Vec<u8> {
    let mut data = selector.to_vec();
    data.extend_from_slice(&ethers::abi::encode(args));
    data
}

/// Encode a balanceOf(address) call
pub fn encode_balance_of(owner: Address) -> Vec<u8> {
    with_selector(BALANCE_OF_SELECTOR, &[Token::Address(owner)])
}

/// Encode a decimals() call
pub fn encode_decimals() -> Vec<u8> {
    DECIMALS_SELECTOR.to_vec()
}

/// Encode an allowance(owner, spender) call
pub fn encode_allowance(owner: Address, spender: Address) -> Vec<u8> {
    with_selector(ALLOWANCE_SELECTOR, &[Token::Address(owner), Token::Address(spender)])
}

/// Encode an approve(spender, amount) call
pub fn encode_approve(spender: Address, amount: U256) -> Vec<u8> {
    with_selector(APPROVE_SELECTOR, &[Token::Address(spender), Token::Uint(amount)])
}

/// Encode a transfer(to, amount) call
pub fn encode_transfer(to: Address, amount: U256) -> Vec<u8> {
    with_selector(TRANSFER_SELECTOR, &[Token::Address(to), Token::Uint(amount)])
}

/// Encode a batchTransfer(token, recipients, amounts) call
pub fn encode_batch_transfer(token: Address, recipients: &[Address], amounts: &[U256]) -> Vec<u8> {
    let recipients = recipients.iter().copied().map(Token::Address).collect();
    let amounts = amounts.iter().copied().map(Token::Uint).collect();
    with_selector(
        id(BATCH_TRANSFER_SIGNATURE),
        &[Token::Address(token), Token::Array(recipients), Token::Array(amounts)],
    )
}

/// Decode a uint256 response (balance, allowance)
pub fn decode_uint(data: &[u8]) -> Result<U256, String> {
    if data.len() < 32 {
        return Err(format!("uint256 response too short: {} bytes", data.len()));
    }
    U256::decode(&data[..32]).map_err(|e| format!("Failed to decode uint256: {}", e))
}

/// Decode a decimals response (uint8)
pub fn decode_decimals(data: &[u8]) -> Result<u8, String> {
    let value = decode_uint(data)?;
    // Decimals is returned as uint8 in a 32-byte word
    if value > U256::from(255u8) {
        return Err("Decimals value too large".to_string());
    }
    Ok(value.as_u32() as u8)
}

/// Extract the message from an `Error(string)` revert payload
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    if data.len() < 4 || data[..4] != ERROR_STRING_SELECTOR {
        return None;
    }
    let tokens = ethers::abi::decode(&[ParamType::String], &data[4..]).ok()?;
    match tokens.into_iter().next()? {
        Token::String(reason) => Some(reason),
        _ => None,
    }
}
