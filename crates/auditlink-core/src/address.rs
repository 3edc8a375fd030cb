//! Contract and wallet address validation.
//!
//! Addresses are checked for shape only (`0x` + 40 hex digits); no EIP-55
//! checksum verification is performed.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

static ADDRESS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0x[a-fA-F0-9]{40}$").expect("static regex is valid"));

/// Returns `true` when `input` is `0x` followed by exactly 40 hex characters.
pub fn is_valid_address(input: &str) -> bool {
    ADDRESS_RE.is_match(input)
}

/// Trim and validate an address, returning the trimmed form.
pub fn validate_address(input: &str) -> Result<&str> {
    let trimmed = input.trim();
    if is_valid_address(trimmed) {
        Ok(trimmed)
    } else {
        Err(Error::InvalidAddress(trimmed.to_string()))
    }
}
