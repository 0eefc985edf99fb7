use std::sync::LazyLock;

use regex::Regex;

static BYTES32_HEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^0x[0-9a-fA-F]{64}$").expect("bytes32 hex pattern must compile")
});

static ADDRESS_HEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("address hex pattern must compile")
});

pub const ZERO_BYTES32: &str = "0x0000000000000000000000000000000000000000000000000000000000000000";

pub fn is_bytes32_hex(s: &str) -> bool {
    BYTES32_HEX.is_match(s)
}

pub fn is_address_hex(s: &str) -> bool {
    ADDRESS_HEX.is_match(s)
}

/// True for the all-zero 32-byte value the ledger returns for unknown UIDs.
pub fn is_zero_bytes32(s: &str) -> bool {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    !digits.is_empty() && digits.bytes().all(|b| b == b'0')
}

pub fn same_hex(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}
