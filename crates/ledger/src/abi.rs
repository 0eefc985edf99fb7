//! Solidity ABI encoding for the value shapes attestation payloads use.
//!
//! Covers the elementary types plus dynamic arrays and tuples. Fixed-size
//! arrays are not supported; schemas that need them are rejected when their
//! encoding string is parsed.

use crate::hash::{hex_prefixed, keccak256};

pub type Word = [u8; 32];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbiError {
    message: String,
}

impl AbiError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for AbiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AbiError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiType {
    Address,
    Bool,
    Uint(usize),
    Int(usize),
    FixedBytes(usize),
    Bytes,
    String,
    Array(Box<AbiType>),
    Tuple(Vec<AbiType>),
}

impl AbiType {
    pub fn parse(raw: &str) -> Result<Self, AbiError> {
        let raw = raw.trim();
        if let Some(inner) = raw.strip_suffix("[]") {
            return Ok(AbiType::Array(Box::new(Self::parse(inner)?)));
        }

        match raw {
            "address" => return Ok(AbiType::Address),
            "bool" => return Ok(AbiType::Bool),
            "string" => return Ok(AbiType::String),
            "bytes" => return Ok(AbiType::Bytes),
            "uint" => return Ok(AbiType::Uint(256)),
            "int" => return Ok(AbiType::Int(256)),
            _ => {}
        }

        if let Some(bits) = raw.strip_prefix("uint") {
            return parse_bits(raw, bits).map(AbiType::Uint);
        }
        if let Some(bits) = raw.strip_prefix("int") {
            return parse_bits(raw, bits).map(AbiType::Int);
        }
        if let Some(len) = raw.strip_prefix("bytes") {
            let len = len
                .parse::<usize>()
                .map_err(|_| AbiError::new(format!("unsupported abi type {}", raw)))?;
            if !(1..=32).contains(&len) {
                return Err(AbiError::new(format!("unsupported abi type {}", raw)));
            }
            return Ok(AbiType::FixedBytes(len));
        }

        Err(AbiError::new(format!("unsupported abi type {}", raw)))
    }

    pub fn is_dynamic(&self) -> bool {
        match self {
            AbiType::Bytes | AbiType::String | AbiType::Array(_) => true,
            AbiType::Tuple(types) => types.iter().any(AbiType::is_dynamic),
            _ => false,
        }
    }

    fn head_size(&self) -> usize {
        match self {
            AbiType::Tuple(types) if !self.is_dynamic() => {
                types.iter().map(AbiType::head_size).sum()
            }
            _ => 32,
        }
    }

    /// Canonical spelling used in function signatures.
    pub fn canonical(&self) -> String {
        match self {
            AbiType::Address => "address".to_string(),
            AbiType::Bool => "bool".to_string(),
            AbiType::Uint(bits) => format!("uint{}", bits),
            AbiType::Int(bits) => format!("int{}", bits),
            AbiType::FixedBytes(len) => format!("bytes{}", len),
            AbiType::Bytes => "bytes".to_string(),
            AbiType::String => "string".to_string(),
            AbiType::Array(inner) => format!("{}[]", inner.canonical()),
            AbiType::Tuple(types) => format!(
                "({})",
                types
                    .iter()
                    .map(AbiType::canonical)
                    .collect::<Vec<_>>()
                    .join(",")
            ),
        }
    }
}

fn parse_bits(raw: &str, bits: &str) -> Result<usize, AbiError> {
    let bits = bits
        .parse::<usize>()
        .map_err(|_| AbiError::new(format!("unsupported abi type {}", raw)))?;
    if bits == 0 || bits > 256 || bits % 8 != 0 {
        return Err(AbiError::new(format!("unsupported abi type {}", raw)));
    }
    Ok(bits)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiValue {
    Address([u8; 20]),
    Bool(bool),
    Uint(Word),
    Int(Word),
    FixedBytes(Vec<u8>),
    Bytes(Vec<u8>),
    String(String),
    Array(Vec<AbiValue>),
    Tuple(Vec<AbiValue>),
}

impl AbiValue {
    pub fn uint(value: u128) -> Self {
        let mut word = [0u8; 32];
        word[16..].copy_from_slice(&value.to_be_bytes());
        AbiValue::Uint(word)
    }

    pub fn bytes32(value: [u8; 32]) -> Self {
        AbiValue::FixedBytes(value.to_vec())
    }

    fn is_dynamic(&self) -> bool {
        match self {
            AbiValue::Bytes(_) | AbiValue::String(_) | AbiValue::Array(_) => true,
            AbiValue::Tuple(values) => values.iter().any(AbiValue::is_dynamic),
            _ => false,
        }
    }

    fn head_size(&self) -> usize {
        match self {
            AbiValue::Tuple(values) if !self.is_dynamic() => {
                values.iter().map(AbiValue::head_size).sum()
            }
            _ => 32,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            AbiValue::Uint(word) if word[..24].iter().all(|b| *b == 0) => {
                let mut tail = [0u8; 8];
                tail.copy_from_slice(&word[24..]);
                Some(u64::from_be_bytes(tail))
            }
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AbiValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_address(&self) -> Option<&[u8; 20]> {
        match self {
            AbiValue::Address(address) => Some(address),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            AbiValue::FixedBytes(bytes) | AbiValue::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[AbiValue]> {
        match self {
            AbiValue::Tuple(values) => Some(values),
            _ => None,
        }
    }

    /// Human-readable rendering: decimal integers, checksummed addresses,
    /// `0x` hex for byte strings, JSON arrays for composites.
    pub fn to_display_string(&self) -> String {
        match self {
            AbiValue::Address(address) => checksum_address(address),
            AbiValue::Bool(value) => value.to_string(),
            AbiValue::Uint(word) => word_to_decimal(word),
            AbiValue::Int(word) => {
                if word[0] & 0x80 != 0 {
                    format!("-{}", word_to_decimal(&negate(word)))
                } else {
                    word_to_decimal(word)
                }
            }
            AbiValue::FixedBytes(bytes) | AbiValue::Bytes(bytes) => hex_prefixed(bytes),
            AbiValue::String(value) => value.clone(),
            AbiValue::Array(values) | AbiValue::Tuple(values) => {
                let rendered = values
                    .iter()
                    .map(AbiValue::to_display_string)
                    .collect::<Vec<_>>();
                serde_json::to_string(&rendered).unwrap_or_else(|_| "[]".to_string())
            }
        }
    }

    /// Parses the textual form of an elementary value of type `ty`.
    pub fn from_text(ty: &AbiType, text: &str) -> Result<Self, AbiError> {
        match ty {
            AbiType::Address => address_from_hex(text).map(AbiValue::Address),
            AbiType::Bool => match text.trim() {
                "true" => Ok(AbiValue::Bool(true)),
                "false" => Ok(AbiValue::Bool(false)),
                other => Err(AbiError::new(format!("invalid bool {}", other))),
            },
            AbiType::Uint(bits) => {
                let word = parse_unsigned(text)?;
                if !fits_bits(&word, *bits) {
                    return Err(AbiError::new(format!("{} overflows uint{}", text, bits)));
                }
                Ok(AbiValue::Uint(word))
            }
            AbiType::Int(bits) => {
                let text = text.trim();
                let (negative, digits) = match text.strip_prefix('-') {
                    Some(digits) => (true, digits),
                    None => (false, text),
                };
                let magnitude = decimal_to_word(digits)
                    .ok_or_else(|| AbiError::new(format!("invalid int {}", text)))?;
                if magnitude[0] & 0x80 != 0 || !fits_bits(&magnitude, *bits) {
                    return Err(AbiError::new(format!("{} overflows int{}", text, bits)));
                }
                Ok(AbiValue::Int(if negative {
                    negate(&magnitude)
                } else {
                    magnitude
                }))
            }
            AbiType::FixedBytes(len) => {
                let bytes = parse_hex_bytes(text)?;
                if bytes.len() != *len {
                    return Err(AbiError::new(format!(
                        "expected {} bytes, got {}",
                        len,
                        bytes.len()
                    )));
                }
                Ok(AbiValue::FixedBytes(bytes))
            }
            AbiType::Bytes => parse_hex_bytes(text).map(AbiValue::Bytes),
            AbiType::String => Ok(AbiValue::String(text.to_string())),
            AbiType::Array(_) | AbiType::Tuple(_) => Err(AbiError::new(format!(
                "composite type {} has no text form",
                ty.canonical()
            ))),
        }
    }
}

pub fn encode(values: &[AbiValue]) -> Vec<u8> {
    let head_size = values.iter().map(AbiValue::head_size).sum::<usize>();
    let mut head = Vec::with_capacity(head_size);
    let mut tail = Vec::new();

    for value in values {
        if value.is_dynamic() {
            head.extend_from_slice(&usize_word(head_size + tail.len()));
            tail.extend(encode_value(value));
        } else {
            head.extend(encode_value(value));
        }
    }

    head.extend(tail);
    head
}

fn encode_value(value: &AbiValue) -> Vec<u8> {
    match value {
        AbiValue::Address(address) => {
            let mut word = [0u8; 32];
            word[12..].copy_from_slice(address);
            word.to_vec()
        }
        AbiValue::Bool(value) => usize_word(usize::from(*value)).to_vec(),
        AbiValue::Uint(word) | AbiValue::Int(word) => word.to_vec(),
        AbiValue::FixedBytes(bytes) => {
            let mut word = [0u8; 32];
            let len = bytes.len().min(32);
            word[..len].copy_from_slice(&bytes[..len]);
            word.to_vec()
        }
        AbiValue::Bytes(bytes) => encode_packed(bytes),
        AbiValue::String(value) => encode_packed(value.as_bytes()),
        AbiValue::Array(values) => {
            let mut out = usize_word(values.len()).to_vec();
            out.extend(encode(values));
            out
        }
        AbiValue::Tuple(values) => encode(values),
    }
}

fn encode_packed(bytes: &[u8]) -> Vec<u8> {
    let mut out = usize_word(bytes.len()).to_vec();
    out.extend_from_slice(bytes);
    let padding = (32 - bytes.len() % 32) % 32;
    out.resize(out.len() + padding, 0);
    out
}

pub fn decode(types: &[AbiType], data: &[u8]) -> Result<Vec<AbiValue>, AbiError> {
    decode_tuple(types, data, 0)
}

fn decode_tuple(types: &[AbiType], data: &[u8], base: usize) -> Result<Vec<AbiValue>, AbiError> {
    let mut values = Vec::with_capacity(types.len());
    let mut cursor = base;

    for ty in types {
        if ty.is_dynamic() {
            let offset = read_usize(data, cursor)?;
            let start = base
                .checked_add(offset)
                .ok_or_else(|| AbiError::new("abi offset overflow"))?;
            values.push(decode_value(ty, data, start)?);
            cursor += 32;
        } else {
            values.push(decode_value(ty, data, cursor)?);
            cursor += ty.head_size();
        }
    }

    Ok(values)
}

fn decode_value(ty: &AbiType, data: &[u8], pos: usize) -> Result<AbiValue, AbiError> {
    match ty {
        AbiType::Address => {
            let word = read_word(data, pos)?;
            if word[..12].iter().any(|b| *b != 0) {
                return Err(AbiError::new("address word has dirty high bytes"));
            }
            let mut address = [0u8; 20];
            address.copy_from_slice(&word[12..]);
            Ok(AbiValue::Address(address))
        }
        AbiType::Bool => {
            let word = read_word(data, pos)?;
            if word[..31].iter().any(|b| *b != 0) {
                return Err(AbiError::new("bool word out of range"));
            }
            match word[31] {
                0 => Ok(AbiValue::Bool(false)),
                1 => Ok(AbiValue::Bool(true)),
                _ => Err(AbiError::new("bool word out of range")),
            }
        }
        AbiType::Uint(bits) => {
            let word = read_word(data, pos)?;
            if !fits_bits(&word, *bits) {
                return Err(AbiError::new(format!("value overflows uint{}", bits)));
            }
            Ok(AbiValue::Uint(word))
        }
        AbiType::Int(_) => Ok(AbiValue::Int(read_word(data, pos)?)),
        AbiType::FixedBytes(len) => {
            let word = read_word(data, pos)?;
            Ok(AbiValue::FixedBytes(word[..*len].to_vec()))
        }
        AbiType::Bytes => Ok(AbiValue::Bytes(read_packed(data, pos)?.to_vec())),
        AbiType::String => {
            let raw = read_packed(data, pos)?;
            String::from_utf8(raw.to_vec())
                .map(AbiValue::String)
                .map_err(|_| AbiError::new("string is not valid utf-8"))
        }
        AbiType::Array(inner) => {
            let len = read_usize(data, pos)?;
            let body = pos + 32;
            if len > data.len().saturating_sub(body) / 32 {
                return Err(AbiError::new("array length exceeds payload"));
            }
            let types = vec![(**inner).clone(); len];
            decode_tuple(&types, data, body).map(AbiValue::Array)
        }
        AbiType::Tuple(types) => decode_tuple(types, data, pos).map(AbiValue::Tuple),
    }
}

fn read_word(data: &[u8], pos: usize) -> Result<Word, AbiError> {
    let end = pos
        .checked_add(32)
        .ok_or_else(|| AbiError::new("abi offset overflow"))?;
    let slice = data
        .get(pos..end)
        .ok_or_else(|| AbiError::new(format!("abi payload truncated at byte {}", pos)))?;
    let mut word = [0u8; 32];
    word.copy_from_slice(slice);
    Ok(word)
}

fn read_usize(data: &[u8], pos: usize) -> Result<usize, AbiError> {
    let word = read_word(data, pos)?;
    if word[..24].iter().any(|b| *b != 0) {
        return Err(AbiError::new("abi length or offset out of range"));
    }
    let mut tail = [0u8; 8];
    tail.copy_from_slice(&word[24..]);
    let value = usize::try_from(u64::from_be_bytes(tail))
        .map_err(|_| AbiError::new("abi length or offset out of range"))?;
    if value > data.len() {
        return Err(AbiError::new("abi length or offset out of range"));
    }
    Ok(value)
}

fn read_packed(data: &[u8], pos: usize) -> Result<&[u8], AbiError> {
    let len = read_usize(data, pos)?;
    let start = pos + 32;
    data.get(start..start + len)
        .ok_or_else(|| AbiError::new("abi byte string truncated"))
}

fn usize_word(value: usize) -> Word {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&(value as u64).to_be_bytes());
    word
}

fn fits_bits(word: &Word, bits: usize) -> bool {
    let zero_bytes = (256 - bits.min(256)) / 8;
    word[..zero_bytes].iter().all(|b| *b == 0)
}

fn negate(word: &Word) -> Word {
    let mut out = [0u8; 32];
    let mut carry = 1u16;
    for idx in (0..32).rev() {
        let sum = u16::from(!word[idx]) + carry;
        out[idx] = (sum & 0xff) as u8;
        carry = sum >> 8;
    }
    out
}

fn word_to_decimal(word: &Word) -> String {
    let mut value = *word;
    let mut digits = Vec::new();

    while value.iter().any(|b| *b != 0) {
        let mut rem = 0u32;
        for byte in value.iter_mut() {
            let acc = (rem << 8) | u32::from(*byte);
            *byte = (acc / 10) as u8;
            rem = acc % 10;
        }
        digits.push(b'0' + rem as u8);
    }

    if digits.is_empty() {
        return "0".to_string();
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_else(|_| "0".to_string())
}

fn decimal_to_word(text: &str) -> Option<Word> {
    if text.is_empty() {
        return None;
    }
    let mut word = [0u8; 32];
    for ch in text.bytes() {
        if !ch.is_ascii_digit() {
            return None;
        }
        let mut carry = u32::from(ch - b'0');
        for byte in word.iter_mut().rev() {
            let acc = u32::from(*byte) * 10 + carry;
            *byte = (acc & 0xff) as u8;
            carry = acc >> 8;
        }
        if carry != 0 {
            return None;
        }
    }
    Some(word)
}

fn parse_unsigned(text: &str) -> Result<Word, AbiError> {
    let text = text.trim();
    if text.starts_with("0x") {
        let bytes = parse_hex_bytes(text)?;
        if bytes.len() > 32 {
            return Err(AbiError::new(format!("{} overflows 256 bits", text)));
        }
        let mut word = [0u8; 32];
        word[32 - bytes.len()..].copy_from_slice(&bytes);
        return Ok(word);
    }
    decimal_to_word(text).ok_or_else(|| AbiError::new(format!("invalid unsigned integer {}", text)))
}

pub fn parse_hex_bytes(raw: &str) -> Result<Vec<u8>, AbiError> {
    let digits = raw.trim();
    let digits = digits.strip_prefix("0x").unwrap_or(digits);
    if digits.len() % 2 == 1 {
        return hex::decode(format!("0{}", digits))
            .map_err(|_| AbiError::new(format!("invalid hex {}", raw)));
    }
    hex::decode(digits).map_err(|_| AbiError::new(format!("invalid hex {}", raw)))
}

pub fn bytes32_from_hex(raw: &str) -> Result<[u8; 32], AbiError> {
    let bytes = parse_hex_bytes(raw)?;
    bytes
        .try_into()
        .map_err(|_| AbiError::new(format!("expected 32-byte hex, got {}", raw)))
}

pub fn address_from_hex(raw: &str) -> Result<[u8; 20], AbiError> {
    let bytes = parse_hex_bytes(raw)?;
    bytes
        .try_into()
        .map_err(|_| AbiError::new(format!("expected 20-byte address, got {}", raw)))
}

/// EIP-55 mixed-case checksum encoding.
pub fn checksum_address(address: &[u8; 20]) -> String {
    let lower = hex::encode(address);
    let hash = keccak256(lower.as_bytes());
    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (idx, ch) in lower.chars().enumerate() {
        let nibble = if idx % 2 == 0 {
            hash[idx / 2] >> 4
        } else {
            hash[idx / 2] & 0x0f
        };
        if ch.is_ascii_alphabetic() && nibble >= 8 {
            out.push(ch.to_ascii_uppercase());
        } else {
            out.push(ch);
        }
    }
    out
}
