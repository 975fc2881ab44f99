//! CryptoNote Address Validation
//!
//! An address is `varint(prefix) || spend_key || view_key [|| payment_id]`
//! followed by the first 4 bytes of its Keccak-256 hash, encoded with
//! CryptoNote base58 (8-byte blocks become 11 characters, the trailing
//! partial block is padded to its own fixed width).

use sha3::{Digest, Keccak256};
use thiserror::Error;

use crate::common::config::AddressPrefixes;

const ALPHABET: &[u8; 58] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

const FULL_BLOCK_SIZE: usize = 8;
const FULL_ENCODED_BLOCK_SIZE: usize = 11;

/// Encoded width for a block of `i` bytes
const ENCODED_BLOCK_SIZES: [usize; 9] = [0, 2, 3, 5, 6, 7, 9, 10, 11];

const KEY_SIZE: usize = 32;
const PAYMENT_ID_SIZE: usize = 8;
const CHECKSUM_SIZE: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("Invalid base58 encoding")]
    InvalidBase58,

    #[error("Invalid address length: {0} bytes")]
    InvalidLength(usize),

    #[error("Checksum mismatch")]
    Checksum,

    #[error("Unknown network prefix: {0}")]
    UnknownPrefix(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    Standard,
    Integrated,
    Subaddress,
}

impl std::fmt::Display for AddressKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Standard => write!(f, "standard"),
            Self::Integrated => write!(f, "integrated"),
            Self::Subaddress => write!(f, "subaddress"),
        }
    }
}

/// A validated address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressInfo {
    pub kind: AddressKind,
    pub payment_id: Option<[u8; PAYMENT_ID_SIZE]>,
}

/// Validate `address` against the configured network prefixes
pub fn validate(address: &str, prefixes: &AddressPrefixes) -> Result<AddressInfo, AddressError> {
    let data = base58_decode(address)?;
    if data.len() < CHECKSUM_SIZE {
        return Err(AddressError::InvalidLength(data.len()));
    }

    let (body, checksum) = data.split_at(data.len() - CHECKSUM_SIZE);
    if Keccak256::digest(body)[..CHECKSUM_SIZE] != *checksum {
        return Err(AddressError::Checksum);
    }

    let (prefix, prefix_len) = read_varint(body).ok_or(AddressError::InvalidBase58)?;
    let kind = if prefix == prefixes.standard {
        AddressKind::Standard
    } else if prefix == prefixes.integrated {
        AddressKind::Integrated
    } else if prefix == prefixes.subaddress {
        AddressKind::Subaddress
    } else {
        return Err(AddressError::UnknownPrefix(prefix));
    };

    let payload = &body[prefix_len..];
    let expected = match kind {
        AddressKind::Integrated => 2 * KEY_SIZE + PAYMENT_ID_SIZE,
        _ => 2 * KEY_SIZE,
    };
    if payload.len() != expected {
        return Err(AddressError::InvalidLength(payload.len()));
    }

    let payment_id = match kind {
        AddressKind::Integrated => {
            let mut id = [0u8; PAYMENT_ID_SIZE];
            id.copy_from_slice(&payload[2 * KEY_SIZE..]);
            Some(id)
        }
        _ => None,
    };

    Ok(AddressInfo { kind, payment_id })
}

/// Build an address from its parts
pub fn encode(
    prefix: u64,
    spend_key: &[u8; KEY_SIZE],
    view_key: &[u8; KEY_SIZE],
    payment_id: Option<&[u8; PAYMENT_ID_SIZE]>,
) -> String {
    let mut data = Vec::with_capacity(10 + 2 * KEY_SIZE + PAYMENT_ID_SIZE + CHECKSUM_SIZE);
    write_varint(prefix, &mut data);
    data.extend_from_slice(spend_key);
    data.extend_from_slice(view_key);
    if let Some(id) = payment_id {
        data.extend_from_slice(id);
    }
    let checksum = Keccak256::digest(&data);
    data.extend_from_slice(&checksum[..CHECKSUM_SIZE]);

    base58_encode(&data)
}

fn read_varint(data: &[u8]) -> Option<(u64, usize)> {
    let mut value = 0u64;
    for (i, byte) in data.iter().enumerate().take(10) {
        value |= ((byte & 0x7f) as u64) << (7 * i);
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
    }
    None
}

fn write_varint(mut value: u64, out: &mut Vec<u8>) {
    while value >= 0x80 {
        out.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

pub fn base58_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() / FULL_BLOCK_SIZE * FULL_ENCODED_BLOCK_SIZE + FULL_ENCODED_BLOCK_SIZE);

    for block in data.chunks(FULL_BLOCK_SIZE) {
        let mut num = block.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64);
        let width = ENCODED_BLOCK_SIZES[block.len()];

        let mut chars = [ALPHABET[0]; FULL_ENCODED_BLOCK_SIZE];
        for slot in chars[..width].iter_mut().rev() {
            *slot = ALPHABET[(num % 58) as usize];
            num /= 58;
        }
        out.extend(chars[..width].iter().map(|c| *c as char));
    }

    out
}

pub fn base58_decode(encoded: &str) -> Result<Vec<u8>, AddressError> {
    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() / FULL_ENCODED_BLOCK_SIZE * FULL_BLOCK_SIZE + FULL_BLOCK_SIZE);

    for block in bytes.chunks(FULL_ENCODED_BLOCK_SIZE) {
        let size = ENCODED_BLOCK_SIZES
            .iter()
            .position(|w| *w == block.len())
            .ok_or(AddressError::InvalidBase58)?;

        let mut num: u128 = 0;
        for c in block {
            let digit = ALPHABET
                .iter()
                .position(|a| a == c)
                .ok_or(AddressError::InvalidBase58)?;
            num = num * 58 + digit as u128;
        }

        if num >> (8 * size) != 0 {
            return Err(AddressError::InvalidBase58);
        }

        let be = num.to_be_bytes();
        out.extend_from_slice(&be[be.len() - size..]);
    }

    Ok(out)
}
