//! CashAddr and legacy base58 address handling.
//!
//! eCash renders addresses as CashAddr (`ecash:q...`), while indexers and
//! older wallets still hand out `bitcoincash:` or base58 strings for the
//! same key hash. Everything here compares by key hash so that the prefix a
//! record happens to carry never changes ownership decisions.

use std::collections::HashSet;
use std::fmt;

use bitcoin::hashes::Hash;
use bitcoin::{PubkeyHash, Script, ScriptBuf, ScriptHash};

use crate::error::CoreError;

const CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";
const GENERATORS: [u64; 5] = [
    0x98f2bc8e61,
    0x79b76d99e2,
    0xf33e5fb3c4,
    0xae2eabe2a8,
    0x1e4f43e470,
];
const CHECKSUM_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressKind {
    P2pkh,
    P2sh,
}

impl AddressKind {
    fn version_byte(self) -> u8 {
        match self {
            Self::P2pkh => 0x00,
            Self::P2sh => 0x08,
        }
    }
}

/// A 160-bit P2PKH or P2SH address with the prefix it renders under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CashAddress {
    prefix: String,
    kind: AddressKind,
    hash: [u8; 20],
}

impl CashAddress {
    pub fn new(prefix: &str, kind: AddressKind, hash: [u8; 20]) -> Self {
        Self {
            prefix: prefix.to_ascii_lowercase(),
            kind,
            hash,
        }
    }

    pub fn p2pkh(prefix: &str, hash: [u8; 20]) -> Self {
        Self::new(prefix, AddressKind::P2pkh, hash)
    }

    /// Parse CashAddr (with or without prefix) or legacy base58.
    ///
    /// A CashAddr without an explicit prefix is checksummed against
    /// `default_prefix`; legacy addresses are re-homed under it.
    pub fn parse(raw: &str, default_prefix: &str) -> Result<Self, CoreError> {
        let raw = raw.trim();
        if raw.contains(':') {
            return decode_cashaddr(raw, default_prefix);
        }
        if let Ok(addr) = decode_legacy(raw, default_prefix) {
            return Ok(addr);
        }
        decode_cashaddr(raw, default_prefix)
    }

    /// Recover the address paying to a standard output script.
    pub fn from_script(script: &Script, prefix: &str) -> Option<Self> {
        let bytes = script.as_bytes();
        if script.is_p2pkh() {
            let hash: [u8; 20] = bytes[3..23].try_into().ok()?;
            Some(Self::new(prefix, AddressKind::P2pkh, hash))
        } else if script.is_p2sh() {
            let hash: [u8; 20] = bytes[2..22].try_into().ok()?;
            Some(Self::new(prefix, AddressKind::P2sh, hash))
        } else {
            None
        }
    }

    pub fn script_pubkey(&self) -> ScriptBuf {
        match self.kind {
            AddressKind::P2pkh => ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array(self.hash)),
            AddressKind::P2sh => ScriptBuf::new_p2sh(&ScriptHash::from_byte_array(self.hash)),
        }
    }

    pub fn with_prefix(&self, prefix: &str) -> Self {
        Self::new(prefix, self.kind, self.hash)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn kind(&self) -> AddressKind {
        self.kind
    }

    pub fn hash(&self) -> &[u8; 20] {
        &self.hash
    }
}

impl fmt::Display for CashAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut payload = Vec::with_capacity(21);
        payload.push(self.kind.version_byte());
        payload.extend_from_slice(&self.hash);
        // 8-to-5 regrouping with padding cannot fail for byte input.
        let data = convert_bits(&payload, 8, 5, true).unwrap_or_default();

        let mut checked = prefix_expand(&self.prefix);
        checked.extend_from_slice(&data);
        checked.extend_from_slice(&[0u8; CHECKSUM_LEN]);
        let checksum = polymod(&checked);

        write!(f, "{}:", self.prefix)?;
        for d in data {
            write!(f, "{}", CHARSET[d as usize] as char)?;
        }
        for i in 0..CHECKSUM_LEN {
            let d = ((checksum >> (5 * (CHECKSUM_LEN - 1 - i))) & 0x1f) as usize;
            write!(f, "{}", CHARSET[d] as char)?;
        }
        Ok(())
    }
}

// ==============================================================================
// Owned Address Set
// ==============================================================================

/// The set of key hashes a wallet controls, independent of prefix.
#[derive(Debug, Clone, Default)]
pub struct OwnedAddresses {
    hashes: HashSet<(AddressKind, [u8; 20])>,
}

impl OwnedAddresses {
    pub fn new(addresses: impl IntoIterator<Item = CashAddress>) -> Self {
        Self {
            hashes: addresses.into_iter().map(|a| (a.kind, a.hash)).collect(),
        }
    }

    pub fn from_strings<'a>(
        addresses: impl IntoIterator<Item = &'a str>,
        default_prefix: &str,
    ) -> Result<Self, CoreError> {
        let parsed = addresses
            .into_iter()
            .map(|a| CashAddress::parse(a, default_prefix))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(parsed))
    }

    pub fn contains(&self, address: &CashAddress) -> bool {
        self.hashes.contains(&(address.kind, address.hash))
    }

    /// Unparsable strings are never owned.
    pub fn contains_str(&self, address: &str, default_prefix: &str) -> bool {
        CashAddress::parse(address, default_prefix)
            .map(|a| self.contains(&a))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

// ==============================================================================
// Codec Internals
// ==============================================================================

fn decode_cashaddr(raw: &str, default_prefix: &str) -> Result<CashAddress, CoreError> {
    let invalid = |reason: &str| CoreError::InvalidAddress {
        address: raw.to_owned(),
        reason: reason.to_owned(),
    };

    let has_lower = raw.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = raw.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper {
        return Err(invalid("mixed case"));
    }
    let lowered = raw.to_ascii_lowercase();
    let (prefix, payload) = match lowered.split_once(':') {
        Some((prefix, payload)) => (prefix.to_owned(), payload),
        None => (default_prefix.to_ascii_lowercase(), lowered.as_str()),
    };
    if prefix.is_empty() || payload.len() <= CHECKSUM_LEN {
        return Err(invalid("too short"));
    }

    let mut values = Vec::with_capacity(payload.len());
    for c in payload.bytes() {
        let v = CHARSET
            .iter()
            .position(|&x| x == c)
            .ok_or_else(|| invalid("invalid character"))?;
        values.push(v as u8);
    }

    let mut checked = prefix_expand(&prefix);
    checked.extend_from_slice(&values);
    if polymod(&checked) != 0 {
        return Err(invalid("bad checksum"));
    }

    let data = &values[..values.len() - CHECKSUM_LEN];
    let bytes = convert_bits(data, 5, 8, false).ok_or_else(|| invalid("bad padding"))?;
    let (&version, hash) = bytes.split_first().ok_or_else(|| invalid("empty payload"))?;
    if version & 0x07 != 0 {
        return Err(invalid("only 160-bit hashes are supported"));
    }
    let kind = match version >> 3 {
        0 => AddressKind::P2pkh,
        1 => AddressKind::P2sh,
        _ => return Err(invalid("unknown address type")),
    };
    let hash: [u8; 20] = hash.try_into().map_err(|_| invalid("hash is not 20 bytes"))?;

    Ok(CashAddress::new(&prefix, kind, hash))
}

fn decode_legacy(raw: &str, prefix: &str) -> Result<CashAddress, CoreError> {
    let invalid = |reason: String| CoreError::InvalidAddress {
        address: raw.to_owned(),
        reason,
    };
    let bytes = bitcoin::base58::decode_check(raw).map_err(|e| invalid(e.to_string()))?;
    if bytes.len() != 21 {
        return Err(invalid(format!("payload is {} bytes", bytes.len())));
    }
    let kind = match bytes[0] {
        0x00 | 0x6f => AddressKind::P2pkh,
        0x05 | 0xc4 => AddressKind::P2sh,
        other => return Err(invalid(format!("unknown version byte {other:#04x}"))),
    };
    let hash: [u8; 20] = bytes[1..]
        .try_into()
        .map_err(|_| invalid("hash is not 20 bytes".into()))?;
    Ok(CashAddress::new(prefix, kind, hash))
}

fn prefix_expand(prefix: &str) -> Vec<u8> {
    let mut out: Vec<u8> = prefix.bytes().map(|b| b & 0x1f).collect();
    out.push(0);
    out
}

fn polymod(values: &[u8]) -> u64 {
    let mut c: u64 = 1;
    for &d in values {
        let c0 = (c >> 35) as u8;
        c = ((c & 0x07_ffff_ffff) << 5) ^ u64::from(d);
        for (i, generator) in GENERATORS.iter().enumerate() {
            if c0 & (1 << i) != 0 {
                c ^= generator;
            }
        }
    }
    c ^ 1
}

fn convert_bits(data: &[u8], from: u32, to: u32, pad: bool) -> Option<Vec<u8>> {
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let maxv: u32 = (1 << to) - 1;
    let max_acc: u32 = (1 << (from + to - 1)) - 1;
    let mut out = Vec::with_capacity(data.len() * from as usize / to as usize + 1);
    for &value in data {
        let v = u32::from(value);
        if v >> from != 0 {
            return None;
        }
        acc = ((acc << from) | v) & max_acc;
        bits += from;
        while bits >= to {
            bits -= to;
            out.push(((acc >> bits) & maxv) as u8);
        }
    }
    if pad {
        if bits > 0 {
            out.push(((acc << (to - bits)) & maxv) as u8);
        }
    } else if bits >= from || ((acc << (to - bits)) & maxv) != 0 {
        return None;
    }
    Some(out)
}
