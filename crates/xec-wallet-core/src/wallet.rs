//! Signing wallet: key validation and SIGHASH_FORKID input signing.
//!
//! The wallet is a read-only snapshot of derived paths supplied by the
//! caller; nothing here derives keys. [`Wallet::signer`] checks every key
//! against the address it is listed under and yields a [`Signer`] that the
//! builders use for the primary address and for signatures.

use std::collections::HashMap;
use std::path::Path;

use bitcoin::consensus::encode::serialize;
use bitcoin::hashes::{sha256d, Hash};
use bitcoin::script::{Builder, PushBytesBuf};
use bitcoin::secp256k1::{All, Message, Secp256k1};
use bitcoin::{Amount, PrivateKey, Script, Transaction};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::address::{AddressKind, CashAddress};
use crate::error::CoreError;
use crate::types::RawOutput;

/// Derivation path index whose address receives change and minted tokens.
pub const PRIMARY_PATH: u32 = 1899;
/// Derivation path index historically used for token holdings.
pub const TOKEN_PATH: u32 = 245;

/// SIGHASH_ALL with the replay-protection fork id bit.
pub const SIGHASH_ALL_FORKID: u32 = 0x41;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletPath {
    pub path: u32,
    pub address: String,
    pub wif: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    #[serde(default)]
    pub name: String,
    pub paths: Vec<WalletPath>,
}

impl Wallet {
    pub fn from_json_file(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            debug!(error = %e, "wallet file did not parse");
            CoreError::InvalidWallet
        })
    }

    /// Addresses of every path, in listed order.
    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(|p| p.address.as_str())
    }

    /// Validate the wallet and prepare it for signing.
    ///
    /// Fails with [`CoreError::InvalidWallet`] when the primary path is
    /// missing, when a WIF does not decode, or when a key does not control
    /// the P2PKH address it is listed under.
    pub fn signer(&self, prefix: &str) -> Result<Signer, CoreError> {
        let secp = Secp256k1::new();
        let mut keys = HashMap::with_capacity(self.paths.len());
        let mut primary = None;

        for entry in &self.paths {
            let key = PrivateKey::from_wif(entry.wif.trim()).map_err(|e| {
                debug!(path = entry.path, error = %e, "wallet key does not decode");
                CoreError::InvalidWallet
            })?;
            let address = CashAddress::parse(&entry.address, prefix).map_err(|e| {
                debug!(path = entry.path, error = %e, "wallet address does not parse");
                CoreError::InvalidWallet
            })?;
            let key_hash = key.public_key(&secp).pubkey_hash().to_byte_array();
            if address.kind() != AddressKind::P2pkh || address.hash() != &key_hash {
                debug!(path = entry.path, "wallet key does not control its address");
                return Err(CoreError::InvalidWallet);
            }
            if entry.path == PRIMARY_PATH {
                primary = Some(address.with_prefix(prefix));
            }
            keys.insert(key_hash, key);
        }

        let primary = primary.ok_or_else(|| {
            debug!(paths = self.paths.len(), "wallet has no primary path");
            CoreError::InvalidWallet
        })?;

        Ok(Signer {
            secp,
            keys,
            primary,
            prefix: prefix.to_owned(),
        })
    }
}

// ==============================================================================
// Signing
// ==============================================================================

/// Validated keys, indexed by the key hash they control.
pub struct Signer {
    secp: Secp256k1<All>,
    keys: HashMap<[u8; 20], PrivateKey>,
    primary: CashAddress,
    prefix: String,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("primary", &self.primary.to_string())
            .field("keys", &self.keys.len())
            .finish()
    }
}

impl Signer {
    pub fn primary_address(&self) -> &CashAddress {
        &self.primary
    }

    /// The address change for an input set goes to: the first input's
    /// address when it parses, the primary address otherwise.
    pub fn change_address(&self, first_input: Option<&RawOutput>) -> CashAddress {
        first_input
            .and_then(|o| CashAddress::parse(&o.address, &self.prefix).ok())
            .unwrap_or_else(|| self.primary.clone())
    }

    /// Sign every input of `tx`. `spent[i]` must be the output spent by
    /// input `i`.
    pub fn sign_transaction(
        &self,
        tx: &mut Transaction,
        spent: &[RawOutput],
    ) -> Result<(), CoreError> {
        if spent.len() != tx.input.len() {
            return Err(CoreError::Signing(format!(
                "{} inputs but {} spent outputs",
                tx.input.len(),
                spent.len()
            )));
        }

        let sighasher = ForkIdSighasher::new(tx);
        for (index, output) in spent.iter().enumerate() {
            let address = CashAddress::parse(&output.address, &self.prefix)?;
            if address.kind() != AddressKind::P2pkh {
                return Err(CoreError::Signing(format!(
                    "cannot sign for non-P2PKH address {}",
                    output.address
                )));
            }
            let key = self
                .keys
                .get(address.hash())
                .ok_or_else(|| CoreError::MissingSigningKey(output.address.clone()))?;

            let script_code = address.script_pubkey();
            let digest = sighasher.signature_hash(tx, index, &script_code, output.value);
            let msg = Message::from_digest(digest.to_byte_array());
            let signature = self.secp.sign_ecdsa(&msg, &key.inner);

            let mut sig_bytes = signature.serialize_der().to_vec();
            sig_bytes.push(SIGHASH_ALL_FORKID as u8);
            let sig_push = PushBytesBuf::try_from(sig_bytes)
                .map_err(|e| CoreError::Signing(e.to_string()))?;

            tx.input[index].script_sig = Builder::new()
                .push_slice(sig_push)
                .push_key(&key.public_key(&self.secp))
                .into_script();
        }

        debug!(inputs = tx.input.len(), "signed transaction");
        Ok(())
    }
}

/// BIP143-style digest with the fork id, as used by eCash.
///
/// The prevout, sequence and output hashes are shared by every input of the
/// transaction, so they are computed once up front.
pub struct ForkIdSighasher {
    hash_prevouts: sha256d::Hash,
    hash_sequence: sha256d::Hash,
    hash_outputs: sha256d::Hash,
}

impl ForkIdSighasher {
    pub fn new(tx: &Transaction) -> Self {
        let mut prevouts = Vec::with_capacity(tx.input.len() * 36);
        let mut sequences = Vec::with_capacity(tx.input.len() * 4);
        for input in &tx.input {
            prevouts.extend(serialize(&input.previous_output));
            sequences.extend_from_slice(&input.sequence.0.to_le_bytes());
        }
        let mut outputs = Vec::new();
        for output in &tx.output {
            outputs.extend(serialize(output));
        }

        Self {
            hash_prevouts: sha256d::Hash::hash(&prevouts),
            hash_sequence: sha256d::Hash::hash(&sequences),
            hash_outputs: sha256d::Hash::hash(&outputs),
        }
    }

    pub fn signature_hash(
        &self,
        tx: &Transaction,
        index: usize,
        script_code: &Script,
        value: Amount,
    ) -> sha256d::Hash {
        let input = &tx.input[index];
        let mut preimage = Vec::with_capacity(200);
        preimage.extend_from_slice(&tx.version.0.to_le_bytes());
        preimage.extend_from_slice(self.hash_prevouts.as_byte_array());
        preimage.extend_from_slice(self.hash_sequence.as_byte_array());
        preimage.extend(serialize(&input.previous_output));
        preimage.extend(serialize(&script_code.to_owned()));
        preimage.extend_from_slice(&value.to_sat().to_le_bytes());
        preimage.extend_from_slice(&input.sequence.0.to_le_bytes());
        preimage.extend_from_slice(self.hash_outputs.as_byte_array());
        preimage.extend_from_slice(&tx.lock_time.to_consensus_u32().to_le_bytes());
        preimage.extend_from_slice(&SIGHASH_ALL_FORKID.to_le_bytes());
        sha256d::Hash::hash(&preimage)
    }
}
