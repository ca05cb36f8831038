//! Threshold authorisation over frozen transactions.
//!
//! Interactive mode signs with M keys in one process over a single freeze.
//! Offline mode splits into three invocations: export writes the frozen body
//! plus metadata to disk, each signer verifies the intent fields and emits a
//! signature file over the body hash, and merge reassembles the transaction,
//! rejects duplicates, enforces the threshold and refuses submission outside
//! the validity window.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use ed25519_dalek::SigningKey;
use log::info;
use serde::{Deserialize, Serialize};

use crate::entity::ContractId;
use crate::error::{KitError, KitResult};
use crate::tx::{FrozenTransaction, TransactionBody};

pub const ARTIFACT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignatureEntry {
    pub label: String,
    /// Full ED25519 public key, hex-encoded; doubles as the dedupe key.
    pub pubkey_fingerprint: String,
    pub sig_hex: String,
}

/// On-disk form of a frozen-but-unsigned transaction plus metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiSigArtifact {
    pub version: u32,
    pub contract: ContractId,
    pub function: String,
    pub encoded_args_hex: String,
    pub gas: u64,
    pub value_tinybars: u64,
    pub valid_start_unix_nanos: u64,
    pub threshold: usize,
    pub body_hex: String,
    pub body_hash_hex: String,
    #[serde(default)]
    pub signatures: Vec<SignatureEntry>,
}

/// A per-signer file: references the primary artifact by body hash and
/// carries exactly one signature entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerArtifact {
    pub version: u32,
    pub body_hash_hex: String,
    pub signature: SignatureEntry,
}

fn artifact_mismatch(detail: impl Into<String>) -> KitError {
    KitError::SubmitFailed { status: format!("artifact mismatch: {}", detail.into()) }
}

impl MultiSigArtifact {
    /// Build the export-phase artifact from a frozen contract-execute call.
    pub fn from_frozen(tx: &FrozenTransaction, function: &str, threshold: usize) -> KitResult<Self> {
        let TransactionBody::ContractExecute { contract, call_data, gas, value_tinybar } = tx.body() else {
            return Err(artifact_mismatch("only contract-execute transactions are exported"));
        };
        Ok(MultiSigArtifact {
            version: ARTIFACT_VERSION,
            contract: *contract,
            function: function.to_string(),
            encoded_args_hex: hex::encode(call_data),
            gas: *gas,
            value_tinybars: *value_tinybar,
            valid_start_unix_nanos: tx.id().valid_start_nanos,
            threshold,
            body_hex: hex::encode(tx.body_bytes()),
            body_hash_hex: hex::encode(tx.body_hash()),
            signatures: Vec::new(),
        })
    }

    /// Reconstruct the frozen transaction and verify the metadata the signer
    /// reviewed actually matches the body they are signing.
    pub fn thaw_verified(&self) -> KitResult<FrozenTransaction> {
        if self.version != ARTIFACT_VERSION {
            return Err(artifact_mismatch(format!("unsupported scheme version {}", self.version)));
        }
        let body_bytes = hex::decode(&self.body_hex)
            .map_err(|e| artifact_mismatch(format!("body hex: {e}")))?;
        let tx = FrozenTransaction::thaw(body_bytes)?;
        if hex::encode(tx.body_hash()) != self.body_hash_hex {
            return Err(artifact_mismatch("body hash does not match body bytes"));
        }
        let TransactionBody::ContractExecute { contract, call_data, gas, value_tinybar } = tx.body() else {
            return Err(artifact_mismatch("body is not a contract execute"));
        };
        if *contract != self.contract
            || hex::encode(call_data) != self.encoded_args_hex
            || *gas != self.gas
            || *value_tinybar != self.value_tinybars
            || tx.id().valid_start_nanos != self.valid_start_unix_nanos
        {
            return Err(artifact_mismatch("metadata does not match the frozen body"));
        }
        Ok(tx)
    }

    pub fn write(&self, path: &Path) -> KitResult<()> {
        // Exclusive create: export never clobbers an artifact already being
        // signed elsewhere.
        let mut file = fs::OpenOptions::new().write(true).create_new(true).open(path)?;
        file.write_all(serde_json::to_string_pretty(self)?.as_bytes())?;
        info!("wrote multi-sig artifact {}", path.display());
        Ok(())
    }

    pub fn read(path: &Path) -> KitResult<Self> {
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }
}

impl SignerArtifact {
    pub fn write(&self, path: &Path) -> KitResult<()> {
        let mut file = fs::OpenOptions::new().write(true).create_new(true).open(path)?;
        file.write_all(serde_json::to_string_pretty(self)?.as_bytes())?;
        info!("wrote signer artifact {}", path.display());
        Ok(())
    }

    pub fn read(path: &Path) -> KitResult<Self> {
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }
}

/// Sign phase: verify the artifact, sign the frozen body hash, emit the
/// signer file contents.
pub fn sign_artifact(artifact: &MultiSigArtifact, key: &SigningKey, label: &str) -> KitResult<SignerArtifact> {
    use ed25519_dalek::Signer;
    let tx = artifact.thaw_verified()?;
    let signature = key.sign(&tx.body_hash());
    Ok(SignerArtifact {
        version: ARTIFACT_VERSION,
        body_hash_hex: artifact.body_hash_hex.clone(),
        signature: SignatureEntry {
            label: label.to_string(),
            pubkey_fingerprint: hex::encode(key.verifying_key().to_bytes()),
            sig_hex: hex::encode(signature.to_bytes()),
        },
    })
}

/// Merge phase: reassemble the transaction with every distinct signature.
/// Fails with `DuplicateSigner` on a repeated fingerprint, `ThresholdNotMet`
/// when fewer than `threshold` distinct signers are present, and
/// `ArtifactExpired` outside the validity window.
pub fn merge(
    artifact: &MultiSigArtifact,
    signers: &[SignerArtifact],
    now_unix_nanos: u64,
) -> KitResult<FrozenTransaction> {
    let mut tx = artifact.thaw_verified()?;

    let valid_start = artifact.valid_start_unix_nanos;
    let valid_end = valid_start + tx.valid_duration().as_nanos() as u64;
    if now_unix_nanos < valid_start || now_unix_nanos > valid_end {
        return Err(KitError::ArtifactExpired { valid_start_unix_nanos: valid_start });
    }

    let mut seen: Vec<String> = Vec::new();
    let inline = artifact.signatures.iter();
    let from_files = signers.iter().map(|s| &s.signature);
    for entry in inline.chain(from_files) {
        if seen.contains(&entry.pubkey_fingerprint) {
            return Err(KitError::DuplicateSigner { fingerprint: entry.pubkey_fingerprint.clone() });
        }
        attach_entry(&mut tx, entry)?;
        seen.push(entry.pubkey_fingerprint.clone());
    }

    if seen.len() < artifact.threshold {
        return Err(KitError::ThresholdNotMet { have: seen.len(), need: artifact.threshold });
    }
    Ok(tx)
}

fn attach_entry(tx: &mut FrozenTransaction, entry: &SignatureEntry) -> KitResult<()> {
    let pk: [u8; 32] = hex::decode(&entry.pubkey_fingerprint)
        .ok()
        .and_then(|v| v.try_into().ok())
        .ok_or_else(|| artifact_mismatch(format!("fingerprint of {} is not a 32-byte key", entry.label)))?;
    let sig: [u8; 64] = hex::decode(&entry.sig_hex)
        .ok()
        .and_then(|v| v.try_into().ok())
        .ok_or_else(|| artifact_mismatch(format!("signature of {} is not 64 bytes", entry.label)))?;
    tx.attach_signature(pk, sig)
}

/// Interactive workflow: one process, one freeze, M keys.
pub fn sign_with_keys(tx: &mut FrozenTransaction, keys: &[SigningKey]) {
    for key in keys {
        tx.sign(key);
    }
}

pub fn now_unix_nanos() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos() as u64).unwrap_or(0)
}
