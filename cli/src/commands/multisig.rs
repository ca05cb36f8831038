//! Multi-sig orchestration for admin calls, plus the standalone
//! `sign-artifact` and `submit-artifact` phase commands.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use ed25519_dalek::SigningKey;
use lazykit::abi::ContractInterface;
use lazykit::env::parse_private_key;
use lazykit::error::{KitError, KitResult};
use lazykit::multisig::{merge, now_unix_nanos, sign_artifact, MultiSigArtifact, SignerArtifact};
use lazykit::tx::{CallRequest, FrozenTransaction, HttpConsensusClient, Submitter};
use serde_json::{json, Value};

use crate::cli::MultiSigOpts;
use crate::context::CommandContext;

pub const MULTISIG_HELP: &str = "\
Multi-sig workflows
  interactive: every key is present in one invocation
    lotto admin pause --multisig --threshold 2 --keyfiles k1.hex,k2.hex --signers alice,bob
  offline: three separate invocations
    1. lotto admin pause --multisig --workflow offline --export-only \\
         --threshold 2 --artifact pause.msig.json
    2. lotto sign-artifact pause.msig.json --label alice --keyfile k1.hex
       (each signer, on their own machine)
    3. lotto submit-artifact pause.msig.json \\
         --signatures pause.alice.sig.json,pause.bob.sig.json
The artifact is only valid for the transaction's 120-second window; export
and submit within it.";

/// Route a frozen admin call through the selected workflow.
pub async fn run_call(
    ctx: &CommandContext,
    submitter: &Submitter<'_, HttpConsensusClient>,
    iface: &ContractInterface,
    req: &CallRequest,
    opts: &MultiSigOpts,
) -> KitResult<Value> {
    if opts.workflow == "offline" {
        if opts.export_only {
            let frozen = submitter.freeze_call(iface, req)?;
            let artifact = MultiSigArtifact::from_frozen(&frozen, &req.function, opts.threshold)?;
            artifact.write(&opts.artifact)?;
            ctx.out.human(format!(
                "wrote {} (threshold {}, valid start {})",
                opts.artifact.display(),
                opts.threshold,
                artifact.valid_start_unix_nanos
            ));
            return Ok(json!({
                "artifact": opts.artifact.display().to_string(),
                "function": req.function,
                "threshold": opts.threshold,
                "validStartUnixNanos": artifact.valid_start_unix_nanos,
            }));
        }
        if opts.signatures.is_empty() {
            return Err(KitError::Env(
                "offline workflow is three phases: --export-only, then sign-artifact, then submit with --signatures"
                    .into(),
            ));
        }
        // Merge phase against the previously exported artifact, never against
        // a fresh freeze: re-freezing would invalidate every signature.
        return run_submit(ctx, submitter, &opts.artifact, &opts.signatures).await;
    }

    // Interactive: the operator key plus every key file, deduplicated.
    let mut frozen = submitter.freeze_call(iface, req)?;
    let mut keys = vec![ctx.env.operator_key().clone()];
    for path in &opts.keyfiles {
        keys.push(load_keyfile(path)?);
    }
    let keys = distinct_keys(keys);
    if keys.len() < opts.threshold {
        return Err(KitError::ThresholdNotMet { have: keys.len(), need: opts.threshold });
    }
    for key in &keys {
        frozen.sign(key);
    }
    let signer_count = frozen.signatures().len();
    let labels = if opts.signers.is_empty() { format!("{signer_count} signers") } else { opts.signers.join(", ") };
    let record = submitter.submit_frozen(frozen, None).await?;
    ctx.out.human(format!("submitted {} signed by {labels} ({})", req.function, record.transaction_id));
    Ok(json!({
        "function": req.function,
        "signers": signer_count,
        "status": record.status,
        "transactionId": record.transaction_id,
    }))
}

pub fn run_sign(ctx: &CommandContext, file: &Path, label: &str, keyfile: Option<&Path>) -> KitResult<Value> {
    let artifact = MultiSigArtifact::read(file)?;
    let key = match keyfile {
        Some(path) => load_keyfile(path)?,
        None => ctx.env.operator_key().clone(),
    };
    let signer = sign_artifact(&artifact, &key, label)?;
    let out_path = signer_path(file, label);
    signer.write(&out_path)?;
    ctx.out.human(format!("signed {} as {label} -> {}", file.display(), out_path.display()));
    Ok(json!({
        "signerFile": out_path.display().to_string(),
        "label": label,
        "fingerprint": signer.signature.pubkey_fingerprint,
    }))
}

pub async fn run_submit(
    ctx: &CommandContext,
    submitter: &Submitter<'_, HttpConsensusClient>,
    file: &Path,
    signature_files: &[PathBuf],
) -> KitResult<Value> {
    let artifact = MultiSigArtifact::read(file)?;
    let signers = signature_files.iter().map(|p| SignerArtifact::read(p)).collect::<KitResult<Vec<_>>>()?;
    let frozen: FrozenTransaction = merge(&artifact, &signers, now_unix_nanos())?;
    let signer_count = frozen.signatures().len();
    let record = submitter.submit_frozen(frozen, None).await?;
    ctx.out.human(format!(
        "submitted {} with {signer_count} signatures ({})",
        artifact.function, record.transaction_id
    ));
    Ok(json!({
        "function": artifact.function,
        "signers": signer_count,
        "status": record.status,
        "transactionId": record.transaction_id,
    }))
}

/// Keep the first occurrence of each public key; a repeated key must not
/// count twice towards the threshold, wherever it appears in the list.
fn distinct_keys(keys: Vec<SigningKey>) -> Vec<SigningKey> {
    let mut seen = HashSet::new();
    keys.into_iter().filter(|k| seen.insert(k.verifying_key().to_bytes())).collect()
}

/// A key file holds one ED25519 seed in hex, same formats as PRIVATE_KEY.
fn load_keyfile(path: &Path) -> KitResult<SigningKey> {
    let text = fs::read_to_string(path).map_err(|e| KitError::Env(format!("keyfile {}: {e}", path.display())))?;
    parse_private_key(&text)
}

/// `pause.msig.json` signed as alice becomes `pause.alice.sig.json`.
fn signer_path(artifact: &Path, label: &str) -> PathBuf {
    let stem = artifact
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.trim_end_matches(".msig.json").trim_end_matches(".json"))
        .unwrap_or("artifact");
    artifact.with_file_name(format!("{stem}.{label}.sig.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signer_paths_follow_the_artifact_name() {
        assert_eq!(signer_path(Path::new("pause.msig.json"), "alice"), PathBuf::from("pause.alice.sig.json"));
        assert_eq!(signer_path(Path::new("/tmp/op.json"), "bob"), PathBuf::from("/tmp/op.bob.sig.json"));
    }

    #[test]
    fn repeated_key_counts_once_regardless_of_position() {
        let op = SigningKey::from_bytes(&[1u8; 32]);
        let other = SigningKey::from_bytes(&[2u8; 32]);
        // Operator first, then a key file that holds the operator key again.
        let keys = distinct_keys(vec![op.clone(), other.clone(), op.clone()]);
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].verifying_key(), op.verifying_key());
        assert_eq!(keys[1].verifying_key(), other.verifying_key());
    }
}
