//! Offline multi-sig phases end to end: export an unsigned artifact, collect
//! detached signatures through files, merge and submit against an in-memory
//! consensus node.

use ed25519_dalek::SigningKey;
use integration_tests::support::{self, MockConsensus, LOTTO, OPERATOR};
use lazy_lotto_cli::context::CommandContext;
use lazykit::multisig::{merge, now_unix_nanos, sign_artifact, MultiSigArtifact, SignerArtifact};
use lazykit::tx::{CallRequest, Submitter, TransactionBody};
use lazykit::KitError;

fn pause_request() -> CallRequest {
    CallRequest {
        contract: LOTTO,
        function: "pause".into(),
        args: vec![],
        gas_limit: 480_000,
        value_tinybar: 0,
        sender: OPERATOR,
    }
}

#[tokio::test]
async fn export_sign_twice_merge_and_submit() -> anyhow::Result<()> {
    let ctx = CommandContext::with_env(support::test_env("http://127.0.0.1:1"), true, false)?;
    let mock = MockConsensus::new();
    let submitter = Submitter::new(&ctx.env, &ctx.registry, mock.clone());
    let iface = ctx.iface("LazyLotto")?;

    // Phase 1: freeze and export the unsigned artifact.
    let frozen = submitter.freeze_call(&iface, &pause_request())?;
    let dir = tempfile::tempdir()?;
    let artifact_path = dir.path().join("pause.msig.json");
    MultiSigArtifact::from_frozen(&frozen, "pause", 2)?.write(&artifact_path)?;

    // Phase 2: two signers work from the exported file alone.
    let exported = MultiSigArtifact::read(&artifact_path)?;
    let alice_sig = sign_artifact(&exported, ctx.env.operator_key(), "alice")?;
    let bob = SigningKey::from_bytes(&[7u8; 32]);
    let bob_sig = sign_artifact(&exported, &bob, "bob")?;
    let alice_path = dir.path().join("pause.alice.sig.json");
    let bob_path = dir.path().join("pause.bob.sig.json");
    alice_sig.write(&alice_path)?;
    bob_sig.write(&bob_path)?;

    // Phase 3: merge the signature files and submit.
    let signers = vec![SignerArtifact::read(&alice_path)?, SignerArtifact::read(&bob_path)?];
    let merged = merge(&exported, &signers, now_unix_nanos())?;
    let record = submitter.submit_frozen(merged, None).await?;
    assert_eq!(record.status, "SUCCESS");

    let bodies = mock.submitted();
    assert_eq!(bodies.len(), 1);
    match &bodies[0] {
        TransactionBody::ContractExecute { contract, call_data, gas, .. } => {
            assert_eq!(*contract, LOTTO);
            assert_eq!(call_data, &iface.encode_call("pause", &[])?);
            assert_eq!(*gas, 480_000);
        }
        other => panic!("expected the pause call, got {other:?}"),
    }
    assert_eq!(mock.signature_counts(), vec![2]);
    Ok(())
}

#[tokio::test]
async fn merge_below_threshold_never_submits() -> anyhow::Result<()> {
    let ctx = CommandContext::with_env(support::test_env("http://127.0.0.1:1"), true, false)?;
    let mock = MockConsensus::new();
    let submitter = Submitter::new(&ctx.env, &ctx.registry, mock.clone());
    let iface = ctx.iface("LazyLotto")?;

    let frozen = submitter.freeze_call(&iface, &pause_request())?;
    let artifact = MultiSigArtifact::from_frozen(&frozen, "pause", 2)?;
    let only = sign_artifact(&artifact, ctx.env.operator_key(), "alice")?;

    let err = merge(&artifact, &[only], now_unix_nanos()).unwrap_err();
    assert!(matches!(err, KitError::ThresholdNotMet { have: 1, need: 2 }));
    assert!(mock.submitted().is_empty());
    Ok(())
}

#[tokio::test]
async fn merge_refuses_outside_the_validity_window() -> anyhow::Result<()> {
    let ctx = CommandContext::with_env(support::test_env("http://127.0.0.1:1"), true, false)?;
    let mock = MockConsensus::new();
    let submitter = Submitter::new(&ctx.env, &ctx.registry, mock.clone());
    let iface = ctx.iface("LazyLotto")?;

    let frozen = submitter.freeze_call(&iface, &pause_request())?;
    let artifact = MultiSigArtifact::from_frozen(&frozen, "pause", 2)?;
    let a = sign_artifact(&artifact, ctx.env.operator_key(), "alice")?;
    let b = sign_artifact(&artifact, &SigningKey::from_bytes(&[7u8; 32]), "bob")?;

    let after_window = artifact.valid_start_unix_nanos + 121 * 1_000_000_000;
    let err = merge(&artifact, &[a, b], after_window).unwrap_err();
    assert!(matches!(err, KitError::ArtifactExpired { .. }));
    assert!(mock.submitted().is_empty());
    Ok(())
}
