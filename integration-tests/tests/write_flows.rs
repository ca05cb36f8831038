//! State-changing command flows: every corrective transaction and the
//! primary call are recovered from the mock consensus endpoint and asserted
//! in submit order.

use alloy::dyn_abi::DynSolValue;
use alloy::primitives::Address;
use integration_tests::support::{self, MockConsensus, GAS_STATION, LAZY_TOKEN, LOTTO, OPERATOR, STORAGE};
use lazy_lotto_cli::commands;
use lazy_lotto_cli::context::CommandContext;
use lazy_lotto_cli::output::envelope;
use lazykit::abi::{addr_arg, string_arg, uint_arg};
use lazykit::entity::{AccountId, TokenId};
use lazykit::preflight::{contract_spender, Condition, PreflightPlan, Prompter, Reconciler};
use lazykit::tx::{FungibleApproval, HbarApproval, Submitter, TransactionBody};
use lazykit::{KitError, KitResult};
use serde_json::json;
use wiremock::MockServer;

const NFT_COLLECTION: TokenId = TokenId::new(0, 0, 600);

async fn lazy_pool_details(server: &MockServer, ctx: &CommandContext, pool_id: u64, entry_fee: u64) {
    let iface = ctx.iface("LazyLotto").expect("interface loaded");
    support::mount_read(
        server,
        LOTTO,
        &support::calldata_hex(&iface, "getPoolDetails", &[uint_arg(pool_id as u128)]),
        &support::encode_outputs(vec![
            string_arg("LAZY Daily"),
            addr_arg(LAZY_TOKEN.to_evm()),
            uint_arg(entry_fee as u128),
            uint_arg(500),
            uint_arg(0),
            uint_arg(7),
            uint_arg(1),
        ]),
    )
    .await;
}

#[tokio::test]
async fn buy_tops_up_the_fee_allowance_before_the_purchase() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let ctx = CommandContext::with_env(support::test_env(&server.uri()), true, false)?;
    let iface = ctx.iface("LazyLotto")?;

    // Pool 2 charges 100 LAZY units per entry; five entries need 500.
    lazy_pool_details(&server, &ctx, 2, 100).await;
    support::mount_token_relationship(&server, LAZY_TOKEN, Some(10_000)).await;
    // An existing allowance of 100 to the gas station is short of the 500.
    support::mount_allowance_tables(
        &server,
        json!([{ "token_id": "0.0.500", "spender": "0.0.779", "amount": 100 }]),
        json!([]),
        json!([]),
    )
    .await;
    support::mount_gas_estimate(&server, 200_000).await;
    support::mount_consensus(&server, &support::encode_outputs(vec![uint_arg(15)])).await;

    let body = envelope(commands::buy::run(&ctx, 2, 5).await?);
    assert_eq!(body["success"], true);
    assert_eq!(body["poolId"], 2);
    assert_eq!(body["count"], 5);
    assert_eq!(body["totalEntries"], "15");

    let bodies = support::submitted_bodies(&server).await;
    assert_eq!(bodies.len(), 2, "one allowance top-up, then the purchase");
    assert_eq!(
        bodies[0],
        TransactionBody::ApproveAllowances {
            fungible: vec![FungibleApproval {
                token: LAZY_TOKEN,
                spender: AccountId::new(0, 0, GAS_STATION.num()),
                amount: 500,
            }],
            nft: vec![],
            hbar: vec![],
        }
    );
    match &bodies[1] {
        TransactionBody::ContractExecute { contract, call_data, gas, value_tinybar } => {
            assert_eq!(*contract, LOTTO);
            assert_eq!(call_data, &iface.encode_call("buyEntry", &[uint_arg(2), uint_arg(5)])?);
            // max(estimate 200k, fallback 800k) with the 1.2x mutate margin.
            assert_eq!(*gas, 960_000);
            assert_eq!(*value_tinybar, 0);
        }
        other => panic!("expected the purchase last, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn buy_in_hbar_attaches_value_and_skips_allowances() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let ctx = CommandContext::with_env(support::test_env(&server.uri()), true, false)?;
    let iface = ctx.iface("LazyLotto")?;

    support::mount_read(
        &server,
        LOTTO,
        &support::calldata_hex(&iface, "getPoolDetails", &[uint_arg(0)]),
        &support::encode_outputs(vec![
            string_arg("HBAR Weekly"),
            addr_arg(Address::ZERO),
            uint_arg(100_000_000),
            uint_arg(1_000),
            uint_arg(0),
            uint_arg(42),
            uint_arg(3),
        ]),
    )
    .await;
    support::mount_hbar_balance(&server, 500_000_000).await;
    support::mount_gas_estimate(&server, 200_000).await;
    support::mount_consensus(&server, &support::encode_outputs(vec![uint_arg(1)])).await;

    let body = envelope(commands::buy::run(&ctx, 0, 2).await?);
    assert_eq!(body["totalEntries"], "1");

    let bodies = support::submitted_bodies(&server).await;
    assert_eq!(bodies.len(), 1, "no preflight for an hbar-fee pool");
    match &bodies[0] {
        TransactionBody::ContractExecute { value_tinybar, .. } => assert_eq!(*value_tinybar, 200_000_000),
        other => panic!("expected a purchase, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn buy_refuses_when_the_fee_balance_is_short() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let ctx = CommandContext::with_env(support::test_env(&server.uri()), true, false)?;

    lazy_pool_details(&server, &ctx, 2, 100).await;
    support::mount_token_relationship(&server, LAZY_TOKEN, Some(300)).await;

    let err = commands::buy::run(&ctx, 2, 5).await.unwrap_err();
    assert!(matches!(err, KitError::InsufficientBalance { required: 500, available: 300, .. }));
    assert!(support::submitted_bodies(&server).await.is_empty());
    Ok(())
}

#[tokio::test]
async fn buy_rejects_a_fee_that_overflows_the_total() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let ctx = CommandContext::with_env(support::test_env(&server.uri()), true, false)?;
    let iface = ctx.iface("LazyLotto")?;

    // A hostile pool config: the per-entry fee alone saturates u128.
    support::mount_read(
        &server,
        LOTTO,
        &support::calldata_hex(&iface, "getPoolDetails", &[uint_arg(3)]),
        &support::encode_outputs(vec![
            string_arg("Hostile"),
            addr_arg(LAZY_TOKEN.to_evm()),
            uint_arg(u128::MAX),
            uint_arg(500),
            uint_arg(0),
            uint_arg(0),
            uint_arg(0),
        ]),
    )
    .await;

    let err = commands::buy::run(&ctx, 3, 2).await.unwrap_err();
    assert!(matches!(err, KitError::InvalidRequest(_)));
    assert!(support::submitted_bodies(&server).await.is_empty());
    Ok(())
}

struct Decline;

impl Prompter for Decline {
    fn confirm(&self, _message: &str) -> KitResult<bool> {
        Ok(false)
    }
}

struct ClosedStdin;

impl Prompter for ClosedStdin {
    fn confirm(&self, _message: &str) -> KitResult<bool> {
        Err(KitError::UserCancelled)
    }
}

#[tokio::test]
async fn declined_allowance_prompt_surfaces_insufficient_allowance() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let ctx = CommandContext::with_env(support::test_env(&server.uri()), true, false)?;
    support::mount_allowance_tables(&server, json!([]), json!([]), json!([])).await;

    let mock = MockConsensus::new();
    let submitter = Submitter::new(&ctx.env, &ctx.registry, mock.clone());
    let plan = PreflightPlan::new().require(Condition::FungibleAllowance {
        token: LAZY_TOKEN,
        spender: contract_spender(GAS_STATION),
        amount: 500,
    });

    let err = Reconciler::new(&ctx.env, &ctx.mirror, &submitter, &Decline).run(&plan).await.unwrap_err();
    assert!(matches!(err, KitError::InsufficientAllowance { required: 500, available: 0, .. }));
    assert!(mock.submitted().is_empty(), "a declined prompt must not issue a transaction");
    Ok(())
}

#[tokio::test]
async fn eof_on_the_prompt_cancels_with_nothing_submitted() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let ctx = CommandContext::with_env(support::test_env(&server.uri()), true, false)?;
    support::mount_allowance_tables(&server, json!([]), json!([]), json!([])).await;

    let mock = MockConsensus::new();
    let submitter = Submitter::new(&ctx.env, &ctx.registry, mock.clone());
    let plan = PreflightPlan::new().require(Condition::FungibleAllowance {
        token: LAZY_TOKEN,
        spender: contract_spender(GAS_STATION),
        amount: 500,
    });

    let err = Reconciler::new(&ctx.env, &ctx.mirror, &submitter, &ClosedStdin).run(&plan).await.unwrap_err();
    assert!(matches!(err, KitError::UserCancelled));
    assert!(mock.submitted().is_empty());
    Ok(())
}

#[tokio::test]
async fn claim_associates_and_grants_hbar_allowance_then_claims() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let ctx = CommandContext::with_env(support::test_env(&server.uri()), true, false)?;
    let iface = ctx.iface("LazyLotto")?;

    // One pending package in pool 1: 1 HBAR plus an NFT from 0.0.600.
    let package = DynSolValue::Tuple(vec![
        uint_arg(1),
        addr_arg(Address::ZERO),
        uint_arg(0),
        uint_arg(100_000_000),
        DynSolValue::Array(vec![DynSolValue::Tuple(vec![addr_arg(NFT_COLLECTION.to_evm()), uint_arg(7)])]),
    ]);
    support::mount_read(
        &server,
        LOTTO,
        &support::calldata_hex(&iface, "getPendingPrizes", &[addr_arg(OPERATOR.to_evm())]),
        &support::encode_outputs(vec![DynSolValue::Array(vec![package])]),
    )
    .await;
    support::mount_token_relationship(&server, NFT_COLLECTION, None).await;
    support::mount_allowance_tables(&server, json!([]), json!([]), json!([])).await;
    support::mount_gas_estimate(&server, 900_000).await;
    support::mount_consensus(&server, &support::encode_outputs(vec![DynSolValue::Array(vec![uint_arg(1)])])).await;

    let body = envelope(commands::claim::run(&ctx).await?);
    assert_eq!(body["poolIds"], json!([1]));
    assert_eq!(body["prizes"], json!(["pool 1: 1 \u{210f} + 0.0.600 #7"]));

    let bodies = support::submitted_bodies(&server).await;
    assert_eq!(bodies.len(), 3, "associate, hbar allowance, claim");
    assert_eq!(bodies[0], TransactionBody::TokenAssociate { account: OPERATOR, tokens: vec![NFT_COLLECTION] });
    assert_eq!(
        bodies[1],
        TransactionBody::ApproveAllowances {
            fungible: vec![],
            nft: vec![],
            hbar: vec![HbarApproval { spender: AccountId::new(0, 0, STORAGE.num()), amount_tinybar: 1 }],
        }
    );
    match &bodies[2] {
        TransactionBody::ContractExecute { call_data, gas, .. } => {
            assert_eq!(call_data, &iface.encode_call("claimAllPrizes", &[])?);
            // max(estimate 900k, fallback 1.5M) with the 1.2x mutate margin.
            assert_eq!(*gas, 1_800_000);
        }
        other => panic!("expected the claim last, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn roll_doubles_gas_and_reports_the_observed_win_rate() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let ctx = CommandContext::with_env(support::test_env(&server.uri()), true, false)?;
    let iface = ctx.iface("LazyLotto")?;

    let state = DynSolValue::Tuple(vec![uint_arg(2), uint_arg(100), uint_arg(0)]);
    support::mount_read(
        &server,
        LOTTO,
        &support::calldata_hex(&iface, "getUserPoolState", &[addr_arg(OPERATOR.to_evm())]),
        &support::encode_outputs(vec![DynSolValue::Array(vec![state])]),
    )
    .await;
    support::mount_gas_estimate(&server, 500_000).await;
    // One win out of the hundred rolled.
    support::mount_consensus(&server, &support::encode_outputs(vec![uint_arg(1), uint_arg(0)])).await;

    let body = envelope(commands::roll::run(&ctx, 2, Some(100)).await?);
    assert_eq!(body["rolled"], "100");
    assert_eq!(body["wins"], "1");
    assert_eq!(body["actualRate"], "1.00%");
    assert_eq!(body["remainingEntries"], "0");

    let bodies = support::submitted_bodies(&server).await;
    assert_eq!(bodies.len(), 1);
    match &bodies[0] {
        TransactionBody::ContractExecute { call_data, gas, .. } => {
            assert_eq!(call_data, &iface.encode_call("rollEntries", &[uint_arg(2), uint_arg(100)])?);
            // Random class: twice max(estimate 500k, fallback 1.2M).
            assert_eq!(*gas, 2_400_000);
            assert!(*gas >= 2 * 1_200_000);
        }
        other => panic!("expected a roll, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn roll_rejects_more_entries_than_are_pending() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let ctx = CommandContext::with_env(support::test_env(&server.uri()), true, false)?;
    let iface = ctx.iface("LazyLotto")?;

    let state = DynSolValue::Tuple(vec![uint_arg(2), uint_arg(10), uint_arg(0)]);
    support::mount_read(
        &server,
        LOTTO,
        &support::calldata_hex(&iface, "getUserPoolState", &[addr_arg(OPERATOR.to_evm())]),
        &support::encode_outputs(vec![DynSolValue::Array(vec![state])]),
    )
    .await;

    let err = commands::roll::run(&ctx, 2, Some(11)).await.unwrap_err();
    assert!(matches!(err, KitError::InvalidRequest(_)));
    assert!(support::submitted_bodies(&server).await.is_empty());
    Ok(())
}

#[tokio::test]
async fn claim_with_nothing_pending_is_an_invalid_request() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let ctx = CommandContext::with_env(support::test_env(&server.uri()), true, false)?;
    let iface = ctx.iface("LazyLotto")?;

    support::mount_read(
        &server,
        LOTTO,
        &support::calldata_hex(&iface, "getPendingPrizes", &[addr_arg(OPERATOR.to_evm())]),
        &support::encode_outputs(vec![DynSolValue::Array(vec![])]),
    )
    .await;

    let err = commands::claim::run(&ctx).await.unwrap_err();
    assert!(matches!(err, KitError::InvalidRequest(_)));
    assert!(support::submitted_bodies(&server).await.is_empty());
    Ok(())
}
