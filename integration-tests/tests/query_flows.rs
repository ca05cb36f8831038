//! Read-only command flows: `info` and `pools` against a mocked mirror.

use alloy::primitives::Address;
use integration_tests::support::{self, GAS_STATION, LAZY_TOKEN, LOTTO, STORAGE};
use lazy_lotto_cli::commands;
use lazy_lotto_cli::context::CommandContext;
use lazy_lotto_cli::output::envelope;
use lazykit::abi::{addr_arg, bool_arg, string_arg, uint_arg};
use wiremock::MockServer;

#[tokio::test]
async fn info_joins_config_reads_into_one_snapshot() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let ctx = CommandContext::with_env(support::test_env(&server.uri()), true, false)?;
    let iface = ctx.iface("LazyLotto")?;

    let reads = [
        ("isPaused", vec![bool_arg(false)]),
        ("getBurnPercentage", vec![uint_arg(25)]),
        ("getTotalPools", vec![uint_arg(3)]),
        ("getLazyToken", vec![addr_arg(LAZY_TOKEN.to_evm())]),
        ("getStorageContract", vec![addr_arg(STORAGE.to_evm())]),
        ("getGasStation", vec![addr_arg(GAS_STATION.to_evm())]),
        ("getPrngContract", vec![addr_arg(Address::ZERO)]),
        ("getMaxEntriesPerRoll", vec![uint_arg(50)]),
    ];
    for (function, outputs) in reads {
        support::mount_read(
            &server,
            LOTTO,
            &support::calldata_hex(&iface, function, &[]),
            &support::encode_outputs(outputs),
        )
        .await;
    }

    let body = envelope(commands::info::run(&ctx).await?);
    assert_eq!(body["success"], true);
    assert_eq!(body["config"]["paused"], false);
    assert_eq!(body["config"]["burnPercentage"], 25);
    assert_eq!(body["config"]["totalPools"], 3);
    assert_eq!(body["config"]["lazyToken"], "0.0.500");
    assert_eq!(body["config"]["storageContract"], "0.0.778");
    assert_eq!(body["config"]["gasStation"], "0.0.779");
    assert_eq!(body["config"]["prngContract"], "none");
    assert_eq!(body["config"]["maxEntriesPerRoll"], 50);
    assert_eq!(body["metadata"]["network"], "local");
    assert_eq!(body["metadata"]["contract"], "0.0.777");
    assert_eq!(body["metadata"]["operator"], "0.0.1001");
    Ok(())
}

#[tokio::test]
async fn pools_renders_win_rates_and_fees_in_display_units() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let ctx = CommandContext::with_env(support::test_env(&server.uri()), true, false)?;
    let iface = ctx.iface("LazyLotto")?;

    support::mount_read(
        &server,
        LOTTO,
        &support::calldata_hex(&iface, "getTotalPools", &[]),
        &support::encode_outputs(vec![uint_arg(2)]),
    )
    .await;
    // Pool 0: 1 HBAR entry fee, 0.1000% win rate.
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
    // Pool 1: 0.5 LAZY entry fee (2 decimals), 0.0500% win rate.
    support::mount_read(
        &server,
        LOTTO,
        &support::calldata_hex(&iface, "getPoolDetails", &[uint_arg(1)]),
        &support::encode_outputs(vec![
            string_arg("LAZY Daily"),
            addr_arg(LAZY_TOKEN.to_evm()),
            uint_arg(50),
            uint_arg(500),
            uint_arg(0),
            uint_arg(7),
            uint_arg(1),
        ]),
    )
    .await;
    support::mount_token_info(&server, LAZY_TOKEN, "LAZY", 2).await;

    let body = envelope(commands::pools::list(&ctx).await?);
    assert_eq!(body["success"], true);
    let pools = body["pools"].as_array().expect("pools array");
    assert_eq!(pools.len(), 2);

    assert_eq!(pools[0]["name"], "HBAR Weekly");
    assert_eq!(pools[0]["winRate"], "0.1000%");
    assert_eq!(pools[0]["entryFee"], "1 \u{210f}");
    assert_eq!(pools[0]["feeToken"], "HBAR");
    assert_eq!(pools[0]["status"], "active");

    assert_eq!(pools[1]["name"], "LAZY Daily");
    assert_eq!(pools[1]["winRate"], "0.0500%");
    assert_eq!(pools[1]["entryFee"], "0.5 LAZY");
    assert_eq!(pools[1]["feeToken"], "0.0.500");
    Ok(())
}

#[tokio::test]
async fn pool_detail_lists_the_prize_manifest() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let ctx = CommandContext::with_env(support::test_env(&server.uri()), true, false)?;
    let iface = ctx.iface("LazyLotto")?;

    support::mount_read(
        &server,
        LOTTO,
        &support::calldata_hex(&iface, "getPoolDetails", &[uint_arg(1)]),
        &support::encode_outputs(vec![
            string_arg("LAZY Daily"),
            addr_arg(LAZY_TOKEN.to_evm()),
            uint_arg(50),
            uint_arg(500),
            uint_arg(0),
            uint_arg(7),
            uint_arg(1),
        ]),
    )
    .await;
    support::mount_token_info(&server, LAZY_TOKEN, "LAZY", 2).await;
    // One prize package: 100 LAZY units plus an NFT.
    let collection = lazykit::entity::TokenId::new(0, 0, 600);
    let package = alloy::dyn_abi::DynSolValue::Tuple(vec![
        addr_arg(LAZY_TOKEN.to_evm()),
        uint_arg(100),
        uint_arg(0),
        alloy::dyn_abi::DynSolValue::Array(vec![alloy::dyn_abi::DynSolValue::Tuple(vec![
            addr_arg(collection.to_evm()),
            uint_arg(7),
        ])]),
    ]);
    support::mount_read(
        &server,
        LOTTO,
        &support::calldata_hex(&iface, "getPoolPrizes", &[uint_arg(1)]),
        &support::encode_outputs(vec![alloy::dyn_abi::DynSolValue::Array(vec![package])]),
    )
    .await;

    let body = envelope(commands::pools::detail(&ctx, 1).await?);
    assert_eq!(body["pool"]["poolId"], 1);
    assert_eq!(body["pool"]["entryFee"], "0.5 LAZY");
    let prizes = body["pool"]["prizes"].as_array().expect("prizes array");
    assert_eq!(prizes.len(), 1);
    assert_eq!(prizes[0], "pool 1: 100 units of 0.0.500 + 0.0.600 #7");
    Ok(())
}
