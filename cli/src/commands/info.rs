//! `info`: the contract's parameterless configuration reads, fanned out
//! concurrently and joined into one snapshot.

use lazykit::abi::{as_address, as_bool, as_u64};
use lazykit::error::KitResult;
use serde_json::{json, Value};

use crate::commands::views::address_label;
use crate::context::{CommandContext, LOTTO};

pub async fn run(ctx: &CommandContext) -> KitResult<Value> {
    let contract = ctx.env.require_lotto()?;
    let iface = ctx.iface(LOTTO)?;

    let (paused, burn, pools, lazy, storage, gas_station, prng, max_roll) = tokio::try_join!(
        ctx.read(&iface, contract, "isPaused", &[]),
        ctx.read(&iface, contract, "getBurnPercentage", &[]),
        ctx.read(&iface, contract, "getTotalPools", &[]),
        ctx.read(&iface, contract, "getLazyToken", &[]),
        ctx.read(&iface, contract, "getStorageContract", &[]),
        ctx.read(&iface, contract, "getGasStation", &[]),
        ctx.read(&iface, contract, "getPrngContract", &[]),
        ctx.read(&iface, contract, "getMaxEntriesPerRoll", &[]),
    )?;

    let paused = as_bool("isPaused", &paused[0])?;
    let burn = as_u64("burnPercentage", &burn[0])?;
    let pools = as_u64("totalPools", &pools[0])?;
    let lazy = address_label(as_address("lazyToken", &lazy[0])?);
    let storage = address_label(as_address("storageContract", &storage[0])?);
    let gas_station = address_label(as_address("gasStation", &gas_station[0])?);
    let prng = address_label(as_address("prngContract", &prng[0])?);
    let max_roll = as_u64("maxEntriesPerRoll", &max_roll[0])?;

    ctx.out.human(format!("LazyLotto {contract} on {}", ctx.env.network));
    ctx.out.human(format!("  paused:              {paused}"));
    ctx.out.human(format!("  burn percentage:     {burn}"));
    ctx.out.human(format!("  total pools:         {pools}"));
    ctx.out.human(format!("  lazy token:          {lazy}"));
    ctx.out.human(format!("  storage contract:    {storage}"));
    ctx.out.human(format!("  gas station:         {gas_station}"));
    ctx.out.human(format!("  prng contract:       {prng}"));
    ctx.out.human(format!("  max entries / roll:  {max_roll}"));

    Ok(json!({
        "config": {
            "paused": paused,
            "burnPercentage": burn,
            "totalPools": pools,
            "lazyToken": lazy,
            "storageContract": storage,
            "gasStation": gas_station,
            "prngContract": prng,
            "maxEntriesPerRoll": max_roll,
        },
        "metadata": {
            "network": ctx.env.network.to_string(),
            "contract": contract.to_string(),
            "operator": ctx.env.operator_id.to_string(),
        },
    }))
}
